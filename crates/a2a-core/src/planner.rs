//! The Planner node's LLM boundary (§4.9): a structured-extraction interface
//! the core depends on only as a trait, matching §1's "the LLM provider...
//! is out of scope".

use async_trait::async_trait;
use a2a_types::message::Message;
use a2a_types::plan::ProposedTask;

use crate::error::CoreError;

/// `ExecutionPlanStructured { description, success_criteria, tasks }` (§4.9 Planner node).
#[derive(Debug, Clone)]
pub struct PlannerProposal {
    pub description: String,
    pub success_criteria: Vec<String>,
    pub tasks: Vec<ProposedTask>,
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Produces a structured plan proposal for `original_request`, given the
    /// thread's message history. Schema/LLM failures are the caller's to
    /// translate into an `ERROR_RECOVERY` interrupt (§4.9, §7).
    async fn propose(&self, original_request: &str, history: &[Message]) -> Result<PlannerProposal, CoreError>;
}
