//! ThreadState — per-conversation record (§3).

use serde::{Deserialize, Serialize};

use crate::message::{Message, Summary};
use crate::plan::ExecutionPlan;

/// Why a plan run paused awaiting external input (§4.9 Planner/Agent nodes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptKind {
    /// Human-in-the-loop approval requested by a remote agent (§4.6, §4.9).
    HumanApproval,
    /// LLM/validation failure during planning (§4.9 Planner node, §7).
    ErrorRecovery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptData {
    pub kind: InterruptKind,
    pub recoverable: bool,
    pub detail: String,
    /// The task id execution should resume at, if any (§4.9 Agent node: "re-enters
    /// Agent node with the same task").
    pub task_id: Option<String>,
}

/// The full persisted record for one conversation thread (§3).
///
/// Mutated only through state-machine node boundaries and persisted after each
/// node (§3 lifecycle, §5 ordering guarantees).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadState {
    pub thread_id: String,
    pub messages: Vec<Message>,
    pub summary: Option<Summary>,
    pub plan: Option<ExecutionPlan>,
    pub plan_history: Vec<ExecutionPlan>,
    pub tool_calls_since_memory: u32,
    pub agent_calls_since_memory: u32,
    pub interrupted: bool,
    pub interrupt_data: Option<InterruptData>,
}

impl ThreadState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            summary: None,
            plan: None,
            plan_history: Vec::new(),
            tool_calls_since_memory: 0,
            agent_calls_since_memory: 0,
            interrupted: false,
            interrupt_data: None,
        }
    }

    pub fn append_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replaces the plan, archiving the previous one into `plan_history`
    /// (§4.9 Planner node: "append to plan_history, reset current_task_index,
    /// clear interruption fields").
    pub fn set_plan(&mut self, plan: ExecutionPlan) {
        if let Some(prev) = self.plan.take() {
            self.plan_history.push(prev);
        }
        self.interrupted = false;
        self.interrupt_data = None;
        self.plan = Some(plan);
    }
}
