//! Task — one plan step (§3).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The remote agent kind a task is routed to.
///
/// §9: dynamic dispatch over agent kinds is replaced with this tagged variant;
/// unknown variants are rejected during Planner validation, not at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Salesforce,
    Jira,
    ServiceNow,
    Orchestrator,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Salesforce => "salesforce",
            AgentKind::Jira => "jira",
            AgentKind::ServiceNow => "servicenow",
            AgentKind::Orchestrator => "orchestrator",
        }
    }

    /// Parses a Planner-supplied agent name, rejecting anything outside the
    /// allowed set (§4.9 Planner node validation).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "salesforce" => Some(AgentKind::Salesforce),
            "jira" => Some(AgentKind::Jira),
            "servicenow" => Some(AgentKind::ServiceNow),
            "orchestrator" => Some(AgentKind::Orchestrator),
            _ => None,
        }
    }

    /// The capability a registered agent must advertise to serve this kind
    /// of task (§3 "capabilities", §9 scenario S1: `salesforce` registers
    /// under `crm_operations`, not under its own kind name).
    pub fn default_capability(&self) -> &'static str {
        match self {
            AgentKind::Salesforce => "crm_operations",
            AgentKind::Jira => "issue_tracking",
            AgentKind::ServiceNow => "itsm_operations",
            AgentKind::Orchestrator => "orchestration",
        }
    }
}

/// Terminal and non-terminal lifecycle states for a `Task` (§3 invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped)
    }
}

/// One step of an `ExecutionPlan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub description: String,
    pub agent: AgentKind,
    pub depends_on: BTreeSet<String>,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub attempts: u32,
}

impl Task {
    pub fn new(task_id: impl Into<String>, description: impl Into<String>, agent: AgentKind, depends_on: BTreeSet<String>) -> Self {
        Self {
            task_id: task_id.into(),
            description: description.into(),
            agent,
            depends_on,
            status: TaskStatus::Pending,
            result: None,
            attempts: 0,
        }
    }

    /// §3: a task never transitions out of a terminal state.
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = next;
        true
    }
}
