//! Shared data model for the A2A plan-and-execute orchestrator.
//!
//! Every other crate in the workspace depends on this one and none of its code
//! performs I/O — it exists purely to give the rest of the system a single,
//! serializable vocabulary for messages, plans, threads, entities and agents.

pub mod agent;
pub mod entity;
pub mod message;
pub mod plan;
pub mod rpc;
pub mod task;
pub mod thread;

pub use agent::{AgentMetrics, AgentStatus, RegisteredAgent};
pub use entity::EntityMemory;
pub use message::{Message, MessageRole, Summary};
pub use plan::{ExecutionPlan, PlanError};
pub use rpc::{A2ARequest, A2AResponse, Artifact, ResponseMetadata, TaskContext, TaskEnvelope};
pub use task::{AgentKind, Task, TaskStatus};
pub use thread::{InterruptData, InterruptKind, ThreadState};
