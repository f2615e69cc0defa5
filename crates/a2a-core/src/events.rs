//! Orchestrator Façade event stream (§6): the five named events plus a
//! final terminal `Response`.

use a2a_types::message::Message;
use a2a_types::task::TaskStatus;
use a2a_types::thread::InterruptData;

#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    MessageAppended { message: Message },
    TaskStarted { task_id: String, agent: String },
    TaskCompleted { task_id: String, status: TaskStatus },
    PlanCompleted { summary: String },
    Interrupted { data: InterruptData },
    Error { detail: String },
    Response { text: String },
}
