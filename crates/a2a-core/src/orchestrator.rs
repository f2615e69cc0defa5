//! Orchestrator Facade (§6): a single request-response call whose output is a
//! stream of events terminating in one final response string.

use std::sync::Arc;

use a2a_conversation::ConversationStore;
use a2a_types::message::Message;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use crate::error::CoreError;
use crate::events::OrchestratorEvent;
use crate::state_machine::{AgentNodeOutcome, PlanStateMachine, PlannerOutcome};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Drives a thread's Plan State Machine from a user turn to its next
/// interrupt or final response, emitting [`OrchestratorEvent`]s as it goes
/// (§6 Inbound interface).
pub struct Orchestrator {
    conversation: Arc<ConversationStore>,
    state_machine: Arc<PlanStateMachine>,
}

impl Orchestrator {
    pub fn new(conversation: Arc<ConversationStore>, state_machine: Arc<PlanStateMachine>) -> Self {
        Self { conversation, state_machine }
    }

    /// `thread_id` + `user_message` + optional `resume_token` in; a stream of
    /// events out. `resume_token` carries the human's reply when resuming a
    /// prior interrupt (§4.9 Agent node: "re-invokes the same task id with
    /// user reply in context").
    pub fn run(self: Arc<Self>, thread_id: String, user_message: String, resume_token: Option<String>) -> ReceiverStream<OrchestratorEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            if let Err(err) = self.drive(&thread_id, user_message, resume_token, &tx).await {
                error!(thread = %thread_id, error = %err, "orchestrator run ended in error");
                let _ = tx.send(OrchestratorEvent::Error { detail: err.to_string() }).await;
            }
        });
        ReceiverStream::new(rx)
    }

    async fn drive(&self, thread_id: &str, user_message: String, resume_token: Option<String>, tx: &mpsc::Sender<OrchestratorEvent>) -> Result<(), CoreError> {
        if let Some(reply) = resume_token {
            self.resume_interrupt(thread_id, reply, tx).await?;
        } else {
            let message = Message::user(user_message.clone());
            self.conversation.append_message(thread_id, message.clone()).await?;
            tx.send(OrchestratorEvent::MessageAppended { message }).await.ok();
        }

        loop {
            match self.state_machine.planner_node(thread_id, &user_message).await? {
                PlannerOutcome::Interrupted(data) => {
                    tx.send(OrchestratorEvent::Interrupted { data }).await.ok();
                    return Ok(());
                }
                PlannerOutcome::Continuation | PlannerOutcome::Proposed => {}
            }

            loop {
                match self.state_machine.agent_node(thread_id).await? {
                    AgentNodeOutcome::Advanced { task_id, status, agent } => {
                        tx.send(OrchestratorEvent::TaskStarted { task_id: task_id.clone(), agent: agent.unwrap_or_default() }).await.ok();
                        tx.send(OrchestratorEvent::TaskCompleted { task_id, status }).await.ok();
                    }
                    AgentNodeOutcome::Interrupted(data) => {
                        tx.send(OrchestratorEvent::Interrupted { data }).await.ok();
                        return Ok(());
                    }
                    AgentNodeOutcome::NoExecutableTask => break,
                }
            }

            let complete = self.state_machine.replan_node(thread_id).await?;
            if complete {
                let summary = self.state_machine.summary_node(thread_id).await?;
                tx.send(OrchestratorEvent::PlanCompleted { summary: summary.clone() }).await.ok();
                self.state_machine.maybe_run_maintenance(thread_id).await?;
                tx.send(OrchestratorEvent::Response { text: summary }).await.ok();
                return Ok(());
            }
        }
    }

    /// Folds the resume reply into the pending interrupt's detail, appends it
    /// to the thread history, and lets the main loop re-enter the Agent node
    /// for the same task (§4.9, S5).
    async fn resume_interrupt(&self, thread_id: &str, reply: String, tx: &mpsc::Sender<OrchestratorEvent>) -> Result<(), CoreError> {
        let snapshot = self.conversation.snapshot(thread_id).await?;
        if let Some(mut interrupt) = snapshot.interrupt_data {
            interrupt.detail = reply.clone();
            self.conversation.set_interrupt(thread_id, Some(interrupt)).await?;
        }
        let message = Message::user(reply);
        self.conversation.append_message(thread_id, message.clone()).await?;
        tx.send(OrchestratorEvent::MessageAppended { message }).await.ok();
        info!(thread = thread_id, "resumed from interrupt");
        Ok(())
    }
}
