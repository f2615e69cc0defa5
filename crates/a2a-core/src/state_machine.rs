//! Plan State Machine (§4.9): Planner -> Agent -> Replan -> Summary, each node
//! reading and writing `ThreadState` through the Conversation Store.

use std::sync::Arc;
use std::time::Duration;

use a2a_conversation::{ConversationStore, EntityMemoryStore};
use a2a_protocol::{AgentClient, AgentOutcome, TaskCallContext};
use a2a_registry::ServiceRegistry;
use a2a_resilience::ResilientCaller;
use a2a_types::message::Message;
use a2a_types::plan::ExecutionPlan;
use a2a_types::task::{Task, TaskStatus};
use a2a_types::thread::{InterruptData, InterruptKind};
use a2a_types::ThreadState;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::adapters::{EntityExtractor, Summarizer};
use crate::error::CoreError;
use crate::planner::Planner;

/// §6 configuration table rows the Plan State Machine owns directly.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub max_task_attempts: u32,
    pub standard_timeout: Duration,
    pub long_timeout: Duration,
    pub summary_message_threshold: usize,
    pub memory_tool_threshold: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_task_attempts: 3,
            standard_timeout: Duration::from_secs(30),
            long_timeout: Duration::from_secs(120),
            summary_message_threshold: 20,
            memory_tool_threshold: 8,
        }
    }
}

/// Outcome of one Planner node pass (§4.9).
#[derive(Debug, Clone)]
pub enum PlannerOutcome {
    /// A plan already existed and was incomplete; passed through unchanged.
    Continuation,
    /// A fresh plan was produced and persisted.
    Proposed,
    /// The LLM/validation step failed; an `ERROR_RECOVERY` interrupt was recorded.
    Interrupted(InterruptData),
}

/// Outcome of one Agent node pass (§4.9).
#[derive(Debug, Clone)]
pub enum AgentNodeOutcome {
    /// A task ran to a terminal, non-interrupting status. `agent` is `None`
    /// when the task failed before an endpoint could be selected (attempts
    /// exhausted, no capable agent).
    Advanced { task_id: String, status: TaskStatus, agent: Option<String> },
    /// No executable task remained; the Replan node should run next.
    NoExecutableTask,
    /// The dispatched agent paused awaiting external input.
    Interrupted(InterruptData),
}

/// Drives the four plan-state-machine nodes against one thread at a time
/// (§4.9). The façade is responsible for sequencing calls across nodes; this
/// type only knows how to run a single node to completion.
pub struct PlanStateMachine {
    conversation: Arc<ConversationStore>,
    entity_memory: Arc<EntityMemoryStore>,
    registry: Arc<ServiceRegistry>,
    caller: ResilientCaller,
    planner: Arc<dyn Planner>,
    summarizer: Arc<dyn Summarizer>,
    extractor: Arc<dyn EntityExtractor>,
    config: CoreConfig,
}

impl PlanStateMachine {
    pub fn new(
        conversation: Arc<ConversationStore>,
        entity_memory: Arc<EntityMemoryStore>,
        registry: Arc<ServiceRegistry>,
        caller: ResilientCaller,
        planner: Arc<dyn Planner>,
        summarizer: Arc<dyn Summarizer>,
        extractor: Arc<dyn EntityExtractor>,
        config: CoreConfig,
    ) -> Self {
        Self { conversation, entity_memory, registry, caller, planner, summarizer, extractor, config }
    }

    /// Planner node (§4.9): passes an incomplete plan through unchanged, else
    /// asks the LLM for a fresh proposal and validates it into a DAG.
    pub async fn planner_node(&self, thread_id: &str, original_request: &str) -> Result<PlannerOutcome, CoreError> {
        let snapshot = self.conversation.snapshot(thread_id).await?;
        if let Some(plan) = &snapshot.plan {
            if !plan.is_complete() {
                return Ok(PlannerOutcome::Continuation);
            }
        }

        let proposal = match self.planner.propose(original_request, &snapshot.messages).await {
            Ok(p) => p,
            Err(err) => return self.interrupt_for_error_recovery(thread_id, err.to_string(), None).await,
        };

        let plan = match ExecutionPlan::from_proposed(proposal.description, original_request.to_string(), proposal.success_criteria, proposal.tasks) {
            Ok(plan) => plan,
            Err(err) => return self.interrupt_for_error_recovery(thread_id, err.to_string(), None).await,
        };

        self.conversation.set_plan(thread_id, plan).await?;
        Ok(PlannerOutcome::Proposed)
    }

    async fn interrupt_for_error_recovery(&self, thread_id: &str, detail: String, task_id: Option<String>) -> Result<PlannerOutcome, CoreError> {
        let data = InterruptData { kind: InterruptKind::ErrorRecovery, recoverable: true, detail, task_id };
        self.conversation.set_interrupt(thread_id, Some(data.clone())).await?;
        warn!(thread = thread_id, detail = %data.detail, "planner step failed; parked behind ERROR_RECOVERY interrupt");
        Ok(PlannerOutcome::Interrupted(data))
    }

    /// Agent node (§4.9): selects the next executable task, dispatches it,
    /// and records whatever terminal (or interrupting) outcome results.
    pub async fn agent_node(&self, thread_id: &str) -> Result<AgentNodeOutcome, CoreError> {
        let snapshot = self.conversation.snapshot(thread_id).await?;
        let plan = snapshot.plan.as_ref().ok_or_else(|| CoreError::Planner("agent node entered with no active plan".into()))?;

        let Some(next) = plan.next_executable_task() else {
            return Ok(AgentNodeOutcome::NoExecutableTask);
        };
        let task = next.clone();
        let position = (plan.tasks.iter().position(|t| t.task_id == task.task_id).unwrap_or(0), plan.tasks.len());

        let attempts = self.conversation.begin_task_execution(thread_id, &task.task_id).await?;
        if attempts > self.config.max_task_attempts {
            warn!(thread = thread_id, task = %task.task_id, attempts, "task exceeded max attempts; forcing failed without dispatch");
            return self.fail_task(thread_id, &task.task_id, "max attempts exceeded").await;
        }

        let required_caps = [task.agent.default_capability().to_string()];
        let agent = match self.registry.find_best_for_task(&task.description, Some(&required_caps)) {
            Ok(agent) => agent,
            Err(err) => {
                warn!(thread = thread_id, task = %task.task_id, error = %err, "no capable agent available");
                return self.fail_task(thread_id, &task.task_id, &err.to_string()).await;
            }
        };

        let ctx = self.build_call_context(&snapshot, &task, position);
        if ctx.resume_reply.is_some() {
            // §8 invariant 8 ("state-sync"): the reply has now been read into
            // this call's context, so the stale interrupt is cleared before
            // dispatch rather than after, keeping the pending-interrupt window
            // as short as possible.
            self.conversation.set_interrupt(thread_id, None).await?;
        }

        let client = AgentClient::new(&self.caller);
        let (outcome, stats) = client.dispatch(&agent, &task, ctx, self.config.standard_timeout).await;
        let _ = self.registry.record_call_result(&agent.name, stats.success, stats.elapsed_ms);

        match outcome {
            Ok(AgentOutcome::Completed(artifacts)) => {
                let result = json!(artifacts);
                self.conversation.record_result(thread_id, &task.task_id, TaskStatus::Completed, Some(result.clone()), true).await?;
                self.conversation.append_message(thread_id, Message::assistant(format!("{} completed: {}", task.description, result))).await?;
                info!(thread = thread_id, task = %task.task_id, agent = %agent.name, "task completed");
                Ok(AgentNodeOutcome::Advanced { task_id: task.task_id, status: TaskStatus::Completed, agent: Some(agent.name) })
            }
            Ok(AgentOutcome::Interrupted(data)) => {
                let interrupt = InterruptData { kind: InterruptKind::HumanApproval, recoverable: true, detail: data.to_string(), task_id: Some(task.task_id.clone()) };
                self.conversation.set_interrupt(thread_id, Some(interrupt.clone())).await?;
                Ok(AgentNodeOutcome::Interrupted(interrupt))
            }
            Ok(AgentOutcome::Failed(reason)) => {
                self.conversation.record_result(thread_id, &task.task_id, TaskStatus::Failed, Some(json!({"error": reason})), true).await?;
                Ok(AgentNodeOutcome::Advanced { task_id: task.task_id, status: TaskStatus::Failed, agent: Some(agent.name) })
            }
            Err(err) => {
                warn!(thread = thread_id, task = %task.task_id, error = %err, "agent call did not complete; task marked failed");
                self.conversation.record_result(thread_id, &task.task_id, TaskStatus::Failed, Some(json!({"error": err.to_string()})), true).await?;
                Ok(AgentNodeOutcome::Advanced { task_id: task.task_id, status: TaskStatus::Failed, agent: Some(agent.name) })
            }
        }
    }

    async fn fail_task(&self, thread_id: &str, task_id: &str, reason: &str) -> Result<AgentNodeOutcome, CoreError> {
        self.conversation.record_result(thread_id, task_id, TaskStatus::Failed, Some(json!({"error": reason})), true).await?;
        Ok(AgentNodeOutcome::Advanced { task_id: task_id.to_string(), status: TaskStatus::Failed, agent: None })
    }

    /// Builds the per-call context an `AgentClient::dispatch` sends over the
    /// wire (§4.6): filtered messages, summary, dependency results, the
    /// original request, plan position, and any pending resume reply.
    fn build_call_context(&self, snapshot: &ThreadState, task: &Task, position: (usize, usize)) -> TaskCallContext {
        let dependency_results = Value::Object(
            task.depends_on
                .iter()
                .filter_map(|dep_id| {
                    snapshot
                        .plan
                        .as_ref()
                        .and_then(|p| p.tasks.iter().find(|t| &t.task_id == dep_id))
                        .map(|t| (dep_id.clone(), t.result.clone().unwrap_or(Value::Null)))
                })
                .collect::<serde_json::Map<String, Value>>(),
        );
        let recent_messages = snapshot.messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect();
        let resume_reply = snapshot
            .interrupt_data
            .as_ref()
            .filter(|d| d.task_id.as_deref() == Some(task.task_id.as_str()))
            .map(|d| d.detail.clone());

        TaskCallContext {
            user_id: None,
            session_id: snapshot.thread_id.clone(),
            conversation_summary: snapshot.summary.as_ref().map(|s| s.text.clone()),
            recent_messages,
            dependency_results,
            original_request: snapshot.plan.as_ref().map(|p| p.original_request.clone()).unwrap_or_default(),
            plan_position: position,
            resume_reply,
            state_snapshot: Value::Null,
        }
    }

    /// Replan node (§4.9): sweeps dependents of failed tasks to `skipped`
    /// (no other mutation — "replanning is intentionally omitted"), then
    /// reports whether the plan has reached completion closure.
    pub async fn replan_node(&self, thread_id: &str) -> Result<bool, CoreError> {
        self.conversation.update_plan(thread_id, |plan| plan.apply_unreachable_policy()).await?;
        let snapshot = self.conversation.snapshot(thread_id).await?;
        Ok(snapshot.plan.as_ref().map(ExecutionPlan::is_complete).unwrap_or(true))
    }

    /// Summary node (§4.9): single-task plans report that task's own result;
    /// multi-task plans are summarized through the same `Summarizer` contract
    /// used for periodic conversation summarization, fed a synthetic message
    /// list built from the plan's task results.
    pub async fn summary_node(&self, thread_id: &str) -> Result<String, CoreError> {
        let snapshot = self.conversation.snapshot(thread_id).await?;
        let plan = snapshot.plan.clone().ok_or_else(|| CoreError::Planner("summary node entered with no active plan".into()))?;

        let summary_text = if plan.tasks.len() == 1 {
            match &plan.tasks[0].result {
                Some(result) => result.to_string(),
                None => format!("{} did not complete successfully", plan.tasks[0].description),
            }
        } else {
            let synthetic = Self::synthetic_summary_messages(&plan);
            let output = self.summarizer.summarize(&synthetic, snapshot.summary.as_ref()).await?;
            if output.summary.is_empty() {
                Self::fallback_plan_summary(&plan)
            } else {
                output.summary
            }
        };

        let stored = summary_text.clone();
        self.conversation.update_plan(thread_id, move |plan| plan.summary = Some(stored)).await?;
        self.conversation.append_message(thread_id, Message::assistant(summary_text.clone())).await?;
        Ok(summary_text)
    }

    fn synthetic_summary_messages(plan: &ExecutionPlan) -> Vec<Message> {
        let mut messages = vec![Message::user(plan.original_request.clone()), Message::system(plan.description.clone())];
        for task in &plan.tasks {
            let outcome = match task.status {
                TaskStatus::Completed => format!("{}: completed - {}", task.description, task.result.clone().unwrap_or(Value::Null)),
                TaskStatus::Failed => format!("{}: failed", task.description),
                TaskStatus::Skipped => format!("{}: skipped (unreachable dependency)", task.description),
                other => format!("{}: {other:?}", task.description),
            };
            messages.push(Message::assistant(outcome));
        }
        messages
    }

    fn fallback_plan_summary(plan: &ExecutionPlan) -> String {
        let failed: Vec<&str> = plan.tasks.iter().filter(|t| t.status == TaskStatus::Failed).map(|t| t.description.as_str()).collect();
        if failed.is_empty() {
            format!("Completed: {}", plan.description)
        } else {
            format!("{} (steps failed: {})", plan.description, failed.join(", "))
        }
    }

    /// §4.8 maintenance triggers. Run off the plan's hot path by the façade
    /// between turns; failures are logged by the adapters themselves and
    /// never surfaced here.
    pub async fn maybe_run_maintenance(&self, thread_id: &str) -> Result<(), CoreError> {
        let snapshot = self.conversation.snapshot(thread_id).await?;
        let signal = a2a_conversation::maintenance::signal(&snapshot, self.config.summary_message_threshold, self.config.memory_tool_threshold);

        if signal.needs_summary {
            let output = self.summarizer.summarize(&snapshot.messages, snapshot.summary.as_ref()).await?;
            if !output.summary.is_empty() {
                let replaces = snapshot.messages.len().saturating_sub(output.preserve_tail);
                self.conversation.apply_summary(thread_id, a2a_types::message::Summary { text: output.summary, replaces }).await?;
            }
        }
        if signal.needs_extraction {
            let extraction = self.extractor.extract(&snapshot.messages).await?;
            for entity in extraction.entities {
                self.entity_memory
                    .upsert_many(thread_id, &entity.entity_type, vec![a2a_types::entity::EntityRecord { key: entity.key, data: entity.data }])
                    .await?;
            }
            self.conversation.clear_extraction_counters(thread_id).await?;
        }
        Ok(())
    }
}
