//! Conversation Store — per-thread state behind a single-writer lock, with
//! every mutation persisted to disk before it returns (§3, §5 ordering
//! guarantees: "a thread's on-disk state always reflects its last completed
//! node transition").

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use a2a_types::message::Message;
use a2a_types::plan::ExecutionPlan;
use a2a_types::task::TaskStatus;
use a2a_types::ThreadState;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ConversationError;
use crate::persistence::{load_snapshot, save_snapshot, thread_path};

/// Holds one `Mutex<ThreadState>` per thread id so concurrent requests for
/// different threads never block each other, while same-thread requests
/// serialize naturally on the lock (§4.8: "single-writer per thread").
pub struct ConversationStore {
    data_dir: PathBuf,
    threads: Arc<DashMap<String, Arc<Mutex<ThreadState>>>>,
}

impl ConversationStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            threads: Arc::new(DashMap::new()),
        }
    }

    /// Returns the thread's lock, loading it from disk on first touch if a
    /// snapshot already exists, or starting a fresh thread otherwise.
    pub fn handle(&self, thread_id: &str) -> Result<Arc<Mutex<ThreadState>>, ConversationError> {
        if let Some(existing) = self.threads.get(thread_id) {
            return Ok(existing.clone());
        }
        let path = thread_path(&self.data_dir, thread_id);
        let state = if path.exists() {
            load_snapshot(&path)?
        } else {
            ThreadState::new(thread_id)
        };
        let handle = Arc::new(Mutex::new(state));
        self.threads.insert(thread_id.to_string(), handle.clone());
        Ok(handle)
    }

    async fn persist(&self, state: &ThreadState) -> Result<(), ConversationError> {
        let path = thread_path(&self.data_dir, &state.thread_id);
        save_snapshot(&path, state)
    }

    pub async fn append_message(&self, thread_id: &str, message: Message) -> Result<(), ConversationError> {
        let handle = self.handle(thread_id)?;
        let mut state = handle.lock().await;
        state.append_message(message);
        debug!(thread = thread_id, "appended message");
        self.persist(&state).await
    }

    pub async fn set_plan(&self, thread_id: &str, plan: ExecutionPlan) -> Result<(), ConversationError> {
        let handle = self.handle(thread_id)?;
        let mut state = handle.lock().await;
        state.set_plan(plan);
        self.persist(&state).await
    }

    /// Agent node entry (§4.9: "`attempts++` on every entry"): marks the task
    /// `executing` and returns its post-increment attempt count so the caller
    /// can force `failed` without dispatching when the count is exhausted.
    pub async fn begin_task_execution(&self, thread_id: &str, task_id: &str) -> Result<u32, ConversationError> {
        let handle = self.handle(thread_id)?;
        let mut state = handle.lock().await;
        let attempts = if let Some(plan) = state.plan.as_mut() {
            if let Some(task) = plan.find_task_mut(task_id) {
                task.transition(TaskStatus::Executing);
                task.attempts += 1;
                task.attempts
            } else {
                0
            }
        } else {
            0
        };
        self.persist(&state).await?;
        Ok(attempts)
    }

    /// Applies a task's terminal outcome to the active plan and bumps the
    /// Summary/Extract maintenance counters (§4.8, §4.9 Replan node entry point).
    pub async fn record_result(&self, thread_id: &str, task_id: &str, status: TaskStatus, result: Option<Value>, touched_agent: bool) -> Result<(), ConversationError> {
        let handle = self.handle(thread_id)?;
        let mut state = handle.lock().await;
        if let Some(plan) = state.plan.as_mut() {
            if let Some(task) = plan.find_task_mut(task_id) {
                task.transition(status);
                task.result = result;
            }
        }
        if touched_agent {
            state.agent_calls_since_memory += 1;
        } else {
            state.tool_calls_since_memory += 1;
        }
        self.persist(&state).await
    }

    /// Mutates the active plan in place (e.g. the Replan node's unreachable-task
    /// sweep) without archiving it into `plan_history` the way `set_plan` does.
    pub async fn update_plan<F: FnOnce(&mut ExecutionPlan)>(&self, thread_id: &str, f: F) -> Result<(), ConversationError> {
        let handle = self.handle(thread_id)?;
        let mut state = handle.lock().await;
        if let Some(plan) = state.plan.as_mut() {
            f(plan);
        }
        self.persist(&state).await
    }

    /// Persists an interrupt (§4.9 Agent/Planner nodes) or clears it on resume.
    pub async fn set_interrupt(&self, thread_id: &str, data: Option<a2a_types::thread::InterruptData>) -> Result<(), ConversationError> {
        let handle = self.handle(thread_id)?;
        let mut state = handle.lock().await;
        state.interrupted = data.is_some();
        state.interrupt_data = data;
        self.persist(&state).await
    }

    /// Replaces the unsummarized prefix with a compressed summary and resets
    /// the extraction counters once maintenance has run (§4.8).
    pub async fn apply_summary(&self, thread_id: &str, summary: a2a_types::message::Summary) -> Result<(), ConversationError> {
        let handle = self.handle(thread_id)?;
        let mut state = handle.lock().await;
        state.summary = Some(summary);
        self.persist(&state).await
    }

    pub async fn clear_extraction_counters(&self, thread_id: &str) -> Result<(), ConversationError> {
        let handle = self.handle(thread_id)?;
        let mut state = handle.lock().await;
        state.tool_calls_since_memory = 0;
        state.agent_calls_since_memory = 0;
        self.persist(&state).await
    }

    pub async fn snapshot(&self, thread_id: &str) -> Result<ThreadState, ConversationError> {
        let handle = self.handle(thread_id)?;
        let state = handle.lock().await;
        Ok(state.clone())
    }

    pub fn known_thread_ids(&self) -> BTreeSet<String> {
        self.threads.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ConversationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[tokio::test]
    async fn append_message_persists_and_is_visible_in_snapshot() {
        let (_dir, store) = store();
        store.append_message("thread-1", Message::user("find the GenePoint account")).await.unwrap();
        let snapshot = store.snapshot("thread-1").await.unwrap();
        assert_eq!(snapshot.messages.len(), 1);
    }

    #[tokio::test]
    async fn reopening_a_thread_reloads_its_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ConversationStore::new(dir.path().to_path_buf());
            store.append_message("thread-1", Message::user("hello")).await.unwrap();
        }
        let reopened = ConversationStore::new(dir.path().to_path_buf());
        let snapshot = reopened.snapshot("thread-1").await.unwrap();
        assert_eq!(snapshot.messages.len(), 1);
    }

    #[tokio::test]
    async fn record_result_bumps_the_right_maintenance_counter() {
        let (_dir, store) = store();
        store.record_result("thread-1", "t1", TaskStatus::Completed, None, true).await.unwrap();
        let snapshot = store.snapshot("thread-1").await.unwrap();
        assert_eq!(snapshot.agent_calls_since_memory, 1);
        assert_eq!(snapshot.tool_calls_since_memory, 0);
    }

    #[tokio::test]
    async fn clear_extraction_counters_resets_both_counters() {
        let (_dir, store) = store();
        store.record_result("thread-1", "t1", TaskStatus::Completed, None, true).await.unwrap();
        store.record_result("thread-1", "t1", TaskStatus::Completed, None, false).await.unwrap();
        store.clear_extraction_counters("thread-1").await.unwrap();
        let snapshot = store.snapshot("thread-1").await.unwrap();
        assert_eq!(snapshot.agent_calls_since_memory, 0);
        assert_eq!(snapshot.tool_calls_since_memory, 0);
    }
}
