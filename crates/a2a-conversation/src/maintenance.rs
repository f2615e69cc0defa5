//! Maintenance-trigger bookkeeping: decides when the Summary node should run
//! and when extracted entities should be refreshed (§4.8, §6 Configuration).

use a2a_types::ThreadState;

/// Whether a thread has crossed a maintenance threshold since its last pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaintenanceSignal {
    pub needs_summary: bool,
    pub needs_extraction: bool,
}

/// §6: `summary.message_threshold` (default 20) gates the Summary node;
/// `memory.tool_threshold` (default 8) gates entity extraction. Both count
/// from the tail left after the last summary, not the thread's full history.
pub fn signal(thread: &ThreadState, summary_message_threshold: usize, memory_tool_threshold: u32) -> MaintenanceSignal {
    let replaced = thread.summary.as_ref().map(|s| s.replaces).unwrap_or(0);
    let unsummarized = thread.messages.len().saturating_sub(replaced);

    MaintenanceSignal {
        needs_summary: unsummarized >= summary_message_threshold,
        needs_extraction: thread.tool_calls_since_memory >= memory_tool_threshold || thread.agent_calls_since_memory >= memory_tool_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a2a_types::message::{Message, Summary};

    fn thread_with_messages(n: usize) -> ThreadState {
        let mut t = ThreadState::new("thread-1");
        for i in 0..n {
            t.append_message(Message::user(format!("message {i}")));
        }
        t
    }

    #[test]
    fn signals_summary_once_threshold_is_crossed() {
        let below = thread_with_messages(19);
        assert!(!signal(&below, 20, 8).needs_summary);

        let at_threshold = thread_with_messages(20);
        assert!(signal(&at_threshold, 20, 8).needs_summary);
    }

    #[test]
    fn counts_only_messages_after_the_last_summary() {
        let mut thread = thread_with_messages(25);
        thread.summary = Some(Summary { text: "...".into(), replaces: 20 });
        assert!(!signal(&thread, 20, 8).needs_summary);
    }

    #[test]
    fn signals_extraction_from_either_counter() {
        let mut thread = ThreadState::new("thread-1");
        thread.tool_calls_since_memory = 8;
        assert!(signal(&thread, 20, 8).needs_extraction);

        let mut thread = ThreadState::new("thread-1");
        thread.agent_calls_since_memory = 9;
        assert!(signal(&thread, 20, 8).needs_extraction);
    }
}
