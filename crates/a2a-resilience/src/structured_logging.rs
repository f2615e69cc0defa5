//! Structured logging bootstrap (ambient stack, ported from the teacher's
//! `resilience/src/structured_logging.rs`).
//!
//! The core doesn't build its own logging framework — it configures
//! `tracing-subscriber` once at process start and everything else just calls
//! `tracing::{debug,info,warn,error}!` with structured fields, the way every
//! module in the teacher workspace does.

use tracing_subscriber::EnvFilter;

/// Initializes a global `tracing` subscriber reading `RUST_LOG` (defaulting to
/// `info`), JSON-formatted so the orchestrator's structured events (circuit
/// transitions, health transitions, task status changes — §4.2, §4.5, §4.9)
/// are machine-parseable in production.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .try_init();
    tracing::info!(service = service_name, "tracing initialized");
}
