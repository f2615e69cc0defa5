//! Summarizer / Extractor adapters (§4.8): two narrowly-typed capabilities the
//! core consumes from an external LLM, as explicit `#[async_trait]`
//! contracts rather than duck-typed tool objects (§9).

use std::time::Duration;

use async_trait::async_trait;
use a2a_types::message::{Message, Summary};
use serde_json::Value;
use tracing::warn;

use crate::error::CoreError;

/// `Summarize(messages, prior_summary?) -> {summary, preserve_tail}` (§4.8).
#[derive(Debug, Clone, Default)]
pub struct SummaryOutput {
    pub summary: String,
    pub preserve_tail: usize,
}

/// One row of `ExtractEntities(messages) -> {entity_type -> list<record>}` (§4.8).
#[derive(Debug, Clone)]
pub struct ExtractedEntity {
    pub entity_type: String,
    pub key: String,
    pub data: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    pub entities: Vec<ExtractedEntity>,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message], prior_summary: Option<&Summary>) -> Result<SummaryOutput, CoreError>;
}

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, messages: &[Message]) -> Result<ExtractionOutput, CoreError>;
}

/// Enforces the bounded timeout §4.8 requires and converts any failure — a
/// timeout or the inner adapter's own error — into a logged no-op, since
/// "failure is logged, never propagated to the plan". Mirrors the Resilient
/// Caller's style of composing a policy (here, a deadline) around an
/// otherwise-fallible operation.
pub struct TimeoutWrappedAdapter<T> {
    inner: T,
    timeout: Duration,
}

impl<T> TimeoutWrappedAdapter<T> {
    pub fn new(inner: T, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<T: Summarizer> Summarizer for TimeoutWrappedAdapter<T> {
    async fn summarize(&self, messages: &[Message], prior_summary: Option<&Summary>) -> Result<SummaryOutput, CoreError> {
        match tokio::time::timeout(self.timeout, self.inner.summarize(messages, prior_summary)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => {
                warn!(error = %err, "summarizer failed; leaving state unchanged");
                Ok(SummaryOutput::default())
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis(), "summarizer timed out; leaving state unchanged");
                Ok(SummaryOutput::default())
            }
        }
    }
}

#[async_trait]
impl<T: EntityExtractor> EntityExtractor for TimeoutWrappedAdapter<T> {
    async fn extract(&self, messages: &[Message]) -> Result<ExtractionOutput, CoreError> {
        match tokio::time::timeout(self.timeout, self.inner.extract(messages)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => {
                warn!(error = %err, "entity extractor failed; leaving state unchanged");
                Ok(ExtractionOutput::default())
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis(), "entity extractor timed out; leaving state unchanged");
                Ok(ExtractionOutput::default())
            }
        }
    }
}
