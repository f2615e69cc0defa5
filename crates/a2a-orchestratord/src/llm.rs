//! HTTP-backed `Planner` / `Summarizer` / `EntityExtractor` adapters.
//!
//! The LLM provider itself is out of scope (§1) — the core depends only on
//! the trait boundary. This is the thin, swappable implementation that
//! satisfies it for the binary: one JSON POST per call against a configured
//! endpoint, with the same request/response shape regardless of which model
//! sits behind it.

use std::time::Duration;

use a2a_core::{CoreError, EntityExtractor, ExtractedEntity, ExtractionOutput, Planner, PlannerProposal, Summarizer, SummaryOutput};
use a2a_types::message::{Message, Summary};
use a2a_types::plan::ProposedTask;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Clone)]
pub struct LlmAdapter {
    client: Client,
    base_url: String,
}

impl LlmAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: Client::builder().timeout(Duration::from_secs(60)).build().expect("reqwest client builds"), base_url: base_url.into() }
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(&self, path: &str, body: &Req) -> Result<Resp, CoreError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let response = self.client.post(&url).json(body).send().await.map_err(|e| CoreError::Planner(format!("llm request to {url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(CoreError::Planner(format!("llm endpoint {url} returned {}", response.status())));
        }
        response.json::<Resp>().await.map_err(|e| CoreError::Planner(format!("malformed llm response from {url}: {e}")))
    }
}

#[derive(Serialize)]
struct PlanRequest<'a> {
    original_request: &'a str,
    history: &'a [Message],
}

#[derive(Deserialize)]
struct PlanResponse {
    description: String,
    success_criteria: Vec<String>,
    tasks: Vec<ProposedTaskWire>,
}

#[derive(Deserialize)]
struct ProposedTaskWire {
    description: String,
    agent: String,
    depends_on: Vec<usize>,
}

#[async_trait]
impl Planner for LlmAdapter {
    async fn propose(&self, original_request: &str, history: &[Message]) -> Result<PlannerProposal, CoreError> {
        let response: PlanResponse = self.post("plan", &PlanRequest { original_request, history }).await?;
        Ok(PlannerProposal {
            description: response.description,
            success_criteria: response.success_criteria,
            tasks: response
                .tasks
                .into_iter()
                .map(|t| ProposedTask { description: t.description, agent: t.agent, depends_on: t.depends_on })
                .collect(),
        })
    }
}

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    messages: &'a [Message],
    prior_summary: Option<&'a Summary>,
}

#[derive(Deserialize)]
struct SummarizeResponse {
    summary: String,
    preserve_tail: usize,
}

#[async_trait]
impl Summarizer for LlmAdapter {
    async fn summarize(&self, messages: &[Message], prior_summary: Option<&Summary>) -> Result<SummaryOutput, CoreError> {
        let response: SummarizeResponse = self.post("summarize", &SummarizeRequest { messages, prior_summary }).await?;
        Ok(SummaryOutput { summary: response.summary, preserve_tail: response.preserve_tail })
    }
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct ExtractResponse {
    entities: Vec<ExtractedEntityWire>,
}

#[derive(Deserialize)]
struct ExtractedEntityWire {
    entity_type: String,
    key: String,
    data: serde_json::Value,
}

#[async_trait]
impl EntityExtractor for LlmAdapter {
    async fn extract(&self, messages: &[Message]) -> Result<ExtractionOutput, CoreError> {
        let response: ExtractResponse = self.post("extract", &ExtractRequest { messages }).await?;
        Ok(ExtractionOutput {
            entities: response.entities.into_iter().map(|e| ExtractedEntity { entity_type: e.entity_type, key: e.key, data: e.data }).collect(),
        })
    }
}

/// Wraps any of the three adapter impls so a network hiccup never stalls the
/// plan beyond its configured budget (§4.8, used by [`crate::build_adapters`]).
pub fn log_llm_unreachable(endpoint: &str, err: &CoreError) {
    warn!(endpoint, error = %err, "llm adapter call failed");
}
