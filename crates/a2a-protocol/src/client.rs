//! Agent Client — turns a `Task` into an A2A request and parses its artifacts (§4.6).

use std::time::{Duration, Instant};

use a2a_resilience::ResilientCaller;
use a2a_types::rpc::{A2ARequest, A2AResponse, Artifact, ArtifactStatus, AgentCard, TaskContext, TaskEnvelope};
use a2a_types::{RegisteredAgent, Task};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ProtocolError;

/// The conversation slice the Agent Client serializes for the remote agent
/// (§4.6: "filtered messages, summary, dependency results, original_request,
/// plan position").
#[derive(Debug, Clone, Default)]
pub struct TaskCallContext {
    pub user_id: Option<String>,
    pub session_id: String,
    pub conversation_summary: Option<String>,
    pub recent_messages: Vec<Value>,
    pub dependency_results: Value,
    pub original_request: String,
    pub plan_position: (usize, usize),
    /// Non-empty only on a resumed interrupt (§4.9: "resumption re-enters
    /// Agent node with the same task").
    pub resume_reply: Option<String>,
    pub state_snapshot: Value,
}

/// The typed outcome of one A2A call (§4.6, §9 "exceptions used for control flow").
#[derive(Debug, Clone)]
pub enum AgentOutcome {
    Completed(Vec<Artifact>),
    Interrupted(Value),
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct CallStats {
    pub elapsed_ms: f64,
    pub success: bool,
}

pub struct AgentClient<'a> {
    caller: &'a ResilientCaller,
}

impl<'a> AgentClient<'a> {
    pub fn new(caller: &'a ResilientCaller) -> Self {
        Self { caller }
    }

    /// `GET {agent_endpoint}/a2a/agent-card` discovery call (§6).
    pub async fn discover(&self, endpoint: &str) -> Result<AgentCard, ProtocolError> {
        let card_url = format!("{}/a2a/agent-card", endpoint.trim_end_matches('/'));
        let card = self.caller.call_get::<AgentCard>(&card_url, Duration::from_secs(10)).await?;
        Ok(card)
    }

    /// Dispatches one plan step to its agent (§4.6). Enforces the A2A
    /// invariant that `metadata` is present on every response (§3, §6).
    pub async fn dispatch(&self, agent: &RegisteredAgent, task: &Task, ctx: TaskCallContext, timeout: Duration) -> (Result<AgentOutcome, ProtocolError>, CallStats) {
        let started = Instant::now();
        let request_id: i64 = rand_request_id();
        let task_id = Uuid::new_v4().to_string();

        let mut task_context_payload = serde_json::json!({
            "dependency_results": ctx.dependency_results,
            "plan_position": { "index": ctx.plan_position.0, "total": ctx.plan_position.1 },
        });
        if let Some(reply) = &ctx.resume_reply {
            task_context_payload["resume_reply"] = Value::String(reply.clone());
        }

        let request = A2ARequest::process_task(
            request_id,
            TaskEnvelope {
                id: task_id,
                instruction: task.description.clone(),
                context: TaskContext {
                    user_id: ctx.user_id.clone(),
                    session_id: ctx.session_id.clone(),
                    conversation_summary: ctx.conversation_summary.clone(),
                    recent_messages: ctx.recent_messages.clone(),
                    task_context: task_context_payload,
                },
                state_snapshot: ctx.state_snapshot.clone(),
            },
        );

        let url = format!("{}/a2a", agent.endpoint.trim_end_matches('/'));
        let outcome = self.call_and_parse(&url, &request, timeout).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let success = matches!(outcome, Ok(AgentOutcome::Completed(_)));
        if success {
            info!(agent = %agent.name, elapsed_ms, "agent call completed");
        } else {
            warn!(agent = %agent.name, elapsed_ms, ?outcome, "agent call did not complete");
        }
        (outcome, CallStats { elapsed_ms, success })
    }

    async fn call_and_parse(&self, url: &str, request: &A2ARequest, timeout: Duration) -> Result<AgentOutcome, ProtocolError> {
        let response: A2AResponse = self.caller.call(url, request, timeout).await?;

        if let Some(err) = response.error {
            return Err(ProtocolError::DomainFailure(url.to_string(), err.message));
        }
        let result = response.result.ok_or(ProtocolError::MissingMetadata)?;

        // §3: metadata is always present; §4.6: interrupted_workflow == null
        // means local workflow context must be cleared by the caller.
        match result.status {
            ArtifactStatus::Completed => Ok(AgentOutcome::Completed(result.artifacts)),
            ArtifactStatus::Interrupted => {
                let data = result
                    .metadata
                    .interrupted_workflow
                    .unwrap_or(Value::Null);
                Ok(AgentOutcome::Interrupted(data))
            }
            ArtifactStatus::Failed => Ok(AgentOutcome::Failed(result.error.unwrap_or_else(|| "agent reported failure".to_string()))),
        }
    }
}

fn rand_request_id() -> i64 {
    use rand::Rng;
    rand::thread_rng().gen_range(1..i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use a2a_resilience::{CircuitBreakerConfig, CircuitBreakerRegistry, PoolConfig, ResilientCaller, RetryConfig, RpcTransport};
    use a2a_types::{AgentKind, AgentStatus};
    use serde_json::json;
    use std::collections::BTreeSet;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn caller() -> ResilientCaller {
        ResilientCaller::new(
            CircuitBreakerRegistry::new(CircuitBreakerConfig::default()),
            RetryConfig { max_attempts: 1, ..RetryConfig::default() },
            RpcTransport::new(PoolConfig::default()),
        )
    }

    fn agent(endpoint: &str) -> RegisteredAgent {
        let mut a = RegisteredAgent::new("salesforce", endpoint, BTreeSet::from(["crm_operations".to_string()]), "CRM agent");
        a.status = AgentStatus::Online;
        a
    }

    #[tokio::test]
    async fn completed_response_parses_artifacts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a2a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {
                    "artifacts": [{"type": "record", "data": {"id": "001X", "Name": "GenePoint"}}],
                    "status": "completed",
                    "metadata": {"interrupted_workflow": null, "state_sync": null},
                    "error": null
                }
            })))
            .mount(&server)
            .await;

        let caller = caller();
        let client = AgentClient::new(&caller);
        let task = Task::new("t1", "get the GenePoint account from salesforce", AgentKind::Salesforce, Default::default());
        let (outcome, stats) = client.dispatch(&agent(&server.uri()), &task, TaskCallContext::default(), Duration::from_secs(5)).await;
        assert!(stats.success);
        match outcome.unwrap() {
            AgentOutcome::Completed(artifacts) => assert_eq!(artifacts[0].data["Name"], "GenePoint"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn interrupted_response_carries_workflow_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a2a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {
                    "artifacts": [],
                    "status": "interrupted",
                    "metadata": {"interrupted_workflow": {"question": "approve refund?"}, "state_sync": null},
                    "error": null
                }
            })))
            .mount(&server)
            .await;

        let caller = caller();
        let client = AgentClient::new(&caller);
        let task = Task::new("t1", "process a refund request over policy limits", AgentKind::Salesforce, Default::default());
        let (outcome, _) = client.dispatch(&agent(&server.uri()), &task, TaskCallContext::default(), Duration::from_secs(5)).await;
        assert!(matches!(outcome.unwrap(), AgentOutcome::Interrupted(_)));
    }

    #[tokio::test]
    async fn domain_failure_status_maps_to_failed_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a2a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {
                    "artifacts": [],
                    "status": "failed",
                    "metadata": {"interrupted_workflow": null, "state_sync": null},
                    "error": "record not found"
                }
            })))
            .mount(&server)
            .await;

        let caller = caller();
        let client = AgentClient::new(&caller);
        let task = Task::new("t1", "get an account that does not exist anywhere", AgentKind::Salesforce, Default::default());
        let (outcome, stats) = client.dispatch(&agent(&server.uri()), &task, TaskCallContext::default(), Duration::from_secs(5)).await;
        assert!(!stats.success);
        assert!(matches!(outcome.unwrap(), AgentOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn discover_fetches_agent_card() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a2a/agent-card"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "salesforce",
                "description": "CRM agent",
                "capabilities": ["crm_operations"],
                "endpoints": {"a2a": "/a2a", "health": "/health"}
            })))
            .mount(&server)
            .await;

        let caller = caller();
        let client = AgentClient::new(&caller);
        let card = client.discover(&server.uri()).await.unwrap();
        assert_eq!(card.name, "salesforce");
        assert_eq!(card.capabilities, vec!["crm_operations".to_string()]);
    }
}
