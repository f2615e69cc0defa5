//! A2A wire protocol — JSON-RPC 2.0 envelopes (§6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Context the Agent Client serializes for the remote agent (§4.6, §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskContext {
    pub user_id: Option<String>,
    pub session_id: String,
    pub conversation_summary: Option<String>,
    pub recent_messages: Vec<Value>,
    pub task_context: Value,
}

/// The `task` object inside a `process_task` request's `params` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: String,
    pub instruction: String,
    pub context: TaskContext,
    pub state_snapshot: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2AParams {
    pub task: TaskEnvelope,
}

/// A JSON-RPC 2.0 request to `POST {agent_endpoint}/a2a` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2ARequest {
    pub jsonrpc: String,
    pub id: i64,
    pub method: String,
    pub params: A2AParams,
}

impl A2ARequest {
    pub fn process_task(id: i64, task: TaskEnvelope) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: "process_task".to_string(),
            params: A2AParams { task },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Completed,
    Interrupted,
    Failed,
}

/// `metadata` is always present so the client can deterministically clear its
/// local workflow state once `interrupted_workflow` is `null` (§3, §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub interrupted_workflow: Option<Value>,
    pub state_sync: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2AResult {
    pub artifacts: Vec<Artifact>,
    pub status: ArtifactStatus,
    pub metadata: ResponseMetadata,
    pub error: Option<String>,
}

/// A JSON-RPC 2.0 response from a remote agent (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2AResponse {
    pub jsonrpc: String,
    pub id: i64,
    pub result: Option<A2AResult>,
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

/// `GET {agent_endpoint}/a2a/agent-card` discovery response (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub endpoints: AgentCardEndpoints,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCardEndpoints {
    pub a2a: String,
    pub health: Option<String>,
}
