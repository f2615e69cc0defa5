//! RegisteredAgent — a remote, capability-tagged A2A endpoint (§3).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Unknown,
    Online,
    Error,
    Offline,
}

impl AgentStatus {
    /// §4.5 load balancers: "filters out non-`online` agents first".
    pub fn is_online(&self) -> bool {
        matches!(self, AgentStatus::Online)
    }
}

/// Running request-count and latency metrics for one agent (§3, §4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Exponentially-weighted moving average response time, in milliseconds.
    pub avg_response_time_ms: f64,
}

impl AgentMetrics {
    const EWMA_ALPHA: f64 = 0.2;

    pub fn record(&mut self, success: bool, elapsed_ms: f64) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
        if self.total_requests == 1 {
            self.avg_response_time_ms = elapsed_ms;
        } else {
            self.avg_response_time_ms = Self::EWMA_ALPHA * elapsed_ms + (1.0 - Self::EWMA_ALPHA) * self.avg_response_time_ms;
        }
    }
}

/// A remote agent known to the Service Registry (§3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredAgent {
    pub name: String,
    pub endpoint: String,
    pub capabilities: BTreeSet<String>,
    pub description: String,
    pub status: AgentStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    pub registration_time: DateTime<Utc>,
    pub metrics: AgentMetrics,
}

impl RegisteredAgent {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, capabilities: BTreeSet<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            capabilities,
            description: description.into(),
            status: AgentStatus::Unknown,
            last_health_check: None,
            registration_time: Utc::now(),
            metrics: AgentMetrics::default(),
        }
    }
}
