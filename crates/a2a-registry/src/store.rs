//! Service Registry — agent registration, capability routing, health
//! probing, and load balancing over a concurrent map (§4.5).

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use a2a_protocol::AgentClient;
use a2a_resilience::ResilientCaller;
use a2a_types::agent::AgentStatus;
use a2a_types::RegisteredAgent;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::persistence::{load_snapshot, save_snapshot};
use crate::selector::LoadBalancerStrategy;

/// Upper bound on concurrent in-flight probes during `health_probe_all` (§4.5
/// "fans out probes concurrently, bounded by a semaphore").
const MAX_CONCURRENT_HEALTH_PROBES: usize = 8;

/// Tracks every `RegisteredAgent` the orchestrator knows about, plus a
/// capability index for O(1) routing and a shared round-robin cursor (§4.5).
pub struct ServiceRegistry {
    agents: Arc<DashMap<String, RegisteredAgent>>,
    capability_index: Arc<DashMap<String, BTreeSet<String>>>,
    health_caller: ResilientCaller,
    round_robin: AtomicUsize,
}

impl ServiceRegistry {
    pub fn new(health_caller: ResilientCaller) -> Self {
        Self {
            agents: Arc::new(DashMap::new()),
            capability_index: Arc::new(DashMap::new()),
            health_caller,
            round_robin: AtomicUsize::new(0),
        }
    }

    /// Registers an agent discovered via its A2A agent-card endpoint, for the
    /// case where the caller supplies only an endpoint (§6, §"Agent Client").
    pub async fn register_via_discovery(&self, endpoint: &str) -> Result<(), RegistryError> {
        let client = AgentClient::new(&self.health_caller);
        let card = client.discover(endpoint).await.map_err(|e| RegistryError::DiscoveryFailed(endpoint.to_string(), e.to_string()))?;
        let agent = RegisteredAgent::new(card.name, endpoint, card.capabilities.into_iter().collect(), card.description);
        self.register(agent)
    }

    /// Read-only view of every agent's running metrics (SPEC_FULL "Registry metrics surface").
    pub fn metrics_snapshot(&self) -> Vec<(String, a2a_types::agent::AgentMetrics)> {
        self.agents.iter().map(|e| (e.key().clone(), e.value().metrics.clone())).collect()
    }

    pub fn register(&self, agent: RegisteredAgent) -> Result<(), RegistryError> {
        if self.agents.contains_key(&agent.name) {
            return Err(RegistryError::AlreadyRegistered(agent.name));
        }
        for capability in &agent.capabilities {
            self.capability_index.entry(capability.clone()).or_default().insert(agent.name.clone());
        }
        info!(agent = %agent.name, endpoint = %agent.endpoint, "registered agent");
        self.agents.insert(agent.name.clone(), agent);
        Ok(())
    }

    pub fn deregister(&self, name: &str) -> Result<(), RegistryError> {
        let (_, agent) = self.agents.remove(name).ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        for capability in &agent.capabilities {
            if let Some(mut names) = self.capability_index.get_mut(capability) {
                names.remove(name);
            }
        }
        info!(agent = %name, "deregistered agent");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<RegisteredAgent> {
        self.agents.get(name).map(|entry| entry.clone())
    }

    pub fn list(&self) -> Vec<RegisteredAgent> {
        self.agents.iter().map(|entry| entry.clone()).collect()
    }

    /// Every agent advertising `capability`, online or not — healthy agents
    /// first, then the rest, each group sorted by recorded average response
    /// time (§4.5: "returns healthy agents first, then others, sorted by
    /// recorded average response time").
    pub fn find_by_capability(&self, capability: &str) -> Vec<RegisteredAgent> {
        let Some(names) = self.capability_index.get(capability) else {
            return Vec::new();
        };
        let mut agents: Vec<RegisteredAgent> = names.iter().filter_map(|name| self.agents.get(name)).map(|entry| entry.clone()).collect();
        agents.sort_by(|a, b| {
            b.status
                .is_online()
                .cmp(&a.status.is_online())
                .then_with(|| a.metrics.avg_response_time_ms.partial_cmp(&b.metrics.avg_response_time_ms).unwrap_or(Ordering::Equal))
        });
        agents
    }

    /// Picks the single best agent for a task (§4.5): an exact-capability
    /// match wins on lowest average latency; when no `required_caps` are
    /// given, or none are met, falls back to keyword overlap between
    /// `description` and each online agent's capability/name/description
    /// tokens.
    pub fn find_best_for_task(&self, description: &str, required_caps: Option<&[String]>) -> Result<RegisteredAgent, RegistryError> {
        if let Some(caps) = required_caps {
            if let Some(agent) = self.best_exact_capability_match(caps) {
                return Ok(agent);
            }
        }
        self.best_keyword_overlap_match(description).ok_or_else(|| RegistryError::NoCapableAgent(description.to_string()))
    }

    fn best_exact_capability_match(&self, required_caps: &[String]) -> Option<RegisteredAgent> {
        if required_caps.is_empty() {
            return None;
        }
        self.agents
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|agent| agent.status.is_online() && required_caps.iter().all(|cap| agent.capabilities.contains(cap)))
            .min_by(|a, b| a.metrics.avg_response_time_ms.partial_cmp(&b.metrics.avg_response_time_ms).unwrap_or(Ordering::Equal))
    }

    fn best_keyword_overlap_match(&self, description: &str) -> Option<RegisteredAgent> {
        let query_tokens = tokenize(description);
        if query_tokens.is_empty() {
            return None;
        }
        self.agents
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|agent| agent.status.is_online())
            .map(|agent| {
                let overlap = query_tokens.intersection(&agent_tokens(&agent)).count();
                (overlap, agent)
            })
            .filter(|(overlap, _)| *overlap > 0)
            .max_by(|(a_overlap, a_agent), (b_overlap, b_agent)| {
                a_overlap
                    .cmp(b_overlap)
                    .then_with(|| b_agent.metrics.avg_response_time_ms.partial_cmp(&a_agent.metrics.avg_response_time_ms).unwrap_or(Ordering::Equal))
            })
            .map(|(_, agent)| agent)
    }

    /// Selects among the agents [`find_by_capability`] returns using a
    /// load-balancer strategy (§4.5). Strategies filter to online agents
    /// first, so an exact capability still routes only to a live agent.
    pub fn select_by_capability(&self, capability: &str, strategy: LoadBalancerStrategy) -> Result<RegisteredAgent, RegistryError> {
        let candidates: Vec<RegisteredAgent> = self.find_by_capability(capability).into_iter().filter(|a| a.status.is_online()).collect();
        if candidates.is_empty() {
            return Err(RegistryError::NoCapableAgent(capability.to_string()));
        }
        let refs: Vec<&RegisteredAgent> = candidates.iter().collect();
        let index = strategy.select(&refs, &self.round_robin).expect("non-empty candidate list always selects an index");
        Ok(candidates[index].clone())
    }

    /// Records the outcome of a completed call against `name`'s EWMA metrics (§3, §4.6).
    pub fn record_call_result(&self, name: &str, success: bool, elapsed_ms: f64) -> Result<(), RegistryError> {
        let mut entry = self.agents.get_mut(name).ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        entry.metrics.record(success, elapsed_ms);
        Ok(())
    }

    /// Probes one agent via its A2A discovery endpoint and updates its status (§4.5).
    pub async fn health_probe(&self, name: &str, client: &AgentClient<'_>) -> Result<AgentStatus, RegistryError> {
        let endpoint = {
            let entry = self.agents.get(name).ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
            entry.endpoint.clone()
        };

        let status = match client.discover(&endpoint).await {
            Ok(_) => AgentStatus::Online,
            Err(err) => {
                warn!(agent = name, error = %err, "health probe failed");
                AgentStatus::Error
            }
        };

        let mut entry = self.agents.get_mut(name).ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        entry.status = status;
        entry.last_health_check = Some(Utc::now());
        Ok(status)
    }

    /// Probes every registered agent concurrently, bounded by a semaphore,
    /// then persists the aggregated result (§4.5: "fans out probes
    /// concurrently, bounded by a semaphore; persists after aggregation").
    pub async fn health_probe_all(&self, client: &AgentClient<'_>, snapshot_path: &Path) -> Result<(), RegistryError> {
        let names: Vec<String> = self.agents.iter().map(|e| e.key().clone()).collect();
        let semaphore = Semaphore::new(MAX_CONCURRENT_HEALTH_PROBES);

        let probes: Vec<_> = names
            .iter()
            .map(|name| async {
                let _permit = semaphore.acquire().await.expect("semaphore is never closed");
                let _ = self.health_probe(name, client).await;
            })
            .collect();
        futures::future::join_all(probes).await;

        self.save(snapshot_path)
    }

    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let snapshot = self.list();
        save_snapshot(path, &snapshot)
    }

    pub fn load(path: &Path, health_caller: ResilientCaller) -> Result<Self, RegistryError> {
        let registry = Self::new(health_caller);
        let snapshot: Vec<RegisteredAgent> = load_snapshot(path)?;
        for agent in snapshot {
            let _ = registry.register(agent);
        }
        Ok(registry)
    }
}

/// Lowercased, punctuation-split tokens for the keyword-overlap fallback in
/// `find_best_for_task` (§4.5).
fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|s| !s.is_empty()).map(|s| s.to_ascii_lowercase()).collect()
}

fn agent_tokens(agent: &RegisteredAgent) -> HashSet<String> {
    let mut tokens = tokenize(&agent.name);
    tokens.extend(tokenize(&agent.description));
    for capability in &agent.capabilities {
        tokens.extend(tokenize(capability));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use a2a_resilience::{CircuitBreakerConfig, CircuitBreakerRegistry, PoolConfig, RetryConfig, RpcTransport};

    fn caller() -> ResilientCaller {
        ResilientCaller::new(
            CircuitBreakerRegistry::new(CircuitBreakerConfig::default()),
            RetryConfig::default(),
            RpcTransport::new(PoolConfig::default()),
        )
    }

    fn online_agent(name: &str, capability: &str) -> RegisteredAgent {
        let mut a = RegisteredAgent::new(name, "http://localhost:9999", BTreeSet::from([capability.to_string()]), "");
        a.status = AgentStatus::Online;
        a
    }

    #[test]
    fn registering_twice_is_rejected() {
        let registry = ServiceRegistry::new(caller());
        registry.register(online_agent("salesforce", "crm_operations")).unwrap();
        let err = registry.register(online_agent("salesforce", "crm_operations")).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(_)));
    }

    #[test]
    fn find_by_capability_returns_online_agents_before_offline_ones() {
        let registry = ServiceRegistry::new(caller());
        let mut offline = online_agent("jira", "ticketing");
        offline.status = AgentStatus::Offline;
        registry.register(offline).unwrap();
        registry.register(online_agent("servicenow", "ticketing")).unwrap();

        let found = registry.find_by_capability("ticketing");
        assert_eq!(found.len(), 2, "both capability-matching agents are returned, not just the online one");
        assert_eq!(found[0].name, "servicenow");
        assert_eq!(found[1].name, "jira");
    }

    #[test]
    fn find_by_capability_sorts_each_health_group_by_latency() {
        let registry = ServiceRegistry::new(caller());
        let mut slow = online_agent("jira", "ticketing");
        slow.metrics.avg_response_time_ms = 400.0;
        let mut fast = online_agent("servicenow", "ticketing");
        fast.metrics.avg_response_time_ms = 50.0;
        registry.register(slow).unwrap();
        registry.register(fast).unwrap();

        let found = registry.find_by_capability("ticketing");
        assert_eq!(found.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(), vec!["servicenow", "jira"]);
    }

    #[test]
    fn find_best_for_task_prefers_exact_capability_match_by_latency() {
        let registry = ServiceRegistry::new(caller());
        let mut slow = online_agent("salesforce-eu", "crm_operations");
        slow.metrics.avg_response_time_ms = 300.0;
        let mut fast = online_agent("salesforce-us", "crm_operations");
        fast.metrics.avg_response_time_ms = 40.0;
        registry.register(slow).unwrap();
        registry.register(fast).unwrap();

        let caps = vec!["crm_operations".to_string()];
        let chosen = registry.find_best_for_task("look up the GenePoint account", Some(&caps)).unwrap();
        assert_eq!(chosen.name, "salesforce-us");
    }

    #[test]
    fn find_best_for_task_falls_back_to_keyword_overlap() {
        let registry = ServiceRegistry::new(caller());
        registry.register(online_agent("jira", "issue_tracking")).unwrap();
        let mut servicenow = RegisteredAgent::new("servicenow", "http://localhost:9999", BTreeSet::from(["itsm_operations".to_string()]), "handles incident and outage tickets");
        servicenow.status = AgentStatus::Online;
        registry.register(servicenow).unwrap();

        // No required_caps supplied and no capability literally named
        // "incident" or "outage" exists; the match has to come from token
        // overlap against the servicenow agent's description.
        let chosen = registry.find_best_for_task("investigate the open incident and outage", None).unwrap();
        assert_eq!(chosen.name, "servicenow");
    }

    #[test]
    fn find_best_for_task_errors_with_no_capable_agent() {
        let registry = ServiceRegistry::new(caller());
        let caps = vec!["crm_operations".to_string()];
        let err = registry.find_best_for_task("do something entirely unrelated", Some(&caps)).unwrap_err();
        assert!(matches!(err, RegistryError::NoCapableAgent(_)));
    }

    #[test]
    fn select_by_capability_uses_the_configured_strategy() {
        let registry = ServiceRegistry::new(caller());
        registry.register(online_agent("salesforce-a", "crm_operations")).unwrap();
        registry.register(online_agent("salesforce-b", "crm_operations")).unwrap();

        let first = registry.select_by_capability("crm_operations", LoadBalancerStrategy::RoundRobin).unwrap();
        let second = registry.select_by_capability("crm_operations", LoadBalancerStrategy::RoundRobin).unwrap();
        assert_ne!(first.name, second.name, "round robin should alternate across the two candidates");
    }

    #[test]
    fn deregistering_clears_the_capability_index() {
        let registry = ServiceRegistry::new(caller());
        registry.register(online_agent("salesforce", "crm_operations")).unwrap();
        registry.deregister("salesforce").unwrap();
        assert!(registry.find_by_capability("crm_operations").is_empty());
    }

    #[test]
    fn record_call_result_updates_ewma_metrics() {
        let registry = ServiceRegistry::new(caller());
        registry.register(online_agent("salesforce", "crm_operations")).unwrap();
        registry.record_call_result("salesforce", true, 120.0).unwrap();
        let agent = registry.get("salesforce").unwrap();
        assert_eq!(agent.metrics.total_requests, 1);
        assert_eq!(agent.metrics.avg_response_time_ms, 120.0);
    }

    #[test]
    fn save_and_load_round_trips_registered_agents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let registry = ServiceRegistry::new(caller());
        registry.register(online_agent("salesforce", "crm_operations")).unwrap();
        registry.save(&path).unwrap();

        let loaded = ServiceRegistry::load(&path, caller()).unwrap();
        assert_eq!(loaded.get("salesforce").unwrap().name, "salesforce");
    }

    #[tokio::test]
    async fn register_via_discovery_fetches_the_agent_card() {
        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a2a/agent-card"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "salesforce",
                "description": "CRM agent",
                "capabilities": ["crm_operations"],
                "endpoints": {"a2a": "/a2a", "health": null}
            })))
            .mount(&server)
            .await;

        let registry = ServiceRegistry::new(caller());
        registry.register_via_discovery(&server.uri()).await.unwrap();
        assert_eq!(registry.get("salesforce").unwrap().capabilities, BTreeSet::from(["crm_operations".to_string()]));
    }

    #[tokio::test]
    async fn health_probe_all_marks_every_agent_online_and_persists() {
        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a2a/agent-card"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "probe",
                "description": "",
                "capabilities": [],
                "endpoints": {"a2a": "/a2a", "health": null}
            })))
            .mount(&server)
            .await;

        let registry = ServiceRegistry::new(caller());
        registry.register(RegisteredAgent::new("salesforce", server.uri(), BTreeSet::from(["crm_operations".to_string()]), "")).unwrap();
        registry.register(RegisteredAgent::new("jira", server.uri(), BTreeSet::from(["issue_tracking".to_string()]), "")).unwrap();

        let probe_caller = caller();
        let client = AgentClient::new(&probe_caller);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        registry.health_probe_all(&client, &path).await.unwrap();

        assert_eq!(registry.get("salesforce").unwrap().status, AgentStatus::Online);
        assert_eq!(registry.get("jira").unwrap().status, AgentStatus::Online);
        assert!(path.exists(), "health_probe_all should persist the registry snapshot after aggregation");
    }
}
