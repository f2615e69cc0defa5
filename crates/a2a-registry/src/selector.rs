//! Load-balancer strategies for picking among capable, online agents (§4.5).
//!
//! Patterned on the pack's `tower-resilience-healthcheck::SelectionStrategy`:
//! a small enum dispatching to pure selection functions over an already
//! health-filtered slice, plus a shared round-robin cursor.

use std::sync::atomic::{AtomicUsize, Ordering};

use a2a_types::RegisteredAgent;

/// Routing strategy used by [`crate::store::ServiceRegistry::select_by_capability`] (§4.5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadBalancerStrategy {
    #[default]
    RoundRobin,
    LeastConnections,
    WeightedInverseLatency,
}

impl LoadBalancerStrategy {
    /// Picks an index into `agents`, which callers must have already
    /// filtered to online, capability-matching agents (§4.5: "filters out
    /// non-online agents first").
    pub fn select(&self, agents: &[&RegisteredAgent], round_robin_counter: &AtomicUsize) -> Option<usize> {
        if agents.is_empty() {
            return None;
        }
        match self {
            LoadBalancerStrategy::RoundRobin => {
                let idx = round_robin_counter.fetch_add(1, Ordering::Relaxed);
                Some(idx % agents.len())
            }
            // Proxy for in-flight connection count: total requests observed
            // so far, since the registry does not track live connections.
            LoadBalancerStrategy::LeastConnections => agents
                .iter()
                .enumerate()
                .min_by_key(|(_, a)| a.metrics.total_requests)
                .map(|(i, _)| i),
            LoadBalancerStrategy::WeightedInverseLatency => select_weighted(agents),
        }
    }
}

/// Weight is the inverse of observed average latency; agents with no history
/// yet (`avg_response_time_ms == 0.0`) get the highest weight so they are
/// tried before a latency baseline exists.
pub fn inverse_latency_weights(agents: &[&RegisteredAgent]) -> Vec<f64> {
    agents
        .iter()
        .map(|a| {
            let latency = a.metrics.avg_response_time_ms;
            if latency <= 0.0 {
                1.0
            } else {
                1.0 / latency
            }
        })
        .collect()
}

fn select_weighted(agents: &[&RegisteredAgent]) -> Option<usize> {
    let weights = inverse_latency_weights(agents);
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Some(0);
    }
    let mut roll = rand::random::<f64>() * total;
    for (i, w) in weights.iter().enumerate() {
        if roll < *w {
            return Some(i);
        }
        roll -= w;
    }
    Some(weights.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn agent(name: &str, total_requests: u64, avg_latency_ms: f64) -> RegisteredAgent {
        let mut a = RegisteredAgent::new(name, "http://localhost", BTreeSet::new(), "");
        a.metrics.total_requests = total_requests;
        a.metrics.avg_response_time_ms = avg_latency_ms;
        a
    }

    #[test]
    fn round_robin_cycles_through_all_agents() {
        let agents = vec![agent("a", 0, 0.0), agent("b", 0, 0.0), agent("c", 0, 0.0)];
        let refs: Vec<&RegisteredAgent> = agents.iter().collect();
        let strategy = LoadBalancerStrategy::RoundRobin;
        let counter = AtomicUsize::new(0);
        let picks: Vec<usize> = (0..6).map(|_| strategy.select(&refs, &counter).unwrap()).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn least_connections_prefers_fewest_total_requests() {
        let agents = vec![agent("busy", 40, 0.0), agent("idle", 2, 0.0)];
        let refs: Vec<&RegisteredAgent> = agents.iter().collect();
        let strategy = LoadBalancerStrategy::LeastConnections;
        let counter = AtomicUsize::new(0);
        assert_eq!(strategy.select(&refs, &counter), Some(1));
    }

    #[test]
    fn weighted_inverse_latency_favors_the_faster_agent_over_many_trials() {
        let agents = vec![agent("slow", 0, 500.0), agent("fast", 0, 10.0)];
        let refs: Vec<&RegisteredAgent> = agents.iter().collect();
        let strategy = LoadBalancerStrategy::WeightedInverseLatency;
        let counter = AtomicUsize::new(0);
        let fast_wins = (0..500).filter(|_| strategy.select(&refs, &counter) == Some(1)).count();
        assert!(fast_wins > 350, "expected the fast agent to win most trials, got {fast_wins}/500");
    }

    #[test]
    fn empty_slice_selects_nothing() {
        let strategy = LoadBalancerStrategy::RoundRobin;
        let counter = AtomicUsize::new(0);
        assert_eq!(strategy.select(&[], &counter), None);
    }
}
