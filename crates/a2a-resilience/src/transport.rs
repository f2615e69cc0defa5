//! RPC Transport — pooled HTTP client issuing JSON-RPC requests (§4.1).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::ResilienceError;

/// Connection pool limits (§4.1).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub total: usize,
    pub per_host: usize,
    pub keep_alive: Duration,
    pub dns_cache: Duration,
    /// Closed-connection count past which a pooled client is recycled.
    pub recycle_after_closed: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            total: 50,
            per_host: 20,
            keep_alive: Duration::from_secs(30),
            dns_cache: Duration::from_secs(300),
            recycle_after_closed: 64,
        }
    }
}

/// Buckets a requested timeout into one of §5's three hierarchical tiers so
/// pooled clients are reused across calls that share a tier rather than
/// rebuilt per call (SPEC_FULL "RPC Transport").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutBucket {
    Health,
    Standard,
    Long,
}

impl TimeoutBucket {
    pub fn from_timeout(timeout: Duration) -> Self {
        if timeout <= Duration::from_secs(10) {
            TimeoutBucket::Health
        } else if timeout <= Duration::from_secs(30) {
            TimeoutBucket::Standard
        } else {
            TimeoutBucket::Long
        }
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct PoolKey {
    host: String,
    bucket_tag: u8,
}

struct PooledClient {
    client: reqwest::Client,
    closed_connections: AtomicU32,
}

/// Maintains a reusable `reqwest::Client` per `(host, timeout-bucket)` pair
/// and exposes `post_json` (§4.1).
pub struct RpcTransport {
    pool_config: PoolConfig,
    clients: Arc<DashMap<PoolKey, Arc<PooledClient>>>,
}

impl RpcTransport {
    pub fn new(pool_config: PoolConfig) -> Self {
        let transport = Self {
            pool_config,
            clients: Arc::new(DashMap::new()),
        };
        transport.spawn_sweeper();
        transport
    }

    /// Background sweeper recycling clients whose closed-connection count has
    /// passed the configured threshold (§4.1: "a background sweeper recycles
    /// sessions whose closed-connection count exceeds a threshold").
    fn spawn_sweeper(&self) {
        let clients = self.clients.clone();
        let threshold = self.pool_config.recycle_after_closed;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                clients.retain(|key, pooled| {
                    let keep = pooled.closed_connections.load(Ordering::Relaxed) < threshold;
                    if !keep {
                        debug!(host = %key.host, "recycling pooled HTTP client");
                    }
                    keep
                });
            }
        });
    }

    fn client_for(&self, endpoint: &str, timeout: Duration) -> Result<Arc<PooledClient>, ResilienceError> {
        let url = Url::parse(endpoint).map_err(|e| ResilienceError::Protocol {
            endpoint: endpoint.to_string(),
            detail: format!("invalid endpoint url: {e}"),
        })?;
        let host = url.host_str().unwrap_or("").to_string();
        let bucket = TimeoutBucket::from_timeout(timeout);
        let mut hasher = DefaultHasher::new();
        bucket.hash(&mut hasher);
        let key = PoolKey { host, bucket_tag: (hasher.finish() % 256) as u8 };

        if let Some(existing) = self.clients.get(&key) {
            return Ok(existing.clone());
        }

        // §4.1: connect sub-deadline is min(total/3, 10s).
        let connect_timeout = timeout.div_f64(3.0).min(Duration::from_secs(10));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(self.pool_config.per_host)
            .pool_idle_timeout(self.pool_config.keep_alive)
            .build()
            .map_err(|e| ResilienceError::Connect { endpoint: endpoint.to_string(), detail: e.to_string() })?;

        let pooled = Arc::new(PooledClient { client, closed_connections: AtomicU32::new(0) });
        self.clients.insert(key, pooled.clone());
        Ok(pooled)
    }

    /// Issues a JSON-RPC POST with a total deadline (§4.1). Failure cases —
    /// connect error, read timeout, non-2xx status, malformed JSON — all
    /// raise typed `ResilienceError`s the caller can discriminate (§4.1, §7).
    pub async fn post_json<Req, Resp>(&self, endpoint: &str, body: &Req, timeout: Duration) -> Result<Resp, ResilienceError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let pooled = self.client_for(endpoint, timeout)?;
        let result = pooled.client.post(endpoint).json(body).send().await;

        let response = match result {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(ResilienceError::Timeout { endpoint: endpoint.to_string(), elapsed_ms: timeout.as_millis() as u64 });
            }
            Err(e) if e.is_connect() => {
                pooled.closed_connections.fetch_add(1, Ordering::Relaxed);
                return Err(ResilienceError::Connect { endpoint: endpoint.to_string(), detail: e.to_string() });
            }
            Err(e) => {
                return Err(ResilienceError::Connect { endpoint: endpoint.to_string(), detail: e.to_string() });
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "non-2xx response");
            return Err(ResilienceError::HttpStatus { endpoint: endpoint.to_string(), status: status.as_u16() });
        }

        response.json::<Resp>().await.map_err(|e| ResilienceError::Protocol {
            endpoint: endpoint.to_string(),
            detail: format!("malformed JSON body: {e}"),
        })
    }

    /// Issues a plain GET with a total deadline, for discovery-style calls
    /// like the agent-card endpoint (§6) that carry no request body.
    pub async fn get_json<Resp>(&self, endpoint: &str, timeout: Duration) -> Result<Resp, ResilienceError>
    where
        Resp: DeserializeOwned,
    {
        let pooled = self.client_for(endpoint, timeout)?;
        let result = pooled.client.get(endpoint).send().await;

        let response = match result {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(ResilienceError::Timeout { endpoint: endpoint.to_string(), elapsed_ms: timeout.as_millis() as u64 });
            }
            Err(e) if e.is_connect() => {
                pooled.closed_connections.fetch_add(1, Ordering::Relaxed);
                return Err(ResilienceError::Connect { endpoint: endpoint.to_string(), detail: e.to_string() });
            }
            Err(e) => {
                return Err(ResilienceError::Connect { endpoint: endpoint.to_string(), detail: e.to_string() });
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "non-2xx response");
            return Err(ResilienceError::HttpStatus { endpoint: endpoint.to_string(), status: status.as_u16() });
        }

        response.json::<Resp>().await.map_err(|e| ResilienceError::Protocol {
            endpoint: endpoint.to_string(),
            detail: format!("malformed JSON body: {e}"),
        })
    }
}
