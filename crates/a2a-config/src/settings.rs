//! Layered configuration (§6 "Configuration"): built-in defaults, an optional
//! TOML file, then `A2A__*` environment overrides, in that order — the same
//! precedence the teacher's config crate documents, expressed with the
//! `config` crate directly instead of the teacher's hand-rolled hot-reload
//! loader (no spec requirement calls for hot reload here).

use std::path::{Path, PathBuf};
use std::time::Duration;

use a2a_core::CoreConfig;
use a2a_resilience::{CircuitBreakerConfig, PoolConfig, RetryConfig};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CircuitSettings {
    #[validate(range(min = 1))]
    pub failure_threshold: u64,
    pub open_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub half_open_max_calls: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetrySettings {
    #[validate(range(min = 1))]
    pub max_attempts: u32,
    pub base_delay_secs: f64,
    #[validate(range(min = 1.0))]
    pub backoff: f64,
    pub max_delay_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PoolSettings {
    #[validate(range(min = 1))]
    pub total: usize,
    #[validate(range(min = 1))]
    pub per_host: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TimeoutSettings {
    pub health_secs: u64,
    pub standard_secs: u64,
    pub long_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HealthSettings {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SummarySettings {
    #[validate(range(min = 1))]
    pub message_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MemorySettings {
    #[validate(range(min = 1))]
    pub tool_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PlanSettings {
    #[validate(range(min = 1))]
    pub max_task_attempts: u32,
}

/// The full recognized option set (§6 Configuration table), one field group
/// per subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    pub service_name: String,
    pub data_dir: PathBuf,
    #[validate(nested)]
    pub circuit: CircuitSettings,
    #[validate(nested)]
    pub retry: RetrySettings,
    #[validate(nested)]
    pub pool: PoolSettings,
    #[validate(nested)]
    pub timeout: TimeoutSettings,
    #[validate(nested)]
    pub health: HealthSettings,
    #[validate(nested)]
    pub summary: SummarySettings,
    #[validate(nested)]
    pub memory: MemorySettings,
    #[validate(nested)]
    pub plan: PlanSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "a2a-orchestrator".to_string(),
            data_dir: PathBuf::from("./data"),
            circuit: CircuitSettings { failure_threshold: 5, open_timeout_secs: 60, half_open_max_calls: 3 },
            retry: RetrySettings { max_attempts: 3, base_delay_secs: 1.0, backoff: 2.0, max_delay_secs: 30.0 },
            pool: PoolSettings { total: 50, per_host: 20 },
            timeout: TimeoutSettings { health_secs: 10, standard_secs: 30, long_secs: 120 },
            health: HealthSettings { interval_secs: 30 },
            summary: SummarySettings { message_threshold: 20 },
            memory: MemorySettings { tool_threshold: 8 },
            plan: PlanSettings { max_task_attempts: 3 },
        }
    }
}

impl AppConfig {
    /// Layers built-in defaults under an optional TOML file under
    /// `A2A__SECTION__FIELD` environment overrides (e.g. `A2A__RETRY__MAX_ATTEMPTS=5`).
    pub fn load(file_path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut builder = Config::builder().add_source(Config::try_from(&defaults)?);

        if let Some(path) = file_path {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder = builder.add_source(Environment::with_prefix("A2A").separator("__"));

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate().map_err(|e| ConfigError::Validation(e.to_string()))?;
        Ok(config)
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit.failure_threshold,
            open_timeout: Duration::from_secs(self.circuit.open_timeout_secs),
            half_open_max_calls: self.circuit.half_open_max_calls,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_secs_f64(self.retry.base_delay_secs),
            backoff: self.retry.backoff,
            max_delay: Duration::from_secs_f64(self.retry.max_delay_secs),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig { total: self.pool.total, per_host: self.pool.per_host, ..PoolConfig::default() }
    }

    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            max_task_attempts: self.plan.max_task_attempts,
            standard_timeout: Duration::from_secs(self.timeout.standard_secs),
            long_timeout: Duration::from_secs(self.timeout.long_secs),
            summary_message_threshold: self.summary.message_threshold,
            memory_tool_threshold: self.memory.tool_threshold,
        }
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.health_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health.interval_secs)
    }
}
