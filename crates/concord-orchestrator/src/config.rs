use crate::circuit_breaker::BreakerConfig;
use crate::types::OrchestrationPattern;
use concord_core::{ConcordError, ConcordResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level orchestrator configuration. Every field has a default, so an
/// empty TOML document is valid.
///
/// ```toml
/// default_timeout_ms = 30000
/// default_pattern = "parallel"
///
/// [breaker]
/// failure_threshold = 3
///
/// [retry]
/// max_retries = 5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Budget for tasks that do not set `timeout_ms`.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Pattern used by [`Orchestrator::run`](crate::Orchestrator::run).
    #[serde(default)]
    pub default_pattern: OrchestrationPattern,
    /// Settings for every per-agent breaker.
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Retry scheduling for failed tasks.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            default_pattern: OrchestrationPattern::default(),
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Backoff and retry budget for failed tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay of the first retry before doubling.
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,
    /// Cap on a single delay; at most [`MAX_RETRY_DELAY_MS`].
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
    /// Retries before a task fails for good.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Processing time after which a task without its own timeout is stalled.
    #[serde(default = "default_stalled_after_ms")]
    pub stalled_after_ms: u64,
}

/// Upper bound accepted for `retry.max_ms` (30 days).
pub const MAX_RETRY_DELAY_MS: u64 = 30 * 24 * 60 * 60 * 1000;

fn default_base_ms() -> u64 {
    10_000
}

fn default_max_ms() -> u64 {
    600_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_stalled_after_ms() -> u64 {
    600_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            max_ms: default_max_ms(),
            max_retries: default_max_retries(),
            stalled_after_ms: default_stalled_after_ms(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> ConcordResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ConcordError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file. Read failures surface as `Io`, bad content as `Config`.
    pub fn load(path: impl AsRef<Path>) -> ConcordResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
            .map_err(|e| ConcordError::Config(format!("{}: {e}", path.display())))
    }

    fn validate(&self) -> ConcordResult<()> {
        if self.default_timeout_ms == 0 {
            return Err(ConcordError::Config(
                "default_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.breaker.failure_threshold == 0 || self.breaker.success_threshold == 0 {
            return Err(ConcordError::Config(
                "breaker thresholds must be greater than zero".into(),
            ));
        }
        if self.retry.max_ms > MAX_RETRY_DELAY_MS {
            return Err(ConcordError::Config(format!(
                "retry.max_ms ({}) exceeds the limit of {MAX_RETRY_DELAY_MS}ms",
                self.retry.max_ms
            )));
        }
        if self.retry.base_ms > self.retry.max_ms {
            return Err(ConcordError::Config(format!(
                "retry.base_ms ({}) exceeds retry.max_ms ({})",
                self.retry.base_ms, self.retry.max_ms
            )));
        }
        Ok(())
    }
}
