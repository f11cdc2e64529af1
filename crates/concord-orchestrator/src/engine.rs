use crate::circuit_breaker::{BreakerStats, CircuitBreakerRegistry};
use crate::config::OrchestratorConfig;
use crate::monitor::AgentMonitor;
use crate::registry::AgentRegistry;
use crate::retry::RetryPolicy;
use crate::strategy::{self, ExecutionContext};
use crate::task_graph::TaskGraph;
use crate::types::{OrchestrationPattern, OrchestrationResult, Task};
use concord_core::ConcordResult;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The multi-agent orchestrator.
/// Validates a batch, applies one coordination pattern, aggregates traces.
pub struct Orchestrator {
    agents: AgentRegistry,
    breakers: Arc<CircuitBreakerRegistry>,
    monitor: Arc<AgentMonitor>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator over `agents`, sharing `breakers` with whoever
    /// else holds the registry.
    pub fn new(agents: AgentRegistry, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            agents,
            breakers,
            monitor: Arc::new(AgentMonitor::new()),
            config: OrchestratorConfig::default(),
        }
    }

    /// Create an orchestrator with a fresh breaker registry built from
    /// `config.breaker`.
    pub fn from_config(agents: AgentRegistry, config: OrchestratorConfig) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker));
        Self::new(agents, breakers).with_config(config)
    }

    /// Replace the configuration. Breaker settings are taken from the registry, not from `config`.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        if config.breaker != *self.breakers.config() {
            warn!("Breaker settings in config differ from the injected registry; the registry wins");
        }
        self.config = config;
        self
    }

    /// Registered agents.
    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// The shared breaker registry, e.g. to `subscribe()` to transitions.
    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Per-agent execution metrics.
    pub fn monitor(&self) -> &Arc<AgentMonitor> {
        &self.monitor
    }

    /// Active configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Retry policy matching this orchestrator's configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config.retry)
    }

    /// Run a batch under `pattern`.
    ///
    /// The batch is validated first: duplicate IDs, unknown dependencies and
    /// dependency cycles return an error before any task runs. After that,
    /// per-task failures only show up in the traces.
    pub async fn orchestrate(
        &self,
        tasks: &[Task],
        pattern: OrchestrationPattern,
    ) -> ConcordResult<OrchestrationResult> {
        let run_id = Uuid::new_v4();
        info!(%run_id, %pattern, tasks = tasks.len(), "Orchestration started");

        if let Err(e) = TaskGraph::build(tasks) {
            error!(%run_id, error = %e, "Rejected task batch");
            return Err(e);
        }

        let ctx = ExecutionContext::new(
            &self.agents,
            &self.breakers,
            Duration::from_millis(self.config.default_timeout_ms),
        )
        .with_monitor(&self.monitor);

        let result = match pattern {
            OrchestrationPattern::Sequential => strategy::sequential(&ctx, tasks).await?,
            OrchestrationPattern::Parallel => strategy::parallel(&ctx, tasks).await,
            OrchestrationPattern::Hierarchical => strategy::hierarchical(&ctx, tasks).await,
            OrchestrationPattern::Collaborative => strategy::collaborative(&ctx, tasks).await,
        };

        let failed = result.failures().count();
        if result.success {
            info!(
                %run_id,
                traces = result.traces.len(),
                duration_ms = result.total_duration_ms,
                "Orchestration complete"
            );
        } else {
            warn!(
                %run_id,
                traces = result.traces.len(),
                failed,
                duration_ms = result.total_duration_ms,
                "Orchestration finished with failures"
            );
        }
        Ok(result)
    }

    /// Run a batch under the configured default pattern.
    pub async fn run(&self, tasks: &[Task]) -> ConcordResult<OrchestrationResult> {
        self.orchestrate(tasks, self.config.default_pattern).await
    }

    /// Stats of every breaker that has seen a call. Read-only.
    pub fn circuit_breaker_status(&self) -> BTreeMap<String, BreakerStats> {
        self.breakers.status()
    }
}
