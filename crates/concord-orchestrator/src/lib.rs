//! Multi-agent task orchestration with failure isolation.
//!
//! Runs a batch of tasks against registered agents under one of four
//! coordination patterns, guards each agent with its own circuit breaker,
//! races every call against a timeout, and schedules retries of failed tasks
//! with jittered exponential backoff.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Validates a batch and dispatches it to a strategy.
//! - [`AgentRegistry`] — Agents available to an orchestrator, in registration order.
//! - [`CircuitBreakerRegistry`] — Per-agent breakers with a transition event stream.
//! - [`TaskGraph`] — Dependency validation and priority-aware topological order.
//! - [`RetryPolicy`] — Retry scheduling and stalled-task recovery.
//! - [`AgentMonitor`] — Per-agent execution metrics.

/// Jittered exponential backoff.
pub mod backoff;
/// Per-agent circuit breakers.
pub mod circuit_breaker;
/// TOML configuration.
pub mod config;
/// Orchestration entry point.
pub mod engine;
/// Agent metrics.
pub mod monitor;
/// Agent registry.
pub mod registry;
/// Retry policy for failed tasks.
pub mod retry;
/// Coordination strategies and the timeout race.
pub mod strategy;
/// Task dependency graph.
pub mod task_graph;
/// Shared orchestration types (Task, ExecutionTrace, OrchestrationResult, etc.).
pub mod types;

pub use backoff::BackoffPolicy;
pub use circuit_breaker::{
    BreakerConfig, BreakerEvent, BreakerStats, CircuitBreaker, CircuitBreakerRegistry,
    CircuitState,
};
pub use config::{OrchestratorConfig, RetryConfig};
pub use engine::Orchestrator;
pub use monitor::{AgentMetrics, AgentMonitor, AgentState, WorkerStatus};
pub use registry::AgentRegistry;
pub use retry::{RetryPolicy, RetryStatus, RetryableTask};
pub use strategy::{find_consensus, race_with_timeout, ExecutionContext, RaceOutcome};
pub use task_graph::TaskGraph;
pub use types::{
    ExecutionTrace, FailureKind, OrchestrationPattern, OrchestrationResult, Priority, Task,
    TaskFailure,
};
