//! Coordination strategies.
//!
//! Each pattern is a free function over an [`ExecutionContext`]; the
//! [`Orchestrator`](crate::Orchestrator) validates the batch and dispatches
//! to one of them. Per-task failures end up in traces and never abort the
//! batch.
//!
//! A task that loses its timeout race is dropped, which cancels it at its
//! next suspension point. Work the agent already handed to the outside world
//! (an HTTP write issued by a tool, say) is not undone.

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::monitor::AgentMonitor;
use crate::registry::AgentRegistry;
use crate::task_graph::TaskGraph;
use crate::types::{ExecutionTrace, OrchestrationResult, Task, TaskFailure};
use concord_agent::Agent;
use concord_core::{ConcordError, ConcordResult};
use futures_util::future::join_all;
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Everything a strategy needs to run tasks.
pub struct ExecutionContext<'a> {
    /// Agents that tasks are dispatched to.
    pub agents: &'a AgentRegistry,
    /// Source of the per-agent breakers.
    pub breakers: &'a CircuitBreakerRegistry,
    /// Budget for tasks without their own `timeout_ms`.
    pub default_timeout: Duration,
    /// Receives every trace when set.
    pub monitor: Option<&'a AgentMonitor>,
}

impl<'a> ExecutionContext<'a> {
    /// Context without a monitor.
    pub fn new(
        agents: &'a AgentRegistry,
        breakers: &'a CircuitBreakerRegistry,
        default_timeout: Duration,
    ) -> Self {
        Self {
            agents,
            breakers,
            default_timeout,
            monitor: None,
        }
    }

    /// Report every trace to `monitor`.
    pub fn with_monitor(mut self, monitor: &'a AgentMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    fn timeout_for(&self, task: &Task) -> Duration {
        task.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout)
    }
}

/// Which side of a timeout race finished first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceOutcome<T> {
    Finished(T),
    TimedOut,
}

/// Race `fut` against a timer. The losing future is dropped.
pub async fn race_with_timeout<F: Future>(fut: F, limit: Duration) -> RaceOutcome<F::Output> {
    match tokio::time::timeout(limit, fut).await {
        Ok(output) => RaceOutcome::Finished(output),
        Err(_) => RaceOutcome::TimedOut,
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Run one task on its assigned agent and record the outcome.
pub async fn run_task(ctx: &ExecutionContext<'_>, task: &Task) -> ExecutionTrace {
    let Some(agent) = ctx.agents.get(&task.assigned_to) else {
        let err = ConcordError::UnknownAgent(task.assigned_to.clone());
        warn!(task = %task.id, agent = %task.assigned_to, "Task assigned to unknown agent");
        let trace = ExecutionTrace::failed(&task.assigned_to, &task.id, TaskFailure::from(&err), 0);
        if let Some(monitor) = ctx.monitor {
            monitor.record_trace(&trace).await;
        }
        return trace;
    };
    run_on_agent(ctx, &task.assigned_to, agent.as_ref(), task).await
}

/// Run `task` on a specific agent, guarded by that agent's breaker and the
/// task's timeout.
pub async fn run_on_agent(
    ctx: &ExecutionContext<'_>,
    agent_id: &str,
    agent: &dyn Agent,
    task: &Task,
) -> ExecutionTrace {
    let start = Instant::now();
    let breaker = ctx.breakers.get_or_create(agent_id);
    let limit = ctx.timeout_for(task);

    if let Some(monitor) = ctx.monitor {
        monitor.start_task(agent_id, &task.id).await;
    }
    debug!(task = %task.id, agent = %agent_id, timeout_ms = limit.as_millis() as u64, "Task started");

    let outcome = breaker
        .execute(|| async {
            match race_with_timeout(agent.invoke(&task.input), limit).await {
                RaceOutcome::Finished(result) => result,
                RaceOutcome::TimedOut => Err(ConcordError::TaskTimeout {
                    task_id: task.id.clone(),
                    timeout_ms: limit.as_millis() as u64,
                }),
            }
        })
        .await;
    let duration_ms = elapsed_ms(start);

    let trace = match outcome {
        Ok(value) => {
            info!(task = %task.id, agent = %agent_id, duration_ms, "Task completed");
            ExecutionTrace::succeeded(agent_id, &task.id, value, duration_ms)
        }
        Err(err) => {
            warn!(task = %task.id, agent = %agent_id, duration_ms, error = %err, "Task failed");
            ExecutionTrace::failed(agent_id, &task.id, TaskFailure::from(&err), duration_ms)
        }
    };
    if let Some(monitor) = ctx.monitor {
        monitor.record_trace(&trace).await;
    }
    trace
}

/// Dependency order, one task at a time. Ties among ready tasks go to the
/// higher priority. A failed task still counts as settled for its dependents.
pub async fn sequential(
    ctx: &ExecutionContext<'_>,
    tasks: &[Task],
) -> ConcordResult<OrchestrationResult> {
    let start = Instant::now();
    let order = TaskGraph::build(tasks)?.execution_order();

    let mut traces = Vec::with_capacity(order.len());
    for task in order {
        traces.push(run_task(ctx, task).await);
    }
    Ok(OrchestrationResult::from_traces(traces, elapsed_ms(start)))
}

/// All tasks at once; waits for every one to settle. Traces follow input order.
pub async fn parallel(ctx: &ExecutionContext<'_>, tasks: &[Task]) -> OrchestrationResult {
    let start = Instant::now();
    let traces = join_all(tasks.iter().map(|task| run_task(ctx, task))).await;
    OrchestrationResult::from_traces(traces, elapsed_ms(start))
}

/// The first task runs as coordinator, then the rest run in parallel.
///
/// The coordinator's output is recorded but does not reshape the remaining
/// tasks.
pub async fn hierarchical(ctx: &ExecutionContext<'_>, tasks: &[Task]) -> OrchestrationResult {
    let start = Instant::now();
    let Some((coordinator, workers)) = tasks.split_first() else {
        return OrchestrationResult::from_traces(Vec::new(), 0);
    };

    let lead = run_task(ctx, coordinator).await;
    info!(
        task = %coordinator.id,
        agent = %coordinator.assigned_to,
        ok = lead.is_success(),
        workers = workers.len(),
        "Coordinator finished, dispatching workers"
    );

    let mut traces = Vec::with_capacity(tasks.len());
    traces.push(lead);
    traces.extend(join_all(workers.iter().map(|task| run_task(ctx, task))).await);
    OrchestrationResult::from_traces(traces, elapsed_ms(start))
}

/// Every registered agent attempts the first task; one result is chosen.
///
/// `success` means at least one agent produced a result. `results` maps the
/// task ID to the consensus value.
pub async fn collaborative(ctx: &ExecutionContext<'_>, tasks: &[Task]) -> OrchestrationResult {
    let start = Instant::now();
    let Some(task) = tasks.first() else {
        warn!("Collaborative orchestration called with no tasks");
        return OrchestrationResult {
            success: false,
            results: Default::default(),
            traces: Vec::new(),
            total_duration_ms: 0,
        };
    };

    let attempts = ctx
        .agents
        .iter()
        .map(|(id, agent)| run_on_agent(ctx, id, agent.as_ref(), task));
    let traces = join_all(attempts).await;

    let votes: Vec<Value> = traces
        .iter()
        .filter(|t| t.is_success())
        .filter_map(|t| t.result.clone())
        .collect();
    let consensus = find_consensus(&votes);
    info!(
        task = %task.id,
        agents = traces.len(),
        votes = votes.len(),
        "Collaborative round finished"
    );

    let mut results = std::collections::HashMap::new();
    if !votes.is_empty() {
        results.insert(task.id.clone(), consensus);
    }
    OrchestrationResult {
        success: !votes.is_empty(),
        results,
        traces,
        total_duration_ms: elapsed_ms(start),
    }
}

/// Pick one value among agent results, in registration order.
///
/// The first value that is not `null` and does not carry a truthy `"error"`
/// field wins. Otherwise the first value, or `null` when there are none.
pub fn find_consensus(votes: &[Value]) -> Value {
    votes
        .iter()
        .find(|v| !v.is_null() && !reports_error(v))
        .or_else(|| votes.first())
        .cloned()
        .unwrap_or(Value::Null)
}

fn reports_error(value: &Value) -> bool {
    match value.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}
