use crate::types::{ExecutionTrace, FailureKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Execution counters for one agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Finished attempts, including rejections.
    pub runs: u64,
    /// Attempts without an error.
    pub successes: u64,
    /// Attempts with any error.
    pub failures: u64,
    /// Failures that were timeouts.
    pub timeouts: u64,
    /// Failures rejected by an open breaker.
    pub circuit_rejections: u64,
    /// Sum of trace durations.
    pub duration_ms: u64,
}

/// What an agent is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Waiting for work.
    Idle,
    /// Running a task.
    Working,
    /// Its last attempt failed.
    Error,
}

/// Real-time snapshot of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    /// Agent this snapshot is about.
    pub agent_id: String,
    /// Task currently running, if any.
    pub current_task: Option<String>,
    /// Current status.
    pub status: WorkerStatus,
    /// Counters since the monitor was created.
    pub metrics: AgentMetrics,
}

impl AgentState {
    fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            current_task: None,
            status: WorkerStatus::Idle,
            metrics: AgentMetrics::default(),
        }
    }
}

/// Tracks state and metrics for every agent the orchestrator has invoked.
pub struct AgentMonitor {
    states: Arc<RwLock<HashMap<String, AgentState>>>,
}

impl AgentMonitor {
    /// Monitor with no agents tracked.
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Mark an agent as working on a task.
    pub async fn start_task(&self, agent_id: &str, task_id: &str) {
        let mut states = self.states.write().await;
        let state = states
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentState::new(agent_id));
        state.current_task = Some(task_id.to_string());
        state.status = WorkerStatus::Working;
    }

    /// Fold a finished attempt into the agent's metrics.
    pub async fn record_trace(&self, trace: &ExecutionTrace) {
        let mut states = self.states.write().await;
        let state = states
            .entry(trace.agent_id.clone())
            .or_insert_with(|| AgentState::new(&trace.agent_id));
        let metrics = &mut state.metrics;
        metrics.runs += 1;
        metrics.duration_ms += trace.duration_ms;
        match trace.error.as_ref().map(|e| e.kind) {
            None => metrics.successes += 1,
            Some(kind) => {
                metrics.failures += 1;
                match kind {
                    FailureKind::Timeout => metrics.timeouts += 1,
                    FailureKind::CircuitOpen => metrics.circuit_rejections += 1,
                    _ => {}
                }
            }
        }
        state.current_task = None;
        state.status = if trace.is_success() {
            WorkerStatus::Idle
        } else {
            WorkerStatus::Error
        };
    }

    /// All agent states, sorted by agent ID.
    pub async fn snapshot(&self) -> Vec<AgentState> {
        let states = self.states.read().await;
        let mut all: Vec<AgentState> = states.values().cloned().collect();
        all.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        all
    }

    /// Snapshot of one agent, if it has run anything.
    pub async fn get_state(&self, agent_id: &str) -> Option<AgentState> {
        self.states.read().await.get(agent_id).cloned()
    }

    /// Sum of all agents' metrics.
    pub async fn aggregate_metrics(&self) -> AgentMetrics {
        let states = self.states.read().await;
        let mut total = AgentMetrics::default();
        for state in states.values() {
            total.runs += state.metrics.runs;
            total.successes += state.metrics.successes;
            total.failures += state.metrics.failures;
            total.timeouts += state.metrics.timeouts;
            total.circuit_rejections += state.metrics.circuit_rejections;
            total.duration_ms += state.metrics.duration_ms;
        }
        total
    }

    /// All agent states as a JSON array, sorted by agent ID.
    pub async fn to_json(&self) -> serde_json::Value {
        let states = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "agents": states,
            "aggregate": aggregate,
        })
    }
}

impl Default for AgentMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::TaskFailure;
    use serde_json::json;

    #[tokio::test]
    async fn test_start_and_finish() {
        let monitor = AgentMonitor::new();
        monitor.start_task("writer", "t1").await;
        let state = monitor.get_state("writer").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Working);
        assert_eq!(state.current_task.as_deref(), Some("t1"));

        monitor
            .record_trace(&ExecutionTrace::succeeded("writer", "t1", json!("ok"), 12))
            .await;
        let state = monitor.get_state("writer").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Idle);
        assert!(state.current_task.is_none());
        assert_eq!(state.metrics.successes, 1);
        assert_eq!(state.metrics.duration_ms, 12);
    }

    #[tokio::test]
    async fn test_failure_kinds_are_counted() {
        let monitor = AgentMonitor::new();
        let timeout = TaskFailure::new(FailureKind::Timeout, "Task timeout");
        let open = TaskFailure::new(FailureKind::CircuitOpen, "open");
        monitor
            .record_trace(&ExecutionTrace::failed("a", "t1", timeout, 50))
            .await;
        monitor
            .record_trace(&ExecutionTrace::failed("a", "t2", open, 0))
            .await;

        let state = monitor.get_state("a").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Error);
        assert_eq!(state.metrics.runs, 2);
        assert_eq!(state.metrics.failures, 2);
        assert_eq!(state.metrics.timeouts, 1);
        assert_eq!(state.metrics.circuit_rejections, 1);
    }

    #[tokio::test]
    async fn test_aggregate_and_json() {
        let monitor = AgentMonitor::new();
        monitor
            .record_trace(&ExecutionTrace::succeeded("b", "t1", json!(1), 5))
            .await;
        monitor
            .record_trace(&ExecutionTrace::succeeded("a", "t2", json!(2), 7))
            .await;

        let agg = monitor.aggregate_metrics().await;
        assert_eq!(agg.runs, 2);
        assert_eq!(agg.duration_ms, 12);

        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot[0].agent_id, "a");

        let json = monitor.to_json().await;
        assert!(json["agents"].is_array());
        assert_eq!(json["aggregate"]["successes"], 2);
    }
}
