use concord_core::ConcordError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Scheduling priority of a task. Ordered `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Runs last among ready tasks.
    Low,
    /// Default priority.
    #[default]
    Medium,
    /// Runs before medium and low.
    High,
    /// Runs first among ready tasks.
    Critical,
}

/// One unit of requested work, assigned to exactly one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique within a batch.
    pub id: String,
    /// Agent ID.
    pub assigned_to: String,
    /// Passed verbatim to the agent.
    pub input: String,
    /// Breaks ties between ready tasks in sequential runs.
    #[serde(default)]
    pub priority: Priority,
    /// IDs of tasks in the same batch that must settle first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Per-task budget; the orchestrator default applies when unset.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Task {
    /// Medium-priority task with no dependencies and the default timeout.
    pub fn new(
        id: impl Into<String>,
        assigned_to: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            assigned_to: assigned_to.into(),
            input: input.into(),
            priority: Priority::default(),
            dependencies: Vec::new(),
            timeout_ms: None,
        }
    }

    /// Set `priority`.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Tasks that must settle before this one runs.
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Override the default timeout for this task.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Class of a per-task failure, kept separate from the message so callers can
/// decide on retries without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected by the agent's breaker.
    CircuitOpen,
    /// Lost the race against the task timeout.
    Timeout,
    /// No agent is registered under the assigned ID.
    UnknownAgent,
    /// The model never produced a parseable decision.
    MalformedOutput,
    /// The agent failed in a way that may pass on a later attempt.
    AgentFailed,
    /// The agent failed in a way a resubmission cannot fix.
    Fatal,
}

impl FailureKind {
    /// Whether a later attempt may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::CircuitOpen | FailureKind::Timeout | FailureKind::AgentFailed
        )
    }
}

/// Structured error recorded in an [`ExecutionTrace`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Failure class.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub message: String,
}

impl TaskFailure {
    /// Failure of the given class.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&ConcordError> for TaskFailure {
    fn from(err: &ConcordError) -> Self {
        let kind = match err {
            ConcordError::CircuitOpen { .. } => FailureKind::CircuitOpen,
            ConcordError::TaskTimeout { .. } => FailureKind::Timeout,
            ConcordError::UnknownAgent(_) => FailureKind::UnknownAgent,
            ConcordError::MalformedOutput(_) => FailureKind::MalformedOutput,
            other if other.is_retryable() => FailureKind::AgentFailed,
            _ => FailureKind::Fatal,
        };
        Self::new(kind, err.to_string())
    }
}

/// Immutable record of one attempted task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrace {
    /// Agent the task was assigned to.
    pub agent_id: String,
    /// Task this trace belongs to.
    pub task_id: String,
    /// Agent output; `None` on failure.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Wall time of the attempt; 0 when it never reached an agent.
    pub duration_ms: u64,
    /// Set when the attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
}

impl ExecutionTrace {
    /// Trace of a successful attempt.
    pub fn succeeded(
        agent_id: impl Into<String>,
        task_id: impl Into<String>,
        result: serde_json::Value,
        duration_ms: u64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            task_id: task_id.into(),
            result: Some(result),
            duration_ms,
            error: None,
        }
    }

    /// Trace of a failed attempt.
    pub fn failed(
        agent_id: impl Into<String>,
        task_id: impl Into<String>,
        error: TaskFailure,
        duration_ms: u64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            task_id: task_id.into(),
            result: None,
            duration_ms,
            error: Some(error),
        }
    }

    /// Whether the attempt succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate outcome of one `orchestrate` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    /// Whether the batch as a whole succeeded.
    pub success: bool,
    /// Results of successful tasks, keyed by task ID.
    pub results: HashMap<String, serde_json::Value>,
    /// One trace per attempt: execution order for sequential runs, input
    /// order otherwise.
    pub traces: Vec<ExecutionTrace>,
    /// Wall time of the whole call.
    pub total_duration_ms: u64,
}

impl OrchestrationResult {
    /// Aggregate traces with `success` = no trace carries an error.
    pub fn from_traces(traces: Vec<ExecutionTrace>, total_duration_ms: u64) -> Self {
        let success = traces.iter().all(ExecutionTrace::is_success);
        let results = collect_results(&traces);
        Self {
            success,
            results,
            traces,
            total_duration_ms,
        }
    }

    /// Traces that failed, in trace order.
    pub fn failures(&self) -> impl Iterator<Item = &ExecutionTrace> {
        self.traces.iter().filter(|t| !t.is_success())
    }
}

fn collect_results(traces: &[ExecutionTrace]) -> HashMap<String, serde_json::Value> {
    traces
        .iter()
        .filter(|t| t.is_success())
        .filter_map(|t| t.result.clone().map(|r| (t.task_id.clone(), r)))
        .collect()
}

/// Coordination pattern applied to a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestrationPattern {
    /// Dependency order, one task at a time.
    #[default]
    Sequential,
    /// Every task at once.
    Parallel,
    /// First task as coordinator, the rest in parallel.
    Hierarchical,
    /// Every agent attempts the first task; one result is chosen.
    Collaborative,
}

impl fmt::Display for OrchestrationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestrationPattern::Sequential => write!(f, "sequential"),
            OrchestrationPattern::Parallel => write!(f, "parallel"),
            OrchestrationPattern::Hierarchical => write!(f, "hierarchical"),
            OrchestrationPattern::Collaborative => write!(f, "collaborative"),
        }
    }
}

impl FromStr for OrchestrationPattern {
    type Err = ConcordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            "hierarchical" => Ok(Self::Hierarchical),
            "collaborative" => Ok(Self::Collaborative),
            other => Err(ConcordError::Config(format!(
                "unknown orchestration pattern '{other}'"
            ))),
        }
    }
}
