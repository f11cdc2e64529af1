use thiserror::Error;

/// A convenience `Result` alias using [`ConcordError`].
pub type ConcordResult<T> = Result<T, ConcordError>;

/// Top-level error type for the concord orchestration core.
///
/// Per-task variants (`CircuitOpen`, `TaskTimeout`, `UnknownAgent`,
/// `MalformedOutput`) are recorded in execution traces and never cross the
/// orchestrator boundary. Batch-level variants (`CyclicDependency`,
/// `UnknownDependency`, `DuplicateTask`) abort an orchestration call before
/// any task runs.
#[derive(Error, Debug)]
pub enum ConcordError {
    /// The agent's circuit breaker rejected the call.
    #[error("Circuit breaker OPEN for agent '{agent}' (retry in {retry_after_ms}ms)")]
    CircuitOpen {
        /// Agent whose breaker is open.
        agent: String,
        /// Remaining cool-down before a trial call is allowed.
        retry_after_ms: u64,
    },

    /// The agent call lost the race against the task's timer.
    #[error("Task timeout")]
    TaskTimeout {
        /// Task that timed out.
        task_id: String,
        /// Budget the task was given.
        timeout_ms: u64,
    },

    /// No agent is registered under the task's assigned ID.
    #[error("Agent '{0}' not found")]
    UnknownAgent(String),

    /// The task dependency graph contains a cycle.
    #[error("Cyclic dependency detected at task '{task_id}'")]
    CyclicDependency {
        /// A task that participates in the cycle.
        task_id: String,
    },

    /// A task depends on an ID that is not part of the batch.
    #[error("Task '{task_id}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        /// Task declaring the dependency.
        task_id: String,
        /// The missing dependency.
        dependency: String,
    },

    /// Two tasks in one batch share an ID.
    #[error("Duplicate task id '{0}'")]
    DuplicateTask(String),

    /// The model kept answering with unparseable output after corrective re-prompts.
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    /// The retry budget of a task is exhausted.
    #[error("Maximum retries exceeded ({max_retries})")]
    MaxRetriesExceeded {
        /// Configured retry budget.
        max_retries: u32,
    },

    /// An agent invocation failed for an agent-specific reason.
    #[error("Agent error: {0}")]
    Agent(String),

    /// The language model call failed.
    #[error("LLM error: {0}")]
    Llm(String),

    /// A tool invocation failed.
    #[error("Tool error: {0}")]
    Tool(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConcordError {
    /// Whether resubmitting the same work later may succeed without the caller
    /// changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConcordError::CircuitOpen { .. }
                | ConcordError::TaskTimeout { .. }
                | ConcordError::Agent(_)
                | ConcordError::Llm(_)
        )
    }
}
