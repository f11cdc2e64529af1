use crate::backoff::BackoffPolicy;
use crate::config::RetryConfig;
use crate::types::{ExecutionTrace, Task};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use concord_core::ConcordError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Lifecycle of a retryable task.
///
/// `Queued → Processing → Completed | Failed | PendingRetry`; a pending
/// retry becomes ready again once its `next_run_at` has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    /// Waiting for its first run.
    Queued,
    /// Currently running.
    Processing,
    /// Finished successfully.
    Completed,
    /// Terminal failure; no retries left or not retryable.
    Failed,
    /// Waiting for `next_run_at`.
    PendingRetry,
}

/// A [`Task`] plus its retry bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryableTask {
    /// The wrapped task.
    #[serde(flatten)]
    pub task: Task,
    /// Lifecycle state.
    pub status: RetryStatus,
    /// Retry decisions taken so far.
    pub retry_count: u32,
    /// Retry budget.
    pub max_retries: u32,
    /// Earliest time a pending retry may run.
    #[serde(default)]
    pub next_run_at: Option<DateTime<Utc>>,
    /// Start of the latest run.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task became terminal.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Last lifecycle change.
    pub updated_at: DateTime<Utc>,
    /// Last failure message.
    #[serde(default)]
    pub error: Option<String>,
}

impl RetryableTask {
    /// A queued task with no retries spent.
    pub fn new(task: Task, max_retries: u32) -> Self {
        Self {
            task,
            status: RetryStatus::Queued,
            retry_count: 0,
            max_retries,
            next_run_at: None,
            started_at: None,
            completed_at: None,
            updated_at: Utc::now(),
            error: None,
        }
    }

    /// Task ID.
    pub fn id(&self) -> &str {
        &self.task.id
    }

    /// Record the start of a run.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = RetryStatus::Processing;
        self.started_at = Some(now);
        self.next_run_at = None;
        self.updated_at = now;
    }

    /// Record a successful run.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = RetryStatus::Completed;
        self.completed_at = Some(now);
        self.next_run_at = None;
        self.error = None;
        self.updated_at = now;
    }

    fn mark_failed(&mut self, now: DateTime<Utc>, error: String) {
        self.status = RetryStatus::Failed;
        self.completed_at = Some(now);
        self.next_run_at = None;
        self.error = Some(error);
        self.updated_at = now;
    }

    /// Queued tasks are always ready; pending retries only once `next_run_at`
    /// is not in the future.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            RetryStatus::Queued => true,
            RetryStatus::PendingRetry => self.next_run_at.is_some_and(|at| at <= now),
            _ => false,
        }
    }

    /// Processing for longer than the task's own timeout, or `limit` when it
    /// has none.
    pub fn is_stalled(&self, now: DateTime<Utc>, limit: Duration) -> bool {
        if self.status != RetryStatus::Processing {
            return false;
        }
        let Some(started) = self.started_at else {
            return false;
        };
        let budget_ms = match self.task.timeout_ms {
            Some(ms) => i64::try_from(ms).unwrap_or(i64::MAX),
            None => i64::try_from(limit.as_millis()).unwrap_or(i64::MAX),
        };
        (now - started).num_milliseconds() > budget_ms
    }

    /// Completed or failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RetryStatus::Completed | RetryStatus::Failed)
    }
}

/// `now + delay_ms`, saturating at the latest representable instant.
fn offset_by_ms(now: DateTime<Utc>, delay_ms: u64) -> DateTime<Utc> {
    i64::try_from(delay_ms)
        .ok()
        .and_then(ChronoDuration::try_milliseconds)
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Decides whether a failed task is rescheduled or failed for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts.
    pub backoff: BackoffPolicy,
    /// Budget given to newly tracked tasks.
    pub max_retries: u32,
    /// Processing time after which a task without its own timeout counts as stalled.
    pub stalled_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Policy built from the `[retry]` config section.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            backoff: BackoffPolicy::new(config.base_ms, config.max_ms),
            max_retries: config.max_retries,
            stalled_after: Duration::from_millis(config.stalled_after_ms),
        }
    }

    /// Wrap a task with this policy's retry budget.
    pub fn track(&self, task: Task) -> RetryableTask {
        RetryableTask::new(task, self.max_retries)
    }

    /// [`schedule_retry_at`](Self::schedule_retry_at) with the current time.
    pub fn schedule_retry(&self, task: RetryableTask) -> RetryableTask {
        self.schedule_retry_at(task, Utc::now())
    }

    /// Reschedule with backoff while budget remains; otherwise fail for good.
    ///
    /// Either way `retry_count` goes up by exactly one.
    pub fn schedule_retry_at(&self, mut task: RetryableTask, now: DateTime<Utc>) -> RetryableTask {
        task.updated_at = now;
        if task.retry_count < task.max_retries {
            task.retry_count += 1;
            let delay_ms = self.backoff.delay_ms(i64::from(task.retry_count));
            task.status = RetryStatus::PendingRetry;
            task.next_run_at = Some(offset_by_ms(now, delay_ms));
            info!(
                task = %task.task.id,
                retry = task.retry_count,
                max_retries = task.max_retries,
                delay_ms,
                "Task scheduled for retry"
            );
        } else {
            task.retry_count = task.retry_count.saturating_add(1);
            let error = ConcordError::MaxRetriesExceeded {
                max_retries: task.max_retries,
            };
            warn!(task = %task.task.id, retries = task.retry_count, "Task failed permanently");
            task.mark_failed(now, error.to_string());
        }
        task
    }

    /// Fold one execution trace into the task's lifecycle.
    ///
    /// Success completes the task. A retryable failure goes through
    /// [`schedule_retry_at`](Self::schedule_retry_at); anything else fails the
    /// task without spending retries.
    pub fn apply_trace(
        &self,
        mut task: RetryableTask,
        trace: &ExecutionTrace,
        now: DateTime<Utc>,
    ) -> RetryableTask {
        match &trace.error {
            None => {
                task.mark_completed(now);
                task
            }
            Some(failure) if failure.is_retryable() => {
                let retried = self.schedule_retry_at(task, now);
                if retried.status == RetryStatus::PendingRetry {
                    RetryableTask {
                        error: Some(failure.message.clone()),
                        ..retried
                    }
                } else {
                    retried
                }
            }
            Some(failure) => {
                warn!(task = %task.task.id, kind = ?failure.kind, "Task failed with non-retryable error");
                task.mark_failed(now, failure.message.clone());
                task
            }
        }
    }

    /// Stalled tasks among `tasks`.
    pub fn detect_stalled<'a>(
        &self,
        tasks: &'a [RetryableTask],
        now: DateTime<Utc>,
    ) -> Vec<&'a RetryableTask> {
        tasks
            .iter()
            .filter(|t| t.is_stalled(now, self.stalled_after))
            .collect()
    }

    /// Re-queue a stalled task through the retry path, or fail it once the
    /// budget is spent.
    pub fn recover_stalled(&self, task: RetryableTask, now: DateTime<Utc>) -> RetryableTask {
        warn!(task = %task.task.id, agent = %task.task.assigned_to, "Stalled task detected");
        let mut task = self.schedule_retry_at(task, now);
        let detail = match task.status {
            RetryStatus::PendingRetry => format!(
                "Task stalled (attempt {} of {})",
                task.retry_count, task.max_retries
            ),
            _ => format!(
                "Task stalled after repeated attempts: {}",
                task.error.as_deref().unwrap_or_default()
            ),
        };
        task.error = Some(detail);
        task
    }
}
