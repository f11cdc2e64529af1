//! Per-agent circuit breaker.
//!
//! Three states: Closed (calls pass), Open (calls fail fast) and HalfOpen
//! (trial calls decide whether to close again). Every transition is logged
//! and published as a [`BreakerEvent`] on the registry's broadcast channel.

use chrono::{DateTime, Utc};
use concord_core::{ConcordError, ConcordResult};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Thresholds of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that trip a closed breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it again.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// How long the breaker stays open before allowing a trial call.
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_open_timeout_ms() -> u64 {
    60_000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            open_timeout_ms: default_open_timeout_ms(),
        }
    }
}

/// Breaker state, serialised as `CLOSED`, `OPEN` or `HALF_OPEN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow; failures are counted.
    Closed,
    /// Calls are rejected until the cool-down ends.
    Open,
    /// Trial calls decide between closing and reopening.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStats {
    /// Current state.
    pub state: CircuitState,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Successes since the last failure.
    pub consecutive_successes: u32,
    /// Calls that were let through.
    pub total_calls: u64,
    /// Successful calls since creation or reset.
    pub total_successes: u64,
    /// Failed calls since creation or reset.
    pub total_failures: u64,
    /// Calls rejected while open.
    pub total_rejections: u64,
    /// Time of the most recent failure.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Creation time until the first transition.
    pub last_state_change_at: DateTime<Utc>,
}

/// A state transition of one agent's breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerEvent {
    /// Agent owning the breaker.
    pub agent: String,
    /// State before the transition.
    pub from: CircuitState,
    /// State after the transition.
    pub to: CircuitState,
    /// When it happened.
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    total_rejections: u64,
    /// Monotonic instant of the last failure (or forced open); drives the cool-down.
    opened_at: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    last_state_change_at: DateTime<Utc>,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_calls: 0,
            total_successes: 0,
            total_failures: 0,
            total_rejections: 0,
            opened_at: None,
            last_failure_at: None,
            last_state_change_at: Utc::now(),
        }
    }

    /// Change state, returning the transition if the state actually changed.
    fn transition(&mut self, to: CircuitState) -> Option<(CircuitState, CircuitState)> {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        self.last_state_change_at = Utc::now();
        if to != CircuitState::HalfOpen {
            self.consecutive_successes = 0;
        }
        Some((from, to))
    }

    fn remaining_cooldown(&self, open_timeout: Duration) -> Duration {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(at)) => open_timeout.saturating_sub(at.elapsed()),
            (CircuitState::Open, None) => open_timeout,
            _ => Duration::ZERO,
        }
    }
}

/// Failure-isolation state machine guarding calls to one agent.
///
/// State is behind a mutex so concurrent tasks on the same agent update the
/// counters one at a time. The lock is never held across an `.await`.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
    events: Option<broadcast::Sender<BreakerEvent>>,
}

impl CircuitBreaker {
    /// A closed breaker for the agent called `name`.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
            events: None,
        }
    }

    fn with_events(mut self, events: broadcast::Sender<BreakerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Agent ID this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Thresholds and cool-down.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.config.open_timeout_ms)
    }

    /// Ask whether a call may proceed.
    ///
    /// An open breaker whose cool-down has elapsed moves to half-open and
    /// lets the call through; otherwise the call is rejected with
    /// [`ConcordError::CircuitOpen`].
    pub fn try_acquire(&self) -> ConcordResult<()> {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Open {
            let remaining = inner.remaining_cooldown(self.open_timeout());
            if !remaining.is_zero() {
                inner.total_rejections += 1;
                return Err(ConcordError::CircuitOpen {
                    agent: self.name.clone(),
                    retry_after_ms: remaining.as_millis().max(1) as u64,
                });
            }
            let change = inner.transition(CircuitState::HalfOpen);
            inner.total_calls += 1;
            drop(inner);
            self.publish(change);
            return Ok(());
        }
        inner.total_calls += 1;
        Ok(())
    }

    /// Count a successful call. Closes a half-open breaker after `success_threshold` in a row.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.total_successes += 1;
        inner.consecutive_failures = 0;
        let mut change = None;
        if inner.state == CircuitState::HalfOpen {
            inner.consecutive_successes += 1;
            if inner.consecutive_successes >= self.config.success_threshold {
                change = inner.transition(CircuitState::Closed);
            }
        }
        drop(inner);
        self.publish(change);
    }

    /// Count a failed call. Opens the breaker at `failure_threshold` in a row, or at once when half-open.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.total_failures += 1;
        inner.consecutive_failures += 1;
        inner.consecutive_successes = 0;
        inner.last_failure_at = Some(Utc::now());

        let trip = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        let mut change = None;
        if trip || inner.state == CircuitState::Open {
            inner.opened_at = Some(Instant::now());
        }
        if trip {
            change = inner.transition(CircuitState::Open);
        }
        drop(inner);
        self.publish(change);
    }

    /// Run `call` under the breaker: reject fast when open, otherwise await
    /// the call and record its outcome.
    pub async fn execute<F, Fut, T>(&self, call: F) -> ConcordResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConcordResult<T>>,
    {
        self.try_acquire()?;
        let result = call().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }

    /// Current state. Does not advance an elapsed cool-down; only
    /// [`try_acquire`](Self::try_acquire) moves open to half-open.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of counters and state. Never transitions the breaker.
    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock();
        BreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            total_calls: inner.total_calls,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
            last_failure_at: inner.last_failure_at,
            last_state_change_at: inner.last_state_change_at,
        }
    }

    /// Remaining cool-down; zero unless open.
    pub fn retry_after(&self) -> Duration {
        self.inner.lock().remaining_cooldown(self.open_timeout())
    }

    /// Administrative override: back to closed with counters zeroed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.opened_at = None;
        let change = inner.transition(CircuitState::Closed);
        drop(inner);
        self.publish(change);
    }

    /// Administrative trip: open now and restart the cool-down.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.opened_at = Some(Instant::now());
        let change = inner.transition(CircuitState::Open);
        drop(inner);
        self.publish(change);
    }

    fn publish(&self, change: Option<(CircuitState, CircuitState)>) {
        let Some((from, to)) = change else {
            return;
        };
        match to {
            CircuitState::Open => warn!(
                agent = %self.name,
                from = %from,
                to = %to,
                cooldown_ms = self.config.open_timeout_ms,
                "Circuit breaker opened"
            ),
            _ => info!(agent = %self.name, from = %from, to = %to, "Circuit breaker transition"),
        }
        if let Some(events) = &self.events {
            // No subscribers is fine.
            let _ = events.send(BreakerEvent {
                agent: self.name.clone(),
                from,
                to,
                at: Utc::now(),
            });
        }
    }
}

/// Breakers keyed by agent ID, created on first use with a shared config.
///
/// Pass one registry into an orchestrator; tests create their own to stay
/// isolated.
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    events: broadcast::Sender<BreakerEvent>,
}

impl CircuitBreakerRegistry {
    /// Empty registry; every breaker it creates uses `config`.
    pub fn new(config: BreakerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Settings applied to new breakers.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// The agent's breaker, created closed on first use.
    pub fn get_or_create(&self, agent: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(agent) {
            return Arc::clone(breaker);
        }
        let mut breakers = self.breakers.write();
        Arc::clone(breakers.entry(agent.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(agent, self.config).with_events(self.events.clone()))
        }))
    }

    /// Existing breaker of `agent`, without creating one.
    pub fn get(&self, agent: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(agent).cloned()
    }

    /// Stats of every known breaker, sorted by agent ID. Read-only.
    pub fn status(&self) -> BTreeMap<String, BreakerStats> {
        self.breakers
            .read()
            .iter()
            .map(|(agent, breaker)| (agent.clone(), breaker.stats()))
            .collect()
    }

    /// Force every breaker back to closed with cleared counters.
    pub fn reset_all(&self) {
        for breaker in self.breakers.read().values() {
            breaker.reset();
        }
    }

    /// Receive every future state transition of every breaker.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.events.subscribe()
    }

    /// Number of breakers created.
    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    /// Whether no breaker has been created yet.
    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(failures: u32, successes: u32, open_ms: u64) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: failures,
            success_threshold: successes,
            open_timeout_ms: open_ms,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> ConcordResult<()> {
        breaker
            .execute(|| async { Err::<(), _>(ConcordError::Agent("down".into())) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> ConcordResult<u32> {
        breaker.execute(|| async { Ok(7) }).await
    }

    #[tokio::test]
    async fn test_trips_after_threshold() {
        let breaker = CircuitBreaker::new("a", config(3, 2, 60_000));
        for _ in 0..2 {
            assert!(fail(&breaker).await.is_err());
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        assert!(fail(&breaker).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.retry_after() > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_open_rejects_without_calling() {
        let breaker = CircuitBreaker::new("a", config(1, 1, 60_000));
        let _ = fail(&breaker).await;

        let calls = AtomicU32::new(0);
        let err = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        match err {
            ConcordError::CircuitOpen {
                agent,
                retry_after_ms,
            } => {
                assert_eq!(agent, "a");
                assert!(retry_after_ms > 0 && retry_after_ms <= 60_000);
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
        assert_eq!(breaker.stats().total_rejections, 1);
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let breaker = CircuitBreaker::new("a", config(3, 1, 60_000));
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        succeed(&breaker).await.unwrap();
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_half_open_closes_after_success_threshold() {
        let breaker = CircuitBreaker::new("a", config(1, 2, 20));
        let _ = fail(&breaker).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        // Reading state does not advance the cool-down.
        assert_eq!(breaker.state(), CircuitState::Open);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("a", config(5, 2, 20));
        breaker.force_open();
        tokio::time::sleep(Duration::from_millis(40)).await;

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        // The cool-down restarted, so the next call is rejected again.
        assert!(matches!(
            succeed(&breaker).await,
            Err(ConcordError::CircuitOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_reset_zeroes_counters() {
        let breaker = CircuitBreaker::new("a", config(1, 1, 60_000));
        let _ = fail(&breaker).await;
        breaker.reset();

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(breaker.retry_after(), Duration::ZERO);
        assert_eq!(succeed(&breaker).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_stats_do_not_mutate() {
        let breaker = CircuitBreaker::new("a", config(1, 1, 10));
        let _ = fail(&breaker).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let first = breaker.stats();
        let second = breaker.stats();
        assert_eq!(first, second);
        assert_eq!(first.state, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_registry_shares_breakers_and_publishes_events() {
        let registry = CircuitBreakerRegistry::new(config(1, 1, 60_000));
        let mut events = registry.subscribe();

        let a1 = registry.get_or_create("a");
        let a2 = registry.get_or_create("a");
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(registry.get("b").is_none());

        let _ = fail(&a1).await;
        let event = events.recv().await.unwrap();
        assert_eq!(event.agent, "a");
        assert_eq!(event.from, CircuitState::Closed);
        assert_eq!(event.to, CircuitState::Open);

        let status = registry.status();
        assert_eq!(status["a"].state, CircuitState::Open);

        registry.reset_all();
        assert_eq!(a2.state(), CircuitState::Closed);
        assert_eq!(events.recv().await.unwrap().to, CircuitState::Closed);
    }

    #[test]
    fn test_state_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"HALF_OPEN\""
        );
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
    }
}
