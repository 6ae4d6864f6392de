//! A three-state circuit breaker.
//!
//! ```text
//! Closed ──(threshold failures within window)──▶ Open
//! Open ──(recovery elapsed, next check)──▶ HalfOpen
//! HalfOpen ──success──▶ Closed      HalfOpen ──failure──▶ Open (fresh opened_at)
//! ```
//!
//! Time comes from `tokio::time::Instant`, so tests drive it with a paused clock.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerPolicy {
    /// Failures that trip a closed breaker.
    pub failure_threshold: u32,
    /// A failure further than this from the previous one restarts the count.
    pub failure_window: Duration,
    /// How long an open breaker rejects calls.
    pub recovery_timeout: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_window: Duration::from_secs(60),
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Point-in-time view of the breaker. Instants are reported as time elapsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    pub since_last_failure: Option<Duration>,
    pub since_opened: Option<Duration>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    policy: BreakerPolicy,
    inner: Mutex<Inner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerPolicy::default())
    }
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                last_failure_at: None,
                opened_at: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a call may proceed. An open breaker past its recovery timeout
    /// moves to half-open here and lets the call through.
    pub fn is_allowed(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let recovered = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.policy.recovery_timeout);
                if recovered {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!("circuit breaker half-open, probing");
                }
                recovered
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.failures = 0;
            inner.last_failure_at = None;
            inner.opened_at = None;
            tracing::info!("circuit breaker closed");
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        let now = Instant::now();

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            inner.last_failure_at = Some(now);
            tracing::warn!("circuit breaker trial call failed, reopened");
            return;
        }

        if inner
            .last_failure_at
            .is_some_and(|at| now.duration_since(at) > self.policy.failure_window)
        {
            inner.failures = 0;
        }
        inner.failures += 1;
        inner.last_failure_at = Some(now);

        if inner.state == CircuitState::Closed && inner.failures >= self.policy.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            tracing::warn!(
                failures = inner.failures,
                recovery_secs = self.policy.recovery_timeout.as_secs(),
                "circuit breaker opened"
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            failures: inner.failures,
            since_last_failure: inner.last_failure_at.map(|at| at.elapsed()),
            since_opened: inner.opened_at.map(|at| at.elapsed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(b: &CircuitBreaker) {
        for _ in 0..3 {
            b.record_failure();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn three_failures_open_the_breaker() {
        let b = CircuitBreaker::default();
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.is_allowed());

        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_outside_window_restart_the_count() {
        let b = CircuitBreaker::default();
        b.record_failure();
        b.record_failure();
        tokio::time::advance(Duration::from_secs(61)).await;
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.snapshot().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_moves_to_half_open_then_closed() {
        let b = CircuitBreaker::default();
        trip(&b);
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!b.is_allowed());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(b.is_allowed());
        assert_eq!(b.state(), CircuitState::HalfOpen);

        b.record_success();
        let snap = b.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failures, 0);
        assert_eq!(snap.since_opened, None);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens_with_fresh_timer() {
        let b = CircuitBreaker::default();
        trip(&b);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(b.is_allowed());

        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.snapshot().since_opened, Some(Duration::ZERO));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(!b.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn success_while_closed_keeps_failure_count() {
        let b = CircuitBreaker::default();
        b.record_failure();
        b.record_success();
        assert_eq!(b.snapshot().failures, 1);
    }

    #[test]
    fn state_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(CircuitState::HalfOpen).unwrap(),
            "half-open"
        );
    }
}
