//! Per-dependency circuit breaker.
//!
//! Grounded on `llm/src/backend.rs::OllamaBackend`'s retry loop, which
//! classifies a failed call as retryable (`Network`/`Timeout`, i.e. I/O
//! failure or a 5xx response) or terminal (anything else, e.g. 4xx) before
//! deciding whether to try again. That caller-side classification is exactly
//! what `Outcome` below captures, pulled out of the retry loop into its own
//! reusable state machine so every remote dependency (embedder, generator)
//! shares one implementation instead of re-deriving the logic per backend.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Set while a half-open probe is in flight, so concurrent callers
    /// don't all treat themselves as "the" probe (§4.2: half-open allows
    /// exactly one probe). Cleared when the probe's outcome is recorded.
    probing: bool,
}

/// Thread-safe, single-lock, O(1)-critical-section breaker per spec §4.2.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerOpen;

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probing: false,
            }),
        }
    }

    /// Returns `Err(BreakerOpen)` in O(1) without attempting the call if the
    /// breaker is open and the cooldown hasn't elapsed; otherwise runs `op`
    /// and records its outcome.
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T, BreakerOpen>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = (T, Outcome)>,
    {
        if !self.admit() {
            return Err(BreakerOpen);
        }
        let (value, outcome) = op().await;
        self.record(outcome);
        Ok(value)
    }

    /// Returns true if a call may proceed, transitioning Open->HalfOpen when
    /// the cooldown has elapsed. Half-open admits exactly one probe at a
    /// time: the first caller to observe `HalfOpen` (or the transition into
    /// it) claims the probe slot and every other concurrent caller is
    /// rejected until `record` resolves it.
    fn admit(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => true,
            State::HalfOpen => {
                if inner.probing {
                    false
                } else {
                    inner.probing = true;
                    true
                }
            },
            State::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.cooldown {
                    inner.state = State::HalfOpen;
                    inner.probing = true;
                    true
                } else {
                    false
                }
            },
        }
    }

    fn record(&self, outcome: Outcome) {
        let mut inner = self.inner.lock();
        match (inner.state, outcome) {
            (State::Closed, Outcome::Success) => {
                inner.consecutive_failures = 0;
            },
            (State::Closed, Outcome::Failure) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                }
            },
            (State::HalfOpen, Outcome::Success) => {
                inner.state = State::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.probing = false;
            },
            (State::HalfOpen, Outcome::Failure) => {
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
                inner.probing = false;
            },
            (State::Open, _) => {},
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.inner.lock().state, State::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(b: &CircuitBreaker, outcome: Outcome) -> Result<(), BreakerOpen> {
        b.call(|| async move { ((), outcome) }).await
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let b = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
        });
        assert!(run(&b, Outcome::Failure).await.is_ok());
        assert!(run(&b, Outcome::Failure).await.is_ok());
        assert!(!b.is_open());
        assert!(run(&b, Outcome::Failure).await.is_ok());
        assert!(b.is_open());
        assert!(run(&b, Outcome::Success).await.is_err());
    }

    #[tokio::test]
    async fn half_open_success_closes_and_failure_reopens() {
        let b = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_millis(10),
        });
        run(&b, Outcome::Failure).await.unwrap();
        assert!(b.is_open());
        tokio::time::sleep(Duration::from_millis(20)).await;
        run(&b, Outcome::Success).await.unwrap();
        assert!(!b.is_open());

        run(&b, Outcome::Failure).await.unwrap();
        assert!(b.is_open());
        tokio::time::sleep(Duration::from_millis(20)).await;
        run(&b, Outcome::Failure).await.unwrap();
        assert!(b.is_open());
    }

    #[tokio::test]
    async fn half_open_admits_exactly_one_concurrent_probe() {
        let b = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_millis(10),
        });
        run(&b, Outcome::Failure).await.unwrap();
        assert!(b.is_open());
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Three concurrent callers race into half-open; only the first
        // should be admitted as the probe, the rest see BreakerOpen without
        // the probe's outcome having been recorded yet.
        assert!(b.admit());
        assert!(!b.admit());
        assert!(!b.admit());

        b.record(Outcome::Success);
        assert!(!b.is_open());
        assert!(b.admit());
    }

    #[tokio::test]
    async fn a_success_in_closed_state_resets_failure_count() {
        let b = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 2,
            cooldown: Duration::from_secs(30),
        });
        run(&b, Outcome::Failure).await.unwrap();
        run(&b, Outcome::Success).await.unwrap();
        run(&b, Outcome::Failure).await.unwrap();
        assert!(!b.is_open());
    }
}
