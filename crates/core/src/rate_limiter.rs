//! Sliding-window rate limiter, one timestamp deque per session id.
//!
//! Grounded on the workspace's `dashmap`/`parking_lot` idiom (same
//! sharded-mutex-per-key shape as `sparse_search.rs`'s `RwLock<Option<..>>`
//! writer guard), generalized into a standalone component per spec §4.3
//! rather than inline rate-limiting logic at the HTTP boundary.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Ok,
    Denied { retry_after_ms: u64 },
}

pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn admit(&self, session_id: &str) -> Admission {
        let entry = self
            .windows
            .entry(session_id.to_string())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut deque = entry.lock();
        let now = Instant::now();
        while let Some(&front) = deque.front() {
            if now.duration_since(front) > self.config.window {
                deque.pop_front();
            } else {
                break;
            }
        }
        if deque.len() >= self.config.max_requests {
            let oldest = *deque.front().unwrap();
            let retry_after = self.config.window.saturating_sub(now.duration_since(oldest));
            return Admission::Denied {
                retry_after_ms: retry_after.as_millis() as u64,
            };
        }
        deque.push_back(now);
        Admission::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_max_then_denies() {
        let rl = RateLimiter::new(RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(60),
        });
        assert_eq!(rl.admit("s1"), Admission::Ok);
        assert_eq!(rl.admit("s1"), Admission::Ok);
        assert!(matches!(rl.admit("s1"), Admission::Denied { .. }));
    }

    #[test]
    fn sessions_are_independent() {
        let rl = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        assert_eq!(rl.admit("a"), Admission::Ok);
        assert_eq!(rl.admit("b"), Admission::Ok);
    }

    #[test]
    fn thirty_first_request_in_window_is_denied() {
        let rl = RateLimiter::new(RateLimitConfig::default());
        for _ in 0..30 {
            assert_eq!(rl.admit("s"), Admission::Ok);
        }
        assert!(matches!(rl.admit("s"), Admission::Denied { .. }));
    }
}
