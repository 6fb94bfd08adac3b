//! Rate limiting for login attempts.
//!
//! Attempts are counted per caller IP and per account identifier over a
//! fixed wall-clock window. Exhaustion fails closed with the remaining
//! window as a retry-after signal.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

pub trait RateLimiter: Send + Sync {
    /// Count one attempt from the caller address and decide.
    fn check_ip(&self, ip: Option<&str>) -> RateLimitDecision;

    /// Count one attempt against the account identifier and decide.
    fn check_identifier(&self, identifier: &str) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_identifier(&self, _identifier: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

struct Window {
    started: Instant,
    attempts: u32,
}

/// Fixed-window counter keyed by caller identity.
///
/// Windows reset by wall clock on the next check after expiry; stale keys
/// are evicted on write so the map stays bounded without a sweeper task.
pub struct FixedWindowRateLimiter {
    window: Duration,
    max_attempts: u32,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new(window: Duration, max_attempts: u32) -> Self {
        Self {
            window,
            max_attempts,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn check_key(&self, key: String) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        windows.retain(|_, window| now.duration_since(window.started) < self.window);

        let window = windows.entry(key).or_insert(Window {
            started: now,
            attempts: 0,
        });
        window.attempts = window.attempts.saturating_add(1);
        if window.attempts > self.max_attempts {
            let elapsed = now.duration_since(window.started);
            RateLimitDecision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            }
        } else {
            RateLimitDecision::Allowed
        }
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>) -> RateLimitDecision {
        // Callers without a resolvable address share one bucket.
        let key = ip.unwrap_or("unknown");
        self.check_key(format!("ip:{key}"))
    }

    fn check_identifier(&self, identifier: &str) -> RateLimitDecision {
        self.check_key(format!("id:{}", identifier.trim().to_lowercase()))
    }
}
