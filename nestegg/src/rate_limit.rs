//! Per-user, per-endpoint sliding-window rate limiting.
//!
//! Each `(user, endpoint)` pair keeps the timestamps of its admitted calls.
//! A call is rejected once the number of timestamps still inside the window
//! reaches the endpoint's limit. Rejected calls are not recorded, so a caller
//! is admitted again as soon as its oldest call leaves the window.
//!
//! Stale timestamps are pruned on every check, and every
//! [`SWEEP_INTERVAL`] checks the whole map is swept so that keys with no
//! recent calls are evicted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

const SWEEP_INTERVAL: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Contribute,
    Withdraw,
    Reset,
    CreateNote,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::Contribute => "contribute",
            Endpoint::Withdraw => "withdraw",
            Endpoint::Reset => "reset",
            Endpoint::CreateNote => "create_note",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub const fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

/// Limits applied to each rate-limited endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub contribute: RateLimitRule,
    pub withdraw: RateLimitRule,
    pub reset: RateLimitRule,
    pub create_note: RateLimitRule,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            contribute: RateLimitRule::per_minute(5),
            withdraw: RateLimitRule::per_minute(5),
            reset: RateLimitRule::per_minute(2),
            create_note: RateLimitRule::per_minute(10),
        }
    }
}

impl RateLimitSettings {
    pub fn rule(&self, endpoint: Endpoint) -> RateLimitRule {
        match endpoint {
            Endpoint::Contribute => self.contribute,
            Endpoint::Withdraw => self.withdraw,
            Endpoint::Reset => self.reset,
            Endpoint::CreateNote => self.create_note,
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("rate limit exceeded for {endpoint}: {max_requests} calls per {window:?}")]
pub struct RateLimited {
    pub endpoint: Endpoint,
    pub max_requests: u32,
    pub window: Duration,
    pub retry_after: Duration,
}

#[derive(Debug)]
pub struct RateLimiter {
    settings: RateLimitSettings,
    calls: DashMap<(String, Endpoint), Vec<Instant>>,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            calls: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    /// Records a call by `user` to `endpoint`, or rejects it if the user is
    /// over the endpoint's limit.
    pub fn check(&self, user: &str, endpoint: Endpoint) -> Result<(), RateLimited> {
        self.check_at(user, endpoint, Instant::now())
    }

    fn check_at(&self, user: &str, endpoint: Endpoint, now: Instant) -> Result<(), RateLimited> {
        let checks = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if checks % SWEEP_INTERVAL == 0 {
            self.sweep(now);
        }

        let rule = self.settings.rule(endpoint);
        let mut entry = self
            .calls
            .entry((user.to_string(), endpoint))
            .or_default();
        let timestamps = entry.value_mut();
        timestamps.retain(|&at| now.saturating_duration_since(at) < rule.window);

        if timestamps.len() >= rule.max_requests as usize {
            let oldest = timestamps.first().copied().unwrap_or(now);
            let retry_after = rule
                .window
                .saturating_sub(now.saturating_duration_since(oldest));
            return Err(RateLimited {
                endpoint,
                max_requests: rule.max_requests,
                window: rule.window,
                retry_after,
            });
        }

        timestamps.push(now);
        Ok(())
    }

    /// Drops expired timestamps everywhere and evicts keys left empty.
    fn sweep(&self, now: Instant) {
        let before = self.calls.len();
        self.calls.retain(|(_, endpoint), timestamps| {
            let window = self.settings.rule(*endpoint).window;
            timestamps.retain(|&at| now.saturating_duration_since(at) < window);
            !timestamps.is_empty()
        });
        debug!(
            before,
            after = self.calls.len(),
            "rate limiter sweep complete"
        );
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.calls.len()
    }
}
