//! Per-sender sliding-window rate limiting with burst protection.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Why a request was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimited {
    #[error("Too many requests. Please wait a few seconds. ({count}/{limit} in {window_secs}s)")]
    Burst {
        count: usize,
        limit: usize,
        window_secs: u64,
    },
    #[error(
        "Rate limit exceeded. Please wait before sending more messages. ({count}/{limit} in {window_secs}s)"
    )]
    Window {
        count: usize,
        limit: usize,
        window_secs: u64,
    },
}

impl RateLimited {
    #[must_use]
    pub fn limit_type(&self) -> &'static str {
        match self {
            Self::Burst { .. } => "burst",
            Self::Window { .. } => "window",
        }
    }
}

/// Snapshot of one sender's usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStats {
    pub requests_in_window: usize,
    pub requests_in_burst_window: usize,
    pub window_remaining: usize,
    pub burst_remaining: usize,
}

#[derive(Debug, Default)]
struct UserRateState {
    requests: VecDeque<Instant>,
}

impl UserRateState {
    fn prune(&mut self, window: Duration, now: Instant) {
        while let Some(&oldest) = self.requests.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            self.requests.pop_front();
        }
    }

    fn count_within(&self, window: Duration, now: Instant) -> usize {
        self.requests
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < window)
            .count()
    }
}

#[derive(Debug)]
struct LimiterState {
    users: HashMap<String, UserRateState>,
    last_cleanup: Instant,
}

/// Sliding-window limiter keyed by sender identity.
///
/// All state lives behind one mutex; each `check` holds it only for the
/// count-and-append, so a sender's count can never be raced past its limit.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState {
                users: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check and, if allowed, record a request from `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` when the burst or window limit is already reached.
    pub fn check(&self, user_id: &str) -> Result<(), RateLimited> {
        self.check_at(user_id, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` when the burst or window limit is already reached.
    pub fn check_at(&self, user_id: &str, now: Instant) -> Result<(), RateLimited> {
        if !self.config.enabled {
            return Ok(());
        }

        let window = Duration::from_secs(self.config.window_seconds);
        let burst_window = Duration::from_secs(self.config.burst_window_seconds);

        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if now.saturating_duration_since(state.last_cleanup) > CLEANUP_INTERVAL {
            cleanup_all(&mut state, window, now);
        }

        let user = state.users.entry(user_id.to_owned()).or_default();
        user.prune(window, now);

        let burst_count = user.count_within(burst_window, now);
        if burst_count >= self.config.burst_limit {
            tracing::warn!(
                user_id,
                count = burst_count,
                limit = self.config.burst_limit,
                "rate limit (burst) exceeded"
            );
            return Err(RateLimited::Burst {
                count: burst_count,
                limit: self.config.burst_limit,
                window_secs: self.config.burst_window_seconds,
            });
        }

        let window_count = user.count_within(window, now);
        if window_count >= self.config.max_requests {
            tracing::warn!(
                user_id,
                count = window_count,
                limit = self.config.max_requests,
                "rate limit (window) exceeded"
            );
            return Err(RateLimited::Window {
                count: window_count,
                limit: self.config.max_requests,
                window_secs: self.config.window_seconds,
            });
        }

        user.requests.push_back(now);
        Ok(())
    }

    /// Current usage for `user_id`. Does not record a request.
    #[must_use]
    pub fn stats(&self, user_id: &str) -> RateLimitStats {
        let now = Instant::now();
        let state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let (in_window, in_burst) = state.users.get(user_id).map_or((0, 0), |user| {
            (
                user.count_within(Duration::from_secs(self.config.window_seconds), now),
                user.count_within(Duration::from_secs(self.config.burst_window_seconds), now),
            )
        });

        RateLimitStats {
            requests_in_window: in_window,
            requests_in_burst_window: in_burst,
            window_remaining: self.config.max_requests.saturating_sub(in_window),
            burst_remaining: self.config.burst_limit.saturating_sub(in_burst),
        }
    }

    /// Number of senders currently tracked.
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .users
            .len()
    }
}

fn cleanup_all(state: &mut LimiterState, window: Duration, now: Instant) {
    let before = state.users.len();
    state.users.retain(|_, user| {
        user.prune(window, now);
        !user.requests.is_empty()
    });
    state.last_cleanup = now;

    let removed = before - state.users.len();
    if removed > 0 {
        tracing::debug!("rate limiter cleanup: removed {removed} stale entries");
    }
}
