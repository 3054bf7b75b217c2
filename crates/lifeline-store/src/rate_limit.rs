//! Per-user fixed-window rate limiter.
//!
//! One map from user to `{count, reset_at}` behind a single mutex, so the
//! read-reset-increment sequence for one user is atomic under concurrent
//! submissions. Expired windows are swept from inside `admit` at most once
//! per window length, so the map tracks only recently active users.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use lifeline_contracts::identity::UserId;
use lifeline_core::traits::RateLimiter;

/// Length of one admission window.
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug)]
struct Counters {
    windows: HashMap<UserId, Window>,
    next_sweep: Option<Instant>,
}

impl Counters {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| now < w.reset_at);
        before - self.windows.len()
    }
}

/// Admits at most `limit` submissions per user per window.
pub struct FixedWindowRateLimiter {
    limit: u32,
    window: Duration,
    counters: Mutex<Counters>,
}

impl FixedWindowRateLimiter {
    /// `limit` submissions per user per 60 seconds.
    pub fn per_minute(limit: u32) -> Self {
        Self::with_window(limit, WINDOW)
    }

    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            counters: Mutex::new(Counters {
                windows: HashMap::new(),
                next_sweep: None,
            }),
        }
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        // A poisoned counter map is still a valid counter map.
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `admit` against an explicit clock.
    pub fn admit_at(&self, user_id: &UserId, now: Instant) -> bool {
        let mut counters = self.counters();
        if counters.next_sweep.map_or(true, |at| now >= at) {
            let removed = counters.sweep(now);
            counters.next_sweep = Some(now + self.window);
            if removed > 0 {
                debug!(removed, "expired rate-limit windows swept");
            }
        }

        let window = counters.windows.entry(user_id.clone()).or_insert(Window {
            count: 0,
            reset_at: now + self.window,
        });

        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + self.window;
        }

        if window.count >= self.limit {
            debug!(user_id = %user_id, limit = self.limit, "submission over limit");
            return false;
        }
        window.count += 1;
        true
    }

    /// Users with a live or not yet swept window.
    pub fn tracked_users(&self) -> usize {
        self.counters().windows.len()
    }

    /// Submissions the user may still make in the current window.
    pub fn remaining_at(&self, user_id: &UserId, now: Instant) -> u32 {
        match self.counters().windows.get(user_id) {
            Some(w) if now < w.reset_at => self.limit.saturating_sub(w.count),
            _ => self.limit,
        }
    }

    pub fn retry_after_at(&self, user_id: &UserId, now: Instant) -> Duration {
        match self.counters().windows.get(user_id) {
            Some(w) if w.count >= self.limit => w.reset_at.saturating_duration_since(now),
            _ => Duration::ZERO,
        }
    }

    /// Drop expired windows. Returns how many were removed.
    pub fn prune_at(&self, now: Instant) -> usize {
        self.counters().sweep(now)
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn admit(&self, user_id: &UserId) -> bool {
        self.admit_at(user_id, Instant::now())
    }

    fn retry_after(&self, user_id: &UserId) -> Duration {
        self.retry_after_at(user_id, Instant::now())
    }
}
