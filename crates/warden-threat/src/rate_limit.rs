//! Exact sliding-window rate limiter.
//!
//! Each key keeps the timestamps of its requests inside the window. A check
//! prunes timestamps that have left the window, records the current request
//! and compares the count against the limit. Rejected requests are recorded
//! too, so a caller hammering the limit stays over it.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use tracing::debug;

use warden_contracts::threat::RateLimitStatus;
use warden_core::clock::Clock;

#[derive(Debug)]
struct Window {
    span: ChronoDuration,
    hits: VecDeque<DateTime<Utc>>,
}

impl Window {
    /// Drop hits older than `now - span`. The window is `[now - span, now]`.
    fn prune(&mut self, now: DateTime<Utc>) {
        let Some(cutoff) = now.checked_sub_signed(self.span) else {
            return;
        };
        while self.hits.front().is_some_and(|t| *t < cutoff) {
            self.hits.pop_front();
        }
    }
}

/// Per-key sliding-window counter, safe to share across request handlers.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
        }
    }

    /// Record one request for `key` and report whether it exceeds
    /// `max_requests` within the trailing `window`.
    ///
    /// The `max_requests`-th request in a window is still allowed; the next
    /// one is `exceeded`.
    pub fn check(&self, key: &str, window: ChronoDuration, max_requests: usize) -> RateLimitStatus {
        let now = self.clock.now();
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Window {
                span: window,
                hits: VecDeque::new(),
            });

        entry.span = window;
        entry.prune(now);
        entry.hits.push_back(now);

        let count = entry.hits.len();
        let oldest = entry.hits.front().copied().unwrap_or(now);
        let reset_at = oldest
            .checked_add_signed(window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        RateLimitStatus {
            exceeded: count > max_requests,
            count,
            reset_at,
        }
    }

    /// Current count for `key` without recording a request.
    pub fn peek(&self, key: &str) -> usize {
        let now = self.clock.now();
        self.windows.get_mut(key).map_or(0, |mut w| {
            w.prune(now);
            w.hits.len()
        })
    }

    /// Forget `key` entirely.
    pub fn reset(&self, key: &str) {
        self.windows.remove(key);
    }

    /// Drop keys with no hits left in their window. Returns how many were
    /// removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, w| {
            w.prune(now);
            !w.hits.is_empty()
        });
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, remaining = self.windows.len(), "rate limiter sweep");
        }
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
