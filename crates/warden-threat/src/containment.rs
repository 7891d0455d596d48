//! Origin containment state.
//!
//! - blocked origins, each with a TTL, removed lazily on lookup and by
//!   `purge_expired`
//! - suspicious origins: the recent monitor-level scores of each origin,
//!   reviewed periodically for escalation to a block
//! - block history: how often each origin has been blocked, fed back into
//!   scoring as the repeat-offender signal

use std::collections::VecDeque;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use warden_contracts::{config::ContainmentConfig, threat::BlockedOrigin};

/// An origin the reviewer wants blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    pub origin: String,
    pub events: usize,
    pub average_score: u32,
}

pub struct Containment {
    config: ContainmentConfig,
    blocked: DashMap<String, BlockedOrigin>,
    suspicious: DashMap<String, VecDeque<(DateTime<Utc>, u32)>>,
    history: DashMap<String, u32>,
}

impl Containment {
    pub fn new(config: ContainmentConfig) -> Self {
        Self {
            config,
            blocked: DashMap::new(),
            suspicious: DashMap::new(),
            history: DashMap::new(),
        }
    }

    fn block_ttl(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.config.block_ttl_secs.min(u64::from(u32::MAX)) as i64)
    }

    fn escalation_window(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.config.escalation_window_secs.min(u64::from(u32::MAX)) as i64)
    }

    /// The active block for `origin`, if any. An expired block is removed.
    pub fn is_blocked(&self, origin: &str, now: DateTime<Utc>) -> Option<BlockedOrigin> {
        let expired = self.blocked.remove_if(origin, |_, b| b.is_expired(now));
        if let Some((_, block)) = expired {
            info!(origin = %block.origin, blocked_at = %block.blocked_at, "origin block expired");
            return None;
        }
        self.blocked.get(origin).map(|b| b.value().clone())
    }

    /// Block `origin` for the configured TTL, replacing any existing block,
    /// and count it in the origin's history.
    pub fn block(&self, origin: &str, reason: impl Into<String>, now: DateTime<Utc>) -> BlockedOrigin {
        let block = BlockedOrigin {
            origin: origin.to_string(),
            blocked_at: now,
            expires_at: now + self.block_ttl(),
            reason: reason.into(),
        };
        self.blocked.insert(origin.to_string(), block.clone());
        *self.history.entry(origin.to_string()).or_insert(0) += 1;
        self.suspicious.remove(origin);
        block
    }

    /// Lift a block early. Returns whether one existed.
    pub fn unblock(&self, origin: &str) -> bool {
        self.blocked.remove(origin).is_some()
    }

    /// Active blocks, oldest first.
    pub fn blocked_origins(&self, now: DateTime<Utc>) -> Vec<BlockedOrigin> {
        let mut active: Vec<BlockedOrigin> = self
            .blocked
            .iter()
            .filter(|b| !b.is_expired(now))
            .map(|b| b.value().clone())
            .collect();
        active.sort_by(|a, b| a.blocked_at.cmp(&b.blocked_at).then_with(|| a.origin.cmp(&b.origin)));
        active
    }

    /// Remove every expired block. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.blocked.len();
        self.blocked.retain(|_, b| !b.is_expired(now));
        before.saturating_sub(self.blocked.len())
    }

    /// Number of times `origin` has been blocked.
    pub fn prior_blocks(&self, origin: &str) -> u32 {
        self.history.get(origin).map_or(0, |n| *n)
    }

    /// Remember one monitor-level verdict for `origin`.
    pub fn record_suspicious(&self, origin: &str, risk_score: u32, now: DateTime<Utc>) {
        let mut events = self.suspicious.entry(origin.to_string()).or_default();
        events.push_back((now, risk_score));
        debug!(origin, risk_score, events = events.len(), "origin marked suspicious");
    }

    pub fn suspicious_events(&self, origin: &str) -> usize {
        self.suspicious.get(origin).map_or(0, |e| e.len())
    }

    /// Find suspicious origins that should be blocked: at least
    /// `escalation_min_events` monitor verdicts inside the escalation window
    /// with an average score above `escalation_avg_score`.
    ///
    /// Escalated origins leave the suspicious set; origins with nothing left
    /// in the window are forgotten. Blocking is the caller's job.
    pub fn review(&self, now: DateTime<Utc>) -> Vec<Escalation> {
        let cutoff = now - self.escalation_window();
        let mut escalations = Vec::new();

        self.suspicious.retain(|origin, events| {
            while events.front().is_some_and(|(t, _)| *t <= cutoff) {
                events.pop_front();
            }
            if events.is_empty() {
                return false;
            }

            let count = events.len();
            let total: u64 = events.iter().map(|(_, s)| u64::from(*s)).sum();
            let average = u32::try_from(total / count as u64).unwrap_or(u32::MAX);
            if count >= self.config.escalation_min_events && average > self.config.escalation_avg_score {
                escalations.push(Escalation {
                    origin: origin.clone(),
                    events: count,
                    average_score: average,
                });
                return false;
            }
            true
        });

        escalations.sort_by(|a, b| a.origin.cmp(&b.origin));
        escalations
    }
}
