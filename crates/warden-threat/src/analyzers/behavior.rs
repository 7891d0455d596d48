//! Behavioral analyzer.
//!
//! Counts each actor's requests per activity type over a trailing window and
//! compares the count to a per-type limit. The contribution grows with the
//! excess and is capped.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;

use warden_contracts::{
    config::BehaviorConfig,
    error::WardenResult,
    threat::{AnalyzerOutcome, RequestContext, Severity, ThreatRequest, ThreatSignal},
};
use warden_core::traits::SignalAnalyzer;

pub const BEHAVIORAL_ANOMALY: &str = "behavioral_anomaly";

/// The activity a request represents, derived from its method and path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activity {
    Login,
    DataExport,
    PhiAccess,
    Write,
    Read,
}

impl Activity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::Login => "login",
            Activity::DataExport => "data_export",
            Activity::PhiAccess => "phi_access",
            Activity::Write => "write",
            Activity::Read => "read",
        }
    }

    pub fn classify(request: &ThreatRequest) -> Self {
        let path = request.path.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| path.contains(n));

        if has(&["login", "signin", "/auth"]) {
            Activity::Login
        } else if has(&["export", "download", "bulk"]) {
            Activity::DataExport
        } else if has(&["patient", "chart", "phi", "medical-record"]) {
            Activity::PhiAccess
        } else if matches!(
            request.method.to_ascii_uppercase().as_str(),
            "POST" | "PUT" | "PATCH" | "DELETE"
        ) {
            Activity::Write
        } else {
            Activity::Read
        }
    }
}

pub struct BehaviorAnalyzer {
    config: BehaviorConfig,
    history: DashMap<(String, Activity), VecDeque<DateTime<Utc>>>,
}

impl BehaviorAnalyzer {
    pub fn new(config: BehaviorConfig) -> Self {
        Self {
            config,
            history: DashMap::new(),
        }
    }

    fn window(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.config.window_secs.min(u64::from(u32::MAX)) as i64)
    }

    fn contribution_for(&self, excess: usize) -> u32 {
        let excess = u32::try_from(excess).unwrap_or(u32::MAX);
        excess
            .saturating_mul(self.config.per_excess_contribution)
            .min(self.config.max_contribution)
    }

    /// Drop history that has left the window. Returns the number of
    /// actor/activity pairs removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window();
        let before = self.history.len();
        self.history.retain(|_, hits| {
            while hits.front().is_some_and(|t| *t <= cutoff) {
                hits.pop_front();
            }
            !hits.is_empty()
        });
        before.saturating_sub(self.history.len())
    }
}

#[async_trait]
impl SignalAnalyzer for BehaviorAnalyzer {
    fn name(&self) -> &'static str {
        "behavior"
    }

    async fn analyze(
        &self,
        request: &ThreatRequest,
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> WardenResult<AnalyzerOutcome> {
        let mut outcome = AnalyzerOutcome::none();
        let Some(actor) = context.actor_id.as_deref() else {
            return Ok(outcome);
        };

        let activity = Activity::classify(request);
        let cutoff = now - self.window();
        let count = {
            let mut hits = self.history.entry((actor.to_string(), activity)).or_default();
            while hits.front().is_some_and(|t| *t <= cutoff) {
                hits.pop_front();
            }
            hits.push_back(now);
            hits.len()
        };

        let Some(&limit) = self.config.activity_limits.get(activity.as_str()) else {
            return Ok(outcome);
        };
        if count > limit {
            let contribution = self.contribution_for(count - limit);
            let severity = if contribution >= self.config.max_contribution {
                Severity::High
            } else {
                Severity::Medium
            };
            outcome.push(
                ThreatSignal::new(BEHAVIORAL_ANOMALY, severity, contribution)
                    .with_detail("activity", activity.as_str())
                    .with_detail("count", count as u64)
                    .with_detail("limit", limit as u64),
            );
        }
        Ok(outcome)
    }
}
