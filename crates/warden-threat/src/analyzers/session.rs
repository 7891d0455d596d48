//! Session analyzer.
//!
//! The first request of a session binds it to an origin and user agent.
//! Later requests that arrive from elsewhere, with a different client, or
//! after a long silence are flagged. The binding itself never moves, so a
//! hijacked session keeps tripping the mismatch signals.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;

use warden_contracts::{
    config::SessionConfig,
    error::WardenResult,
    threat::{AnalyzerOutcome, RequestContext, Severity, ThreatRequest, ThreatSignal},
};
use warden_core::traits::SignalAnalyzer;

pub const SESSION_ORIGIN_MISMATCH: &str = "session_origin_mismatch";
pub const SESSION_USER_AGENT_MISMATCH: &str = "session_user_agent_mismatch";
pub const STALE_SESSION: &str = "stale_session";

#[derive(Debug, Clone)]
struct SessionRecord {
    origin: String,
    user_agent: Option<String>,
    last_seen: DateTime<Utc>,
}

pub struct SessionAnalyzer {
    config: SessionConfig,
    sessions: DashMap<String, SessionRecord>,
}

impl SessionAnalyzer {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    fn staleness(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.config.staleness_secs.min(u64::from(u32::MAX)) as i64)
    }

    /// Drop a session binding, e.g. on logout.
    pub fn end_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Drop sessions idle for longer than twice the staleness threshold.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let idle = self.staleness() * 2;
        let before = self.sessions.len();
        self.sessions.retain(|_, s| now - s.last_seen <= idle);
        before.saturating_sub(self.sessions.len())
    }

    pub fn tracked_sessions(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl SignalAnalyzer for SessionAnalyzer {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn analyze(
        &self,
        request: &ThreatRequest,
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> WardenResult<AnalyzerOutcome> {
        let mut outcome = AnalyzerOutcome::none();
        let Some(session_id) = context.session_id.as_deref() else {
            return Ok(outcome);
        };

        let mut record = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord {
                origin: request.origin.clone(),
                user_agent: request.user_agent.clone(),
                last_seen: now,
            });

        if record.origin != request.origin {
            outcome.push(
                ThreatSignal::new(
                    SESSION_ORIGIN_MISMATCH,
                    Severity::High,
                    self.config.origin_mismatch_contribution,
                )
                .with_detail("expected", record.origin.as_str())
                .with_detail("actual", request.origin.as_str()),
            );
        }

        if let (Some(bound), Some(current)) = (&record.user_agent, &request.user_agent) {
            if bound != current {
                outcome.push(ThreatSignal::new(
                    SESSION_USER_AGENT_MISMATCH,
                    Severity::Medium,
                    self.config.user_agent_mismatch_contribution,
                ));
            }
        }

        let idle = now - record.last_seen;
        if idle > self.staleness() {
            outcome.push(
                ThreatSignal::new(STALE_SESSION, Severity::Low, self.config.stale_contribution)
                    .with_detail("idle_secs", idle.num_seconds()),
            );
        }

        record.last_seen = now;
        Ok(outcome)
    }
}
