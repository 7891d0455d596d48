//! The threat scoring engine.
//!
//! `ThreatEngine::analyze_request` turns one inbound request into a
//! `ThreatAnalysis`:
//!
//!   blocked? ──yes──▶ critical `blocked_origin` signal, block
//!      │no
//!      ▼
//!   rate limit ─▶ analyzers (concurrent, each under a timeout)
//!      ─▶ repeat-offender signal ─▶ sort ─▶ clamp score ─▶ policy
//!      ─▶ containment ─▶ security_event in the audit ledger
//!
//! A slow or failing analyzer never fails the request: it contributes a
//! zero-weight `degraded_signal` instead.
//!
//! Background tasks (started by `start()`, stopped by `stop()`):
//!
//! - reviewer: every `review_interval_secs`, escalates suspicious origins
//!   and purges expired blocks
//! - sweeper: every `rate_limit.sweep_interval_secs`, drops idle limiter,
//!   session and behavior state

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use warden_audit::AuditLedger;
use warden_contracts::{
    audit::{AuditContext, EventData, Priority},
    config::ThreatConfig,
    error::{WardenError, WardenResult},
    threat::{
        BlockedOrigin, RequestContext, Severity, ThreatAction, ThreatAnalysis, ThreatRequest,
        ThreatSignal,
    },
};
use warden_core::{
    clock::{Clock, SystemClock},
    traits::{ActionPolicy, GeoResolver, SignalAnalyzer},
};
use warden_policy::ThresholdPolicy;

use crate::{
    analyzers::{BehaviorAnalyzer, GeoAnalyzer, PayloadScanner, SessionAnalyzer},
    containment::Containment,
    rate_limit::RateLimiter,
};

pub const BLOCKED_ORIGIN: &str = "blocked_origin";
pub const RATE_LIMIT_EXCEEDED: &str = "rate_limit_exceeded";
pub const REPEAT_OFFENDER: &str = "repeat_offender";

/// Source tag on every audit entry the engine writes.
pub const ENGINE_SOURCE: &str = "threat-engine";

const MAX_RISK_SCORE: u32 = 100;

// ── Builder ───────────────────────────────────────────────────────────────────

/// Assembles a `ThreatEngine`.
///
/// The payload, session and behavior analyzers are always installed. The
/// geolocation analyzer is installed when a resolver is supplied.
pub struct ThreatEngineBuilder {
    config: ThreatConfig,
    clock: Arc<dyn Clock>,
    policy: Option<Arc<dyn ActionPolicy>>,
    geo_resolver: Option<Arc<dyn GeoResolver>>,
    ledger: Option<Arc<AuditLedger>>,
    extra: Vec<Arc<dyn SignalAnalyzer>>,
}

impl ThreatEngineBuilder {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the threshold policy built from `config.thresholds`.
    pub fn with_policy(mut self, policy: Arc<dyn ActionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_geo_resolver(mut self, resolver: Arc<dyn GeoResolver>) -> Self {
        self.geo_resolver = Some(resolver);
        self
    }

    /// Record every verdict in `ledger`.
    pub fn with_ledger(mut self, ledger: Arc<AuditLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Run an additional analyzer alongside the built-in ones.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn SignalAnalyzer>) -> Self {
        self.extra.push(analyzer);
        self
    }

    /// Fails with `ConfigError` when the thresholds are out of order.
    pub fn build(self) -> WardenResult<ThreatEngine> {
        let policy: Arc<dyn ActionPolicy> = match self.policy {
            Some(policy) => policy,
            None => Arc::new(ThresholdPolicy::new(self.config.thresholds)?),
        };

        let sessions = Arc::new(SessionAnalyzer::new(self.config.session.clone()));
        let behavior = Arc::new(BehaviorAnalyzer::new(self.config.behavior.clone()));

        let mut analyzers: Vec<Arc<dyn SignalAnalyzer>> =
            vec![Arc::new(PayloadScanner::new(self.config.payload.clone())?)];
        let geo = self
            .geo_resolver
            .map(|resolver| Arc::new(GeoAnalyzer::new(resolver, self.config.geo.clone())));
        if let Some(geo) = &geo {
            analyzers.push(geo.clone());
        }
        analyzers.push(sessions.clone());
        analyzers.push(behavior.clone());
        analyzers.extend(self.extra);

        let names: Vec<&'static str> = analyzers.iter().map(|a| a.name()).collect();
        debug!(analyzers = ?names, "threat engine assembled");

        let shared = EngineShared {
            limiter: RateLimiter::new(Arc::clone(&self.clock)),
            containment: Containment::new(self.config.containment.clone()),
            config: self.config,
            analyzers,
            geo,
            sessions,
            behavior,
            policy,
            ledger: self.ledger,
            clock: self.clock,
        };

        Ok(ThreatEngine {
            shared: Arc::new(shared),
            tasks: Mutex::new(None),
        })
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

struct EngineShared {
    config: ThreatConfig,
    analyzers: Vec<Arc<dyn SignalAnalyzer>>,
    geo: Option<Arc<GeoAnalyzer>>,
    sessions: Arc<SessionAnalyzer>,
    behavior: Arc<BehaviorAnalyzer>,
    policy: Arc<dyn ActionPolicy>,
    limiter: RateLimiter,
    containment: Containment,
    ledger: Option<Arc<AuditLedger>>,
    clock: Arc<dyn Clock>,
}

struct EngineTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Scores requests, decides an action and contains hostile origins.
///
/// Shared behind an `Arc` by all request handlers; every method takes
/// `&self`.
///
/// ```rust,ignore
/// let engine = ThreatEngine::builder(config.threat)
///     .with_ledger(ledger.clone())
///     .with_geo_resolver(resolver)
///     .build()?;
/// engine.start()?;
///
/// let analysis = engine.analyze_request(&request, &context).await;
/// if analysis.action == ThreatAction::Block { /* reject */ }
/// ```
pub struct ThreatEngine {
    shared: Arc<EngineShared>,
    tasks: Mutex<Option<EngineTasks>>,
}

impl ThreatEngine {
    pub fn builder(config: ThreatConfig) -> ThreatEngineBuilder {
        ThreatEngineBuilder {
            config,
            clock: Arc::new(SystemClock),
            policy: None,
            geo_resolver: None,
            ledger: None,
            extra: Vec::new(),
        }
    }

    pub fn config(&self) -> &ThreatConfig {
        &self.shared.config
    }

    /// Score one request.
    ///
    /// Never fails. The verdict is logged to the audit ledger (if one is
    /// attached) as a `security_event`; challenge and block verdicts are
    /// high priority.
    pub async fn analyze_request(
        &self,
        request: &ThreatRequest,
        context: &RequestContext,
    ) -> ThreatAnalysis {
        self.shared.analyze(request, context).await
    }

    /// Escalate suspicious origins that crossed the review criteria and
    /// purge expired blocks. Returns the blocks created.
    pub fn review_suspicious(&self) -> Vec<BlockedOrigin> {
        self.shared.review_suspicious()
    }

    /// Drop idle rate-limit, geolocation, session and behavior state.
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        self.shared.sweep()
    }

    /// The active block for `origin`, if any.
    pub fn is_blocked(&self, origin: &str) -> Option<BlockedOrigin> {
        self.shared
            .containment
            .is_blocked(origin, self.shared.clock.now())
    }

    /// Lift a block before its TTL. Returns whether one existed.
    pub fn unblock(&self, origin: &str) -> bool {
        let lifted = self.shared.containment.unblock(origin);
        if lifted {
            info!(origin, "origin unblocked manually");
            if let Some(ledger) = &self.shared.ledger {
                ledger.log_security_event(
                    Severity::Medium,
                    "origin unblocked",
                    EventData::new()
                        .with("kind", "origin_unblocked")
                        .with("origin", origin),
                    AuditContext::new(ENGINE_SOURCE).with_origin(origin),
                );
            }
        }
        lifted
    }

    /// Active blocks, oldest first.
    pub fn blocked_origins(&self) -> Vec<BlockedOrigin> {
        self.shared
            .containment
            .blocked_origins(self.shared.clock.now())
    }

    /// Times `origin` has been blocked since the engine started.
    pub fn prior_blocks(&self, origin: &str) -> u32 {
        self.shared.containment.prior_blocks(origin)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Spawn the reviewer and sweeper. Must be called from within a Tokio
    /// runtime.
    pub fn start(&self) -> WardenResult<()> {
        let mut tasks = self.tasks.lock().map_err(|e| WardenError::LifecycleError {
            reason: format!("engine task lock poisoned: {}", e),
        })?;
        if tasks.is_some() {
            return Err(WardenError::LifecycleError {
                reason: "threat engine already started".to_string(),
            });
        }

        let cancel = CancellationToken::new();
        let review_every =
            Duration::from_secs(self.shared.config.containment.review_interval_secs.max(1));
        let sweep_every =
            Duration::from_secs(self.shared.config.rate_limit.sweep_interval_secs.max(1));

        let reviewer = {
            let shared = Arc::clone(&self.shared);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut ticker = periodic(review_every);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            shared.review_suspicious();
                        }
                    }
                }
                debug!("threat reviewer stopped");
            })
        };

        let sweeper = {
            let shared = Arc::clone(&self.shared);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut ticker = periodic(sweep_every);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            shared.sweep();
                        }
                    }
                }
                debug!("threat sweeper stopped");
            })
        };

        *tasks = Some(EngineTasks {
            cancel,
            handles: vec![reviewer, sweeper],
        });
        info!(analyzers = self.shared.analyzers.len(), "threat engine started");
        Ok(())
    }

    /// Stop the background tasks. A no-op when not started.
    pub async fn stop(&self) -> WardenResult<()> {
        let tasks = self
            .tasks
            .lock()
            .map_err(|e| WardenError::LifecycleError {
                reason: format!("engine task lock poisoned: {}", e),
            })?
            .take();

        if let Some(tasks) = tasks {
            tasks.cancel.cancel();
            for handle in tasks.handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "threat engine task ended abnormally");
                }
            }
            info!("threat engine stopped");
        }
        Ok(())
    }
}

impl Drop for ThreatEngine {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(tasks) = tasks.take() {
                tasks.cancel.cancel();
            }
        }
    }
}

// ── Internals ─────────────────────────────────────────────────────────────────

impl EngineShared {
    async fn analyze(&self, request: &ThreatRequest, context: &RequestContext) -> ThreatAnalysis {
        let now = self.clock.now();

        if let Some(block) = self.containment.is_blocked(&request.origin, now) {
            let signal = ThreatSignal::new(BLOCKED_ORIGIN, Severity::Critical, MAX_RISK_SCORE)
                .with_detail("reason", block.reason.as_str())
                .with_detail("expires_at", block.expires_at.to_rfc3339());
            let analysis = self.verdict(request, context, now, vec![signal]);
            self.record(request, &analysis);
            return analysis;
        }

        let mut threats = Vec::new();

        let status = self.limiter.check(
            &rate_limit_key(request, context),
            self.rate_window(),
            self.config.rate_limit.max_requests,
        );
        if status.exceeded {
            threats.push(
                ThreatSignal::new(RATE_LIMIT_EXCEEDED, Severity::High, self.config.rate_limit.contribution)
                    .with_detail("count", status.count as u64)
                    .with_detail("max_requests", self.config.rate_limit.max_requests as u64)
                    .with_detail("reset_at", status.reset_at.to_rfc3339()),
            );
        }

        threats.extend(self.run_analyzers(request, context, now).await);

        let prior = self.containment.prior_blocks(&request.origin);
        if prior > 0 {
            threats.push(
                ThreatSignal::new(REPEAT_OFFENDER, Severity::Medium, self.config.repeat_offender_contribution)
                    .with_detail("prior_blocks", prior),
            );
        }

        let analysis = self.verdict(request, context, now, threats);
        self.contain(&analysis, now);
        self.record(request, &analysis);
        analysis
    }

    fn rate_window(&self) -> ChronoDuration {
        ChronoDuration::milliseconds(self.config.rate_limit.window_ms.min(u64::from(u32::MAX)) as i64)
    }

    async fn run_analyzers(
        &self,
        request: &ThreatRequest,
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> Vec<ThreatSignal> {
        let budget = self.config.analyzer_timeout();
        let runs = self.analyzers.iter().map(|analyzer| async move {
            match tokio::time::timeout(budget, analyzer.analyze(request, context, now)).await {
                Ok(Ok(outcome)) => outcome.signals,
                Ok(Err(e)) => {
                    warn!(analyzer = analyzer.name(), error = %e, "analyzer failed; signal degraded");
                    vec![ThreatSignal::degraded(analyzer.name(), e.to_string())]
                }
                Err(_) => {
                    let e = WardenError::AnalyzerTimeout {
                        analyzer: analyzer.name().to_string(),
                        timeout_ms: self.config.analyzer_timeout_ms,
                    };
                    warn!(analyzer = analyzer.name(), error = %e, "analyzer timed out; signal degraded");
                    vec![ThreatSignal::degraded(analyzer.name(), e.to_string())]
                }
            }
        });
        join_all(runs).await.into_iter().flatten().collect()
    }

    /// Order the evidence, score it and ask the policy for an action.
    fn verdict(
        &self,
        request: &ThreatRequest,
        context: &RequestContext,
        now: DateTime<Utc>,
        mut threats: Vec<ThreatSignal>,
    ) -> ThreatAnalysis {
        // Stable: equal contributions keep analyzer order.
        threats.sort_by(|a, b| b.contribution.cmp(&a.contribution));
        let total = threats
            .iter()
            .fold(0u32, |acc, t| acc.saturating_add(t.contribution));
        let risk_score = total.min(MAX_RISK_SCORE);
        let has_critical = threats.iter().any(|t| t.severity == Severity::Critical);
        let action = self.policy.decide(risk_score, has_critical);

        ThreatAnalysis {
            request_id: request.request_id.clone(),
            timestamp: now,
            origin: request.origin.clone(),
            actor_id: context.actor_id.clone(),
            session_id: context.session_id.clone(),
            threats,
            risk_score,
            action,
        }
    }

    fn contain(&self, analysis: &ThreatAnalysis, now: DateTime<Utc>) {
        match analysis.action {
            ThreatAction::Allow => {}
            ThreatAction::Monitor => {
                self.containment
                    .record_suspicious(&analysis.origin, analysis.risk_score, now);
            }
            ThreatAction::Challenge => {
                debug!(origin = %analysis.origin, "step-up verification required");
            }
            ThreatAction::Block => {
                let reason = analysis
                    .threats
                    .first()
                    .map_or("risk_score", |t| t.signal_type.as_str())
                    .to_string();
                let block = self.containment.block(&analysis.origin, reason, now);
                warn!(
                    origin = %block.origin,
                    reason = %block.reason,
                    expires_at = %block.expires_at,
                    risk_score = analysis.risk_score,
                    "origin blocked"
                );
                self.audit_block(&block, Some(analysis.risk_score), "analysis");
            }
        }
    }

    /// Write the verdict to the ledger as a security event.
    fn record(&self, request: &ThreatRequest, analysis: &ThreatAnalysis) {
        let signals: Vec<Value> = analysis
            .threats
            .iter()
            .map(|t| Value::from(t.signal_type.as_str()))
            .collect();

        match analysis.action {
            ThreatAction::Allow => debug!(
                request_id = %analysis.request_id,
                origin = %analysis.origin,
                risk_score = analysis.risk_score,
                "request allowed"
            ),
            action => info!(
                request_id = %analysis.request_id,
                origin = %analysis.origin,
                risk_score = analysis.risk_score,
                action = %action,
                signals = ?signals,
                "request flagged"
            ),
        }

        let Some(ledger) = &self.ledger else {
            return;
        };

        let (severity, priority) = match analysis.action {
            ThreatAction::Allow => (Severity::Low, Priority::Low),
            ThreatAction::Monitor => (Severity::Medium, Priority::Normal),
            ThreatAction::Challenge => (Severity::High, Priority::High),
            ThreatAction::Block => (Severity::Critical, Priority::High),
        };

        let mut context = AuditContext::new(ENGINE_SOURCE)
            .with_origin(analysis.origin.as_str())
            .with_priority(priority);
        if let Some(actor) = &analysis.actor_id {
            context = context.with_actor(actor.as_str());
        }
        if let Some(session) = &analysis.session_id {
            context = context.with_session(session.as_str());
        }
        if let Some(ua) = &request.user_agent {
            context = context.with_user_agent(ua.as_str());
        }

        let details = EventData::new()
            .with("kind", "threat_analysis")
            .with("request_id", analysis.request_id.as_str())
            .with("method", request.method.as_str())
            .with("path", request.path.as_str())
            .with("risk_score", u64::from(analysis.risk_score))
            .with("action", analysis.action.as_str())
            .with("signals", signals);

        ledger.log_security_event(
            severity,
            &format!("request verdict: {}", analysis.action),
            details,
            context,
        );
    }

    fn audit_block(&self, block: &BlockedOrigin, risk_score: Option<u32>, trigger: &str) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        let mut details = EventData::new()
            .with("kind", "origin_blocked")
            .with("origin", block.origin.as_str())
            .with("reason", block.reason.as_str())
            .with("trigger", trigger)
            .with("blocked_at", block.blocked_at.to_rfc3339())
            .with("expires_at", block.expires_at.to_rfc3339());
        if let Some(score) = risk_score {
            details.insert("risk_score", u64::from(score));
        }
        ledger.log_security_event(
            Severity::Critical,
            "origin blocked",
            details,
            AuditContext::new(ENGINE_SOURCE).with_origin(block.origin.as_str()),
        );
    }

    fn review_suspicious(&self) -> Vec<BlockedOrigin> {
        let now = self.clock.now();
        let purged = self.containment.purge_expired(now);
        if purged > 0 {
            info!(purged, "expired origin blocks removed");
        }

        let mut blocks = Vec::new();
        for escalation in self.containment.review(now) {
            let reason = format!(
                "escalated: {} monitor verdicts averaging {}",
                escalation.events, escalation.average_score
            );
            let block = self.containment.block(&escalation.origin, reason, now);
            warn!(
                origin = %block.origin,
                events = escalation.events,
                average_score = escalation.average_score,
                "suspicious origin escalated to block"
            );
            self.audit_block(&block, Some(escalation.average_score), "escalation");
            blocks.push(block);
        }
        blocks
    }

    fn sweep(&self) -> usize {
        let now = self.clock.now();
        let geo = self.geo.as_ref().map_or(0, |g| g.sweep(now));
        let removed =
            self.limiter.sweep() + geo + self.sessions.sweep(now) + self.behavior.sweep(now);
        if removed > 0 {
            debug!(removed, "threat state sweep");
        }
        removed
    }
}

/// Rate-limit bucket: origin plus actor, or `anonymous`.
fn rate_limit_key(request: &ThreatRequest, context: &RequestContext) -> String {
    format!(
        "{}|{}",
        request.origin,
        context.actor_id.as_deref().unwrap_or("anonymous")
    )
}

fn periodic(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
