//! Threat scoring types.
//!
//! The engine consumes a `ThreatRequest` plus `RequestContext` and produces a
//! `ThreatAnalysis`. Translating the `ThreatAction` into an HTTP response is
//! the caller's job.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How bad a single signal is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decision for a request, ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatAction {
    /// Pass through.
    Allow,
    /// Pass through, but track the origin.
    Monitor,
    /// Require step-up verification before proceeding.
    Challenge,
    /// Reject and block the origin for the configured TTL.
    Block,
}

impl ThreatAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatAction::Allow => "allow",
            ThreatAction::Monitor => "monitor",
            ThreatAction::Challenge => "challenge",
            ThreatAction::Block => "block",
        }
    }
}

impl fmt::Display for ThreatAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One piece of evidence contributing to a risk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatSignal {
    /// Discriminant such as `sql_injection` or `impossible_travel`.
    pub signal_type: String,
    pub severity: Severity,
    pub details: BTreeMap<String, Value>,
    /// Risk points added to the score.
    pub contribution: u32,
}

impl ThreatSignal {
    /// Signal type recorded when an analyzer timed out or failed.
    pub const DEGRADED: &'static str = "degraded_signal";

    pub fn new(signal_type: impl Into<String>, severity: Severity, contribution: u32) -> Self {
        Self {
            signal_type: signal_type.into(),
            severity,
            details: BTreeMap::new(),
            contribution,
        }
    }

    /// Builder-style detail insert.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// A zero-contribution marker for an analyzer that produced nothing usable.
    pub fn degraded(analyzer: &str, reason: impl Into<String>) -> Self {
        Self::new(Self::DEGRADED, Severity::Low, 0)
            .with_detail("analyzer", analyzer)
            .with_detail("reason", reason.into())
    }

    pub fn is_degraded(&self) -> bool {
        self.signal_type == Self::DEGRADED
    }
}

/// A file attached to the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
}

/// An inbound request, already parsed by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatRequest {
    pub request_id: String,
    pub method: String,
    pub path: String,
    /// Network address of the caller.
    pub origin: String,
    pub user_agent: Option<String>,
    pub body: Option<String>,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    #[serde(default)]
    pub files: Vec<UploadedFile>,
}

impl ThreatRequest {
    /// A request with a fresh `request_id` and no body, query or files.
    pub fn new(method: impl Into<String>, path: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            method: method.into(),
            path: path.into(),
            origin: origin.into(),
            user_agent: None,
            body: None,
            query: None,
            files: Vec::new(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.files.push(file);
        self
    }

    /// Total size of body, query and uploaded files in bytes.
    pub fn payload_bytes(&self) -> u64 {
        let body = self.body.as_ref().map_or(0, |b| b.len() as u64);
        let query = self.query.as_ref().map_or(0, |q| q.len() as u64);
        let files: u64 = self.files.iter().map(|f| f.size_bytes).sum();
        body + query + files
    }
}

/// Identity attached to a request by upstream authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub actor_id: Option<String>,
    pub session_id: Option<String>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_actor(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: Some(actor_id.into()),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// The verdict for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatAnalysis {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub origin: String,
    pub actor_id: Option<String>,
    pub session_id: Option<String>,
    /// Ordered by contribution, highest first.
    pub threats: Vec<ThreatSignal>,
    /// Sum of contributions clamped to `0..=100`.
    pub risk_score: u32,
    pub action: ThreatAction,
}

impl ThreatAnalysis {
    pub fn has_critical(&self) -> bool {
        self.threats.iter().any(|t| t.severity == Severity::Critical)
    }

    /// Find the first signal of the given type.
    pub fn signal(&self, signal_type: &str) -> Option<&ThreatSignal> {
        self.threats.iter().find(|t| t.signal_type == signal_type)
    }
}

/// Result of a sliding-window rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub exceeded: bool,
    /// Requests in the window, including the current one.
    pub count: usize,
    /// When the oldest request in the window leaves it.
    pub reset_at: DateTime<Utc>,
}

/// An origin rejected outright until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedOrigin {
    pub origin: String,
    pub blocked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub reason: String,
}

impl BlockedOrigin {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Coarse location of a network origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// ISO 3166-1 alpha-2.
    pub country_code: String,
    pub city: Option<String>,
    #[serde(default)]
    pub is_vpn: bool,
    #[serde(default)]
    pub is_proxy: bool,
    #[serde(default)]
    pub is_tor: bool,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64, country_code: impl Into<String>) -> Self {
        Self {
            latitude,
            longitude,
            country_code: country_code.into(),
            city: None,
            is_vpn: false,
            is_proxy: false,
            is_tor: false,
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &GeoLocation) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// What one analyzer found for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerOutcome {
    pub signals: Vec<ThreatSignal>,
}

impl AnalyzerOutcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn push(&mut self, signal: ThreatSignal) {
        self.signals.push(signal);
    }

    /// Sum of the signal contributions, saturating.
    pub fn contribution(&self) -> u32 {
        self.signals
            .iter()
            .fold(0u32, |acc, s| acc.saturating_add(s.contribution))
    }
}
