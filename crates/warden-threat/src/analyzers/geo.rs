//! Geolocation analyzer.
//!
//! Resolves the request origin and flags high-risk regions, anonymizing
//! networks, and impossible travel: the same actor seen from two places
//! farther apart than `max_travel_speed_kmh` allows in the time between.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use warden_contracts::{
    config::GeoConfig,
    error::WardenResult,
    threat::{AnalyzerOutcome, GeoLocation, RequestContext, Severity, ThreatRequest, ThreatSignal},
};
use warden_core::traits::{GeoResolver, SignalAnalyzer};

pub const HIGH_RISK_REGION: &str = "high_risk_region";
pub const ANONYMIZER: &str = "anonymizer";
pub const IMPOSSIBLE_TRAVEL: &str = "impossible_travel";

#[derive(Debug, Clone)]
struct Sighting {
    location: GeoLocation,
    at: DateTime<Utc>,
}

pub struct GeoAnalyzer {
    resolver: Arc<dyn GeoResolver>,
    config: GeoConfig,
    /// Last resolved location per actor.
    last_seen: DashMap<String, Sighting>,
}

impl GeoAnalyzer {
    pub fn new(resolver: Arc<dyn GeoResolver>, config: GeoConfig) -> Self {
        Self {
            resolver,
            config,
            last_seen: DashMap::new(),
        }
    }

    fn check_travel(
        &self,
        previous: &Sighting,
        current: &GeoLocation,
        now: DateTime<Utc>,
    ) -> Option<ThreatSignal> {
        let distance_km = previous.location.distance_km(current);
        if distance_km < self.config.min_travel_distance_km {
            return None;
        }

        let elapsed_hours = (now - previous.at).num_milliseconds().max(0) as f64 / 3_600_000.0;
        let speed_kmh = if elapsed_hours > 0.0 {
            distance_km / elapsed_hours
        } else {
            f64::INFINITY
        };
        if speed_kmh <= self.config.max_travel_speed_kmh {
            return None;
        }

        let speed = if speed_kmh.is_finite() {
            Value::from(speed_kmh.round())
        } else {
            Value::Null
        };
        Some(
            ThreatSignal::new(
                IMPOSSIBLE_TRAVEL,
                Severity::High,
                self.config.impossible_travel_contribution,
            )
            .with_detail("distance_km", distance_km.round())
            .with_detail("elapsed_minutes", (elapsed_hours * 60.0).round())
            .with_detail("speed_kmh", speed)
            .with_detail("from", previous.location.country_code.as_str())
            .with_detail("to", current.country_code.as_str()),
        )
    }

    /// Drop sightings older than `sighting_ttl_secs`. Returns the number
    /// of actors forgotten.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let secs = i64::try_from(self.config.sighting_ttl_secs).unwrap_or(i64::MAX);
        let Some(ttl) = ChronoDuration::try_seconds(secs) else {
            return 0;
        };
        let Some(cutoff) = now.checked_sub_signed(ttl) else {
            return 0;
        };
        let before = self.last_seen.len();
        self.last_seen.retain(|_, s| s.at >= cutoff);
        before.saturating_sub(self.last_seen.len())
    }

    pub fn tracked_actors(&self) -> usize {
        self.last_seen.len()
    }

    /// Forget every recorded location.
    pub fn clear(&self) {
        self.last_seen.clear();
    }
}

#[async_trait]
impl SignalAnalyzer for GeoAnalyzer {
    fn name(&self) -> &'static str {
        "geolocation"
    }

    async fn analyze(
        &self,
        request: &ThreatRequest,
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> WardenResult<AnalyzerOutcome> {
        let mut outcome = AnalyzerOutcome::none();
        let Some(location) = self.resolver.resolve(&request.origin).await? else {
            debug!(origin = %request.origin, "origin not resolvable; skipping geo checks");
            return Ok(outcome);
        };

        let country = location.country_code.to_ascii_uppercase();
        if self
            .config
            .high_risk_countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&country))
        {
            outcome.push(
                ThreatSignal::new(HIGH_RISK_REGION, Severity::Medium, self.config.high_risk_contribution)
                    .with_detail("country", country.as_str()),
            );
        }

        if location.is_vpn || location.is_proxy || location.is_tor {
            let severity = if location.is_tor { Severity::High } else { Severity::Medium };
            outcome.push(
                ThreatSignal::new(ANONYMIZER, severity, self.config.anonymizer_contribution)
                    .with_detail("vpn", location.is_vpn)
                    .with_detail("proxy", location.is_proxy)
                    .with_detail("tor", location.is_tor),
            );
        }

        if let Some(actor) = context.actor_id.as_deref() {
            if let Some(previous) = self.last_seen.get(actor) {
                if let Some(signal) = self.check_travel(&previous, &location, now) {
                    outcome.push(signal);
                }
            }
            self.last_seen.insert(
                actor.to_string(),
                Sighting {
                    location,
                    at: now,
                },
            );
        }

        Ok(outcome)
    }
}

/// A resolver backed by a fixed origin → location table.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoResolver {
    table: HashMap<String, GeoLocation>,
}

impl StaticGeoResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, origin: impl Into<String>, location: GeoLocation) -> Self {
        self.table.insert(origin.into(), location);
        self
    }
}

#[async_trait]
impl GeoResolver for StaticGeoResolver {
    async fn resolve(&self, origin: &str) -> WardenResult<Option<GeoLocation>> {
        Ok(self.table.get(origin).cloned())
    }
}
