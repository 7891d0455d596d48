//! Configuration schema.
//!
//! Every struct carries `#[serde(default)]`, so a TOML document only needs
//! the keys it overrides. The risk weights below are hand-tuned defaults,
//! not invariants.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for a WARDEN deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub ledger: LedgerConfig,
    pub threat: ThreatConfig,
}

/// Audit ledger buffering, monitoring and retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Entries per durable append; reaching it triggers a flush.
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub integrity_check_interval_secs: u64,
    pub retention_days: u32,
    pub retention_sweep_interval_secs: u64,
    /// Consecutive flush failures before an operational alert.
    pub flush_failure_alert_threshold: u32,
    /// Capacity of the notification broadcast channel.
    pub notification_capacity: usize,
    pub max_query_limit: usize,
}

impl LedgerConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn integrity_check_interval(&self) -> Duration {
        Duration::from_secs(self.integrity_check_interval_secs)
    }

    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_interval_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_ms: 5_000,
            integrity_check_interval_secs: 3_600,
            // Seven years.
            retention_days: 2_555,
            retention_sweep_interval_secs: 86_400,
            flush_failure_alert_threshold: 3,
            notification_capacity: 1_024,
            max_query_limit: 1_000,
        }
    }
}

/// Threat scoring engine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatConfig {
    pub thresholds: DecisionThresholds,
    pub rate_limit: RateLimitConfig,
    pub payload: PayloadConfig,
    pub geo: GeoConfig,
    pub session: SessionConfig,
    pub behavior: BehaviorConfig,
    pub containment: ContainmentConfig,
    /// Per-analyzer time budget.
    pub analyzer_timeout_ms: u64,
    /// Added per prior block of the same origin.
    pub repeat_offender_contribution: u32,
}

impl ThreatConfig {
    pub fn analyzer_timeout(&self) -> Duration {
        Duration::from_millis(self.analyzer_timeout_ms)
    }
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            thresholds: DecisionThresholds::default(),
            rate_limit: RateLimitConfig::default(),
            payload: PayloadConfig::default(),
            geo: GeoConfig::default(),
            session: SessionConfig::default(),
            behavior: BehaviorConfig::default(),
            containment: ContainmentConfig::default(),
            analyzer_timeout_ms: 250,
            repeat_offender_contribution: 15,
        }
    }
}

/// Inclusive lower bounds of each action band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    pub monitor: u32,
    pub challenge: u32,
    pub block: u32,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            monitor: 40,
            challenge: 70,
            block: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_requests: usize,
    pub contribution: u32,
    pub sweep_interval_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_requests: 100,
            contribution: 30,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    pub max_payload_bytes: u64,
    /// Weight of any injection or traversal match; reaches "block" alone.
    pub injection_contribution: u32,
    pub malicious_user_agent_contribution: u32,
    pub oversized_contribution: u32,
    pub obfuscation_contribution: u32,
    pub dangerous_upload_contribution: u32,
    pub malicious_user_agents: Vec<String>,
    pub dangerous_extensions: Vec<String>,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024,
            injection_contribution: 100,
            malicious_user_agent_contribution: 60,
            oversized_contribution: 30,
            obfuscation_contribution: 25,
            dangerous_upload_contribution: 50,
            malicious_user_agents: [
                "sqlmap", "nikto", "nmap", "masscan", "acunetix", "nessus", "havij",
                "dirbuster", "gobuster", "w3af", "zgrab", "nuclei", "wpscan",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            dangerous_extensions: [
                "exe", "dll", "bat", "cmd", "sh", "php", "phtml", "jsp", "asp", "aspx", "js",
                "vbs", "ps1", "jar", "scr",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Faster than this between two sightings is impossible travel.
    /// The default is roughly commercial-flight cruising speed.
    pub max_travel_speed_kmh: f64,
    /// Sightings closer than this are treated as the same place.
    pub min_travel_distance_km: f64,
    pub high_risk_countries: Vec<String>,
    pub high_risk_contribution: u32,
    pub anonymizer_contribution: u32,
    pub impossible_travel_contribution: u32,
    /// Sightings older than this are forgotten by the sweeper.
    pub sighting_ttl_secs: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            max_travel_speed_kmh: 900.0,
            min_travel_distance_km: 50.0,
            high_risk_countries: ["KP", "IR", "SY", "CU"].into_iter().map(String::from).collect(),
            high_risk_contribution: 25,
            anonymizer_contribution: 20,
            impossible_travel_contribution: 40,
            // At 900 km/h a day covers any two points on Earth.
            sighting_ttl_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub staleness_secs: u64,
    pub origin_mismatch_contribution: u32,
    pub user_agent_mismatch_contribution: u32,
    pub stale_contribution: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            staleness_secs: 1_800,
            origin_mismatch_contribution: 25,
            user_agent_mismatch_contribution: 20,
            stale_contribution: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Trailing window over which activity is counted.
    pub window_secs: u64,
    /// Maximum events per activity type inside the window.
    pub activity_limits: BTreeMap<String, usize>,
    pub per_excess_contribution: u32,
    pub max_contribution: u32,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        let activity_limits = [
            ("login", 10),
            ("data_export", 5),
            ("phi_access", 200),
            ("write", 300),
            ("read", 2_000),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            window_secs: 86_400,
            activity_limits,
            per_excess_contribution: 5,
            max_contribution: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainmentConfig {
    pub block_ttl_secs: u64,
    /// Monitor-level events needed inside the window before escalation.
    pub escalation_min_events: usize,
    pub escalation_window_secs: u64,
    /// Average score those events must exceed.
    pub escalation_avg_score: u32,
    pub review_interval_secs: u64,
}

impl Default for ContainmentConfig {
    fn default() -> Self {
        Self {
            block_ttl_secs: 3_600,
            escalation_min_events: 5,
            escalation_window_secs: 600,
            escalation_avg_score: 50,
            review_interval_secs: 60,
        }
    }
}
