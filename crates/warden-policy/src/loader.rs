//! TOML configuration loading.
//!
//! A `WardenConfig` is read from a TOML string or file. Every section and
//! key is optional; missing values fall back to the defaults declared in
//! warden-contracts. The parsed document is validated before it is returned.
//!
//! Example:
//! ```toml
//! [ledger]
//! batch_size = 50
//!
//! [threat.thresholds]
//! monitor = 30
//! challenge = 60
//! block = 90
//! ```

use std::path::Path;

use tracing::info;

use warden_contracts::{
    config::WardenConfig,
    error::{WardenError, WardenResult},
};

use crate::engine::validate_thresholds;

/// Parse `s` as TOML and validate the result.
///
/// Returns `WardenError::ConfigError` if the TOML is malformed, does not
/// match the `WardenConfig` schema, or fails validation.
pub fn load_config_str(s: &str) -> WardenResult<WardenConfig> {
    let config: WardenConfig = toml::from_str(s).map_err(|e| WardenError::ConfigError {
        reason: format!("failed to parse config TOML: {}", e),
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Read the file at `path` and parse it as TOML configuration.
pub fn load_config_file(path: &Path) -> WardenResult<WardenConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| WardenError::ConfigError {
        reason: format!("failed to read config file '{}': {}", path.display(), e),
    })?;
    let config = load_config_str(&contents)?;
    info!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Reject values that would make the ledger or engine misbehave.
pub fn validate_config(config: &WardenConfig) -> WardenResult<()> {
    let ledger = &config.ledger;
    let threat = &config.threat;

    let nonzero: [(&str, u64); 9] = [
        ("ledger.batch_size", ledger.batch_size as u64),
        ("ledger.flush_interval_ms", ledger.flush_interval_ms),
        ("ledger.integrity_check_interval_secs", ledger.integrity_check_interval_secs),
        ("ledger.retention_sweep_interval_secs", ledger.retention_sweep_interval_secs),
        ("ledger.notification_capacity", ledger.notification_capacity as u64),
        ("ledger.max_query_limit", ledger.max_query_limit as u64),
        ("threat.analyzer_timeout_ms", threat.analyzer_timeout_ms),
        ("threat.rate_limit.window_ms", threat.rate_limit.window_ms),
        ("threat.containment.review_interval_secs", threat.containment.review_interval_secs),
    ];
    for (key, value) in nonzero {
        if value == 0 {
            return Err(WardenError::ConfigError {
                reason: format!("{} must be greater than 0", key),
            });
        }
    }

    if ledger.retention_days == 0 {
        return Err(WardenError::ConfigError {
            reason: "ledger.retention_days must be greater than 0".to_string(),
        });
    }

    if threat.geo.max_travel_speed_kmh <= 0.0 || !threat.geo.max_travel_speed_kmh.is_finite() {
        return Err(WardenError::ConfigError {
            reason: "threat.geo.max_travel_speed_kmh must be a positive number".to_string(),
        });
    }

    if threat.geo.sighting_ttl_secs == 0 {
        return Err(WardenError::ConfigError {
            reason: "threat.geo.sighting_ttl_secs must be greater than 0".to_string(),
        });
    }

    if threat.containment.escalation_min_events == 0 {
        return Err(WardenError::ConfigError {
            reason: "threat.containment.escalation_min_events must be greater than 0".to_string(),
        });
    }

    validate_thresholds(&threat.thresholds)
}
