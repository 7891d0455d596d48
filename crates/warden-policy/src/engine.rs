//! Threshold decision policy.
//!
//! `ThresholdPolicy` implements the `ActionPolicy` trait from warden-core.
//!
//! Decision algorithm:
//!
//! 1. Any critical signal, or a score at or above `block` → `Block`.
//! 2. Score at or above `challenge` → `Challenge`.
//! 3. Score at or above `monitor` → `Monitor`.
//! 4. Otherwise → `Allow`.
//!
//! All bounds are inclusive.

use tracing::debug;

use warden_contracts::{
    config::DecisionThresholds,
    error::{WardenError, WardenResult},
    threat::ThreatAction,
};
use warden_core::traits::ActionPolicy;

/// An `ActionPolicy` driven by three ordered cut points.
///
/// ```rust,ignore
/// use warden_policy::ThresholdPolicy;
///
/// let policy = ThresholdPolicy::new(config.threat.thresholds)?;
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThresholdPolicy {
    thresholds: DecisionThresholds,
}

impl ThresholdPolicy {
    /// Build a policy after checking the cut points are ordered.
    ///
    /// Returns `WardenError::ConfigError` unless
    /// `monitor < challenge <= block <= 100`.
    pub fn new(thresholds: DecisionThresholds) -> WardenResult<Self> {
        validate_thresholds(&thresholds)?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> DecisionThresholds {
        self.thresholds
    }
}

impl ActionPolicy for ThresholdPolicy {
    fn decide(&self, risk_score: u32, has_critical: bool) -> ThreatAction {
        let t = &self.thresholds;
        let action = if has_critical || risk_score >= t.block {
            ThreatAction::Block
        } else if risk_score >= t.challenge {
            ThreatAction::Challenge
        } else if risk_score >= t.monitor {
            ThreatAction::Monitor
        } else {
            ThreatAction::Allow
        };

        debug!(risk_score, has_critical, action = %action, "decision");
        action
    }
}

/// Check that `monitor < challenge <= block <= 100` and `monitor > 0`.
pub fn validate_thresholds(t: &DecisionThresholds) -> WardenResult<()> {
    if t.monitor == 0 {
        return Err(WardenError::ConfigError {
            reason: "threat.thresholds.monitor must be greater than 0".to_string(),
        });
    }
    if t.monitor >= t.challenge {
        return Err(WardenError::ConfigError {
            reason: format!(
                "threat.thresholds.monitor ({}) must be below challenge ({})",
                t.monitor, t.challenge
            ),
        });
    }
    if t.challenge > t.block {
        return Err(WardenError::ConfigError {
            reason: format!(
                "threat.thresholds.challenge ({}) must not exceed block ({})",
                t.challenge, t.block
            ),
        });
    }
    if t.block > 100 {
        return Err(WardenError::ConfigError {
            reason: format!("threat.thresholds.block ({}) must not exceed 100", t.block),
        });
    }
    Ok(())
}
