//! # warden-policy
//!
//! TOML-driven configuration and the threshold decision policy for WARDEN.
//!
//! ## Overview
//!
//! This crate provides [`ThresholdPolicy`], which implements the
//! [`ActionPolicy`](warden_core::traits::ActionPolicy) trait, and the
//! [`load_config_str`] / [`load_config_file`] loaders that turn a TOML
//! document into a validated [`WardenConfig`](warden_contracts::config::WardenConfig).
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use warden_policy::{load_config_file, ThresholdPolicy};
//!
//! let config = load_config_file(Path::new("warden.toml"))?;
//! let policy = ThresholdPolicy::new(config.threat.thresholds)?;
//! ```

pub mod engine;
pub mod loader;

pub use engine::{validate_thresholds, ThresholdPolicy};
pub use loader::{load_config_file, load_config_str, validate_config};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use warden_contracts::{config::DecisionThresholds, error::WardenError, threat::ThreatAction};
    use warden_core::traits::ActionPolicy;

    use crate::{load_config_str, ThresholdPolicy};

    // ── 1. boundary-inclusive defaults ────────────────────────────────────────

    /// 39/40/69/70/99/100 map to allow/monitor/monitor/challenge/challenge/block.
    #[test]
    fn test_default_thresholds_are_boundary_inclusive() {
        let policy = ThresholdPolicy::default();
        let cases = [
            (39, ThreatAction::Allow),
            (40, ThreatAction::Monitor),
            (69, ThreatAction::Monitor),
            (70, ThreatAction::Challenge),
            (99, ThreatAction::Challenge),
            (100, ThreatAction::Block),
        ];
        for (score, expected) in cases {
            assert_eq!(policy.decide(score, false), expected, "score {score}");
        }
    }

    // ── 2. critical overrides score ───────────────────────────────────────────

    /// A critical signal blocks even at score zero.
    #[test]
    fn test_critical_signal_always_blocks() {
        let policy = ThresholdPolicy::default();
        assert_eq!(policy.decide(0, true), ThreatAction::Block);
        assert_eq!(policy.decide(45, true), ThreatAction::Block);
    }

    // ── 3. custom cut points ──────────────────────────────────────────────────

    #[test]
    fn test_custom_thresholds() {
        let policy = ThresholdPolicy::new(DecisionThresholds {
            monitor: 20,
            challenge: 50,
            block: 80,
        })
        .unwrap();

        assert_eq!(policy.decide(19, false), ThreatAction::Allow);
        assert_eq!(policy.decide(20, false), ThreatAction::Monitor);
        assert_eq!(policy.decide(50, false), ThreatAction::Challenge);
        assert_eq!(policy.decide(80, false), ThreatAction::Block);
    }

    // ── 4. unordered thresholds are rejected ──────────────────────────────────

    #[test]
    fn test_unordered_thresholds_rejected() {
        let result = ThresholdPolicy::new(DecisionThresholds {
            monitor: 70,
            challenge: 40,
            block: 100,
        });
        match result {
            Err(WardenError::ConfigError { reason }) => {
                assert!(reason.contains("monitor"), "unexpected reason: {reason}");
            }
            other => panic!("expected ConfigError, got {:?}", other),
        }

        assert!(ThresholdPolicy::new(DecisionThresholds {
            monitor: 40,
            challenge: 70,
            block: 120,
        })
        .is_err());
    }

    // ── 5. partial TOML keeps defaults ────────────────────────────────────────

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [ledger]
            batch_size = 25

            [threat.thresholds]
            monitor = 30
        "#;

        let config = load_config_str(toml).unwrap();
        assert_eq!(config.ledger.batch_size, 25);
        assert_eq!(config.ledger.retention_days, 2_555);
        assert_eq!(config.threat.thresholds.monitor, 30);
        assert_eq!(config.threat.thresholds.challenge, 70);
        assert_eq!(config.threat.rate_limit.max_requests, 100);
        assert!(config
            .threat
            .payload
            .malicious_user_agents
            .iter()
            .any(|ua| ua == "sqlmap"));
    }

    #[test]
    fn test_empty_toml_is_default_config() {
        let config = load_config_str("").unwrap();
        assert_eq!(config, warden_contracts::config::WardenConfig::default());
    }

    // ── 6. invalid values ─────────────────────────────────────────────────────

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = load_config_str("[ledger]\nbatch_size = 0\n");
        match result {
            Err(WardenError::ConfigError { reason }) => {
                assert!(reason.contains("ledger.batch_size"), "unexpected reason: {reason}");
            }
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_threshold_order_in_toml_rejected() {
        let toml = r#"
            [threat.thresholds]
            monitor = 80
            challenge = 70
        "#;
        assert!(matches!(
            load_config_str(toml),
            Err(WardenError::ConfigError { .. })
        ));
    }

    // ── 7. TOML parse error ───────────────────────────────────────────────────

    #[test]
    fn test_toml_parse_error() {
        let bad_toml = r#"
            this is not valid toml ][[[
        "#;

        match load_config_str(bad_toml) {
            Err(WardenError::ConfigError { reason }) => {
                assert!(
                    reason.contains("failed to parse config TOML"),
                    "expected parse error message, got: {reason}"
                );
            }
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = crate::load_config_file(std::path::Path::new("/nonexistent/warden.toml"));
        assert!(matches!(result, Err(WardenError::ConfigError { .. })));
    }
}
