//! # warden-contracts
//!
//! Shared types, configuration schema and error taxonomy for WARDEN.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate: only data definitions and small helpers on them.

pub mod audit;
pub mod config;
pub mod error;
pub mod threat;

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use audit::{AuditContext, AuditEntry, AuditEntryId, AuditQuery, EventData, EventType, Priority};
    use error::WardenError;
    use threat::{GeoLocation, Severity, ThreatAction, ThreatRequest, ThreatSignal, UploadedFile};

    fn entry(event_type: EventType, actor: Option<&str>, minute: i64) -> AuditEntry {
        let mut context = AuditContext::new("test").with_origin("10.0.0.1");
        context.actor_id = actor.map(String::from);
        AuditEntry {
            id: AuditEntryId::new(),
            sequence_number: 1,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(minute),
            event_type,
            event_data: EventData::new().with(EventData::RESOURCE_ID, "patient/7"),
            context,
            previous_hash: None,
            hash: String::new(),
            encrypted: false,
            compliance_flags: Vec::new(),
        }
    }

    // ── EventType ────────────────────────────────────────────────────────────

    #[test]
    fn event_type_serializes_snake_case() {
        let json = serde_json::to_string(&EventType::ConfigurationChange).unwrap();
        assert_eq!(json, "\"configuration_change\"");
        for t in EventType::ALL {
            let quoted = serde_json::to_string(&t).unwrap();
            assert_eq!(quoted.trim_matches('"'), t.as_str());
        }
    }

    #[test]
    fn sensitive_and_immediate_classification() {
        assert!(EventType::PhiAccess.is_sensitive());
        assert!(EventType::Authentication.is_sensitive());
        assert!(EventType::DataModification.is_sensitive());
        assert!(!EventType::DataAccess.is_sensitive());

        assert!(EventType::SecurityEvent.requires_immediate_flush());
        assert!(EventType::ComplianceEvent.requires_immediate_flush());
        assert!(EventType::PhiAccess.requires_immediate_flush());
        assert!(!EventType::DataAccess.requires_immediate_flush());
    }

    #[test]
    fn priority_defaults_to_normal_when_absent() {
        let ctx: AuditContext = serde_json::from_value(json!({
            "actor_id": null,
            "session_id": null,
            "origin": null,
            "user_agent": null,
            "source": "api"
        }))
        .unwrap();
        assert_eq!(ctx.priority, Priority::Normal);
    }

    // ── AuditQuery ───────────────────────────────────────────────────────────

    #[test]
    fn query_filters_are_conjunctive() {
        let e = entry(EventType::PhiAccess, Some("dr-house"), 0);

        assert!(AuditQuery::default().matches(&e));

        let by_actor = AuditQuery {
            actor_id: Some("dr-house".into()),
            event_type: Some(EventType::PhiAccess),
            resource_id: Some("patient/7".into()),
            origin: Some("10.0.0.1".into()),
            ..AuditQuery::default()
        };
        assert!(by_actor.matches(&e));

        let wrong_type = AuditQuery {
            actor_id: Some("dr-house".into()),
            event_type: Some(EventType::DataAccess),
            ..AuditQuery::default()
        };
        assert!(!wrong_type.matches(&e));

        let anonymous = entry(EventType::PhiAccess, None, 0);
        assert!(!by_actor.matches(&anonymous));
    }

    #[test]
    fn query_time_bounds_are_start_inclusive_end_exclusive() {
        let e = entry(EventType::DataAccess, None, 10);
        let at = e.timestamp;

        let starts_at = AuditQuery { start: Some(at), ..AuditQuery::default() };
        assert!(starts_at.matches(&e));

        let ends_at = AuditQuery { end: Some(at), ..AuditQuery::default() };
        assert!(!ends_at.matches(&e));

        let ends_after = AuditQuery { end: Some(at + Duration::seconds(1)), ..AuditQuery::default() };
        assert!(ends_after.matches(&e));
    }

    // ── Threat types ─────────────────────────────────────────────────────────

    #[test]
    fn severity_and_action_are_ordered() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
        assert!(ThreatAction::Block > ThreatAction::Challenge);
        assert!(ThreatAction::Monitor > ThreatAction::Allow);
    }

    #[test]
    fn degraded_signal_has_zero_contribution() {
        let s = ThreatSignal::degraded("geolocation", "timeout");
        assert!(s.is_degraded());
        assert_eq!(s.contribution, 0);
        assert_eq!(s.details["analyzer"], json!("geolocation"));
    }

    #[test]
    fn payload_bytes_sums_body_query_and_files() {
        let req = ThreatRequest::new("POST", "/upload", "10.0.0.2")
            .with_body("abcd")
            .with_query("q=1")
            .with_file(UploadedFile {
                name: "scan.pdf".into(),
                content_type: None,
                size_bytes: 100,
            });
        assert_eq!(req.payload_bytes(), 107);
    }

    #[test]
    fn distance_between_known_cities() {
        let london = GeoLocation::new(51.5074, -0.1278, "GB");
        let paris = GeoLocation::new(48.8566, 2.3522, "FR");
        let d = london.distance_km(&paris);
        assert!((330.0..360.0).contains(&d), "London–Paris should be ~344 km, got {d}");
        assert!(london.distance_km(&london) < 1e-9);
    }

    // ── Config defaults ──────────────────────────────────────────────────────

    #[test]
    fn default_thresholds_are_ordered() {
        let cfg = config::WardenConfig::default();
        let t = cfg.threat.thresholds;
        assert_eq!((t.monitor, t.challenge, t.block), (40, 70, 100));
        assert_eq!(cfg.ledger.retention_days, 2_555);
        assert_eq!(cfg.ledger.batch_size, 100);
    }

    // ── WardenError display messages ─────────────────────────────────────────

    #[test]
    fn error_messages_carry_context() {
        let err = WardenError::AnalyzerTimeout {
            analyzer: "geolocation".into(),
            timeout_ms: 250,
        };
        let msg = err.to_string();
        assert!(msg.contains("geolocation"));
        assert!(msg.contains("250"));

        let err = WardenError::StorageUnavailable { reason: "connection refused".into() };
        assert!(err.to_string().contains("storage unavailable"));

        let err = WardenError::IntegrityViolation { reason: "entry 3 hash mismatch".into() };
        assert!(err.to_string().contains("integrity violation"));
    }
}
