//! # warden-core
//!
//! The trust seams of WARDEN.
//!
//! This crate provides:
//! - The collaborator traits (`AuditStore`, `Encryptor`, `GeoResolver`,
//!   `SignalAnalyzer`, `ActionPolicy`)
//! - The `Clock` abstraction with `SystemClock` and `ManualClock`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use warden_core::{clock::{Clock, ManualClock}, traits::AuditStore};
//! ```

pub mod clock;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use warden_contracts::{
        error::{WardenError, WardenResult},
        threat::{AnalyzerOutcome, RequestContext, Severity, ThreatRequest, ThreatSignal},
    };

    use super::clock::{Clock, ManualClock};
    use super::traits::SignalAnalyzer;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    // ── ManualClock ──────────────────────────────────────────────────────────

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::new(t0());
        assert_eq!(clock.now(), t0());
        assert_eq!(clock.now(), t0());

        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), t0() + Duration::minutes(90));

        clock.set(t0());
        assert_eq!(clock.now(), t0());
    }

    #[test]
    fn manual_clock_is_shareable_as_trait_object() {
        let clock = Arc::new(ManualClock::new(t0()));
        let as_dyn: Arc<dyn Clock> = clock.clone();
        clock.advance(Duration::seconds(5));
        assert_eq!(as_dyn.now(), t0() + Duration::seconds(5));
    }

    // ── SignalAnalyzer object safety ─────────────────────────────────────────

    struct FixedAnalyzer(u32);

    #[async_trait]
    impl SignalAnalyzer for FixedAnalyzer {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn analyze(
            &self,
            _request: &ThreatRequest,
            _context: &RequestContext,
            _now: DateTime<Utc>,
        ) -> WardenResult<AnalyzerOutcome> {
            if self.0 == 0 {
                return Err(WardenError::ConfigError { reason: "zero weight".into() });
            }
            let mut out = AnalyzerOutcome::none();
            out.push(ThreatSignal::new("fixed", Severity::Low, self.0));
            out.push(ThreatSignal::new("fixed", Severity::Low, self.0));
            Ok(out)
        }
    }

    #[tokio::test]
    async fn analyzers_work_behind_dyn() {
        let analyzers: Vec<Box<dyn SignalAnalyzer>> =
            vec![Box::new(FixedAnalyzer(7)), Box::new(FixedAnalyzer(0))];
        let req = ThreatRequest::new("GET", "/", "127.0.0.1");
        let ctx = RequestContext::anonymous();

        let first = analyzers[0].analyze(&req, &ctx, t0()).await.unwrap();
        assert_eq!(first.contribution(), 14);
        assert!(analyzers[1].analyze(&req, &ctx, t0()).await.is_err());
    }
}
