//! Wiring shared by every scenario.
//!
//! A `ClinicRuntime` is one deployment of WARDEN for the fictional clinic:
//! an audit ledger over an in-memory store, sealing PHI with the demo
//! encryptor, and a threat engine that records its verdicts in that ledger.
//! Time is a `ManualClock` so the scenarios can fast-forward.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tracing::info;

use warden_audit::{AuditLedger, MemoryAuditStore};
use warden_contracts::{
    audit::AuditContext,
    config::WardenConfig,
    error::{WardenError, WardenResult},
};
use warden_core::clock::{Clock, ManualClock};
use warden_policy::load_config_str;
use warden_threat::ThreatEngine;

use crate::mock_data::{clinic_geo_resolver, DemoEncryptor};

/// Embedded clinic configuration.
pub const CLINIC_CONFIG: &str = include_str!("../config/clinic.toml");

/// Audit source tag for the clinic's own application code.
pub const PORTAL_SOURCE: &str = "patient-portal";

pub struct ClinicRuntime {
    pub config: WardenConfig,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryAuditStore>,
    pub ledger: Arc<AuditLedger>,
    pub engine: ThreatEngine,
}

impl ClinicRuntime {
    /// Build the runtime from the embedded configuration, starting at
    /// 09:00 UTC on a fixed clinic day.
    pub fn new() -> WardenResult<Self> {
        let config = load_config_str(CLINIC_CONFIG)?;
        Self::with_config(config, clinic_day_start()?)
    }

    pub fn with_config(config: WardenConfig, start: DateTime<Utc>) -> WardenResult<Self> {
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryAuditStore::new());

        let ledger = Arc::new(
            AuditLedger::new(config.ledger.clone(), store.clone())
                .with_encryptor(Arc::new(DemoEncryptor::new("clinic-kms-1", "northside-demo-key")))
                .with_clock(clock.clone()),
        );

        let engine = ThreatEngine::builder(config.threat.clone())
            .with_clock(clock.clone())
            .with_geo_resolver(Arc::new(clinic_geo_resolver()))
            .with_ledger(ledger.clone())
            .build()?;

        Ok(Self {
            config,
            clock,
            store,
            ledger,
            engine,
        })
    }

    /// Audit context for a staff member working from `origin`.
    pub fn staff_context(actor_id: &str, origin: &str) -> AuditContext {
        AuditContext::new(PORTAL_SOURCE)
            .with_actor(actor_id)
            .with_origin(origin)
    }

    pub fn start(&self) -> WardenResult<()> {
        self.ledger.start()?;
        self.engine.start()?;
        info!(at = %self.clock.now(), "clinic runtime started");
        Ok(())
    }

    /// Stop the engine, then the ledger, which flushes what is left.
    pub async fn stop(&self) -> WardenResult<()> {
        self.engine.stop().await?;
        self.ledger.stop().await?;
        let stats = self.ledger.stats();
        info!(
            persisted = self.store.len(),
            next_sequence = stats.next_sequence,
            "clinic runtime stopped"
        );
        Ok(())
    }
}

fn clinic_day_start() -> WardenResult<DateTime<Utc>> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .ok_or_else(|| WardenError::ConfigError {
            reason: "invalid clinic start time".to_string(),
        })
}
