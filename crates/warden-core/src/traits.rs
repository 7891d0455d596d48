//! Collaborator trait definitions.
//!
//! These traits are the seams between WARDEN and the outside world:
//!
//! - `AuditStore`: durable, append-only entry store
//! - `Encryptor`: opaque payload sealing capability
//! - `GeoResolver`: network origin to coarse location
//! - `SignalAnalyzer`: one independent risk detector
//! - `ActionPolicy`: risk score to action mapping
//!
//! The ledger and engine only ever talk to collaborators through these
//! traits, so any concrete store or resolver is pluggable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warden_contracts::{
    audit::{AuditEntry, AuditEntryId, AuditQuery},
    error::WardenResult,
    threat::{AnalyzerOutcome, GeoLocation, RequestContext, ThreatAction, ThreatRequest},
};

/// The durable audit store.
///
/// Implementations must treat `append` as all-or-nothing: either the whole
/// batch is persisted or none of it is, so the ledger can safely retry.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a batch of chained entries, in sequence order.
    async fn append(&self, batch: &[AuditEntry]) -> WardenResult<()>;

    /// Every persisted entry matching `query`, ordered by sequence number.
    ///
    /// Paging (`limit`/`offset`) is applied by the caller, not the store.
    async fn range_query(&self, query: &AuditQuery) -> WardenResult<Vec<AuditEntry>>;

    /// Number of persisted entries with `start <= timestamp < end`.
    async fn count_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WardenResult<usize>;

    /// Point lookup by entry ID.
    async fn get(&self, id: &AuditEntryId) -> WardenResult<Option<AuditEntry>>;
}

/// Seals sensitive payloads before they are hashed and buffered.
///
/// Key custody lives entirely behind this trait.
pub trait Encryptor: Send + Sync {
    /// Encrypt `plaintext` and return the ciphertext.
    fn encrypt(&self, plaintext: &[u8]) -> WardenResult<Vec<u8>>;

    /// Identifier of the key in use, recorded next to the ciphertext.
    fn key_id(&self) -> &str;
}

/// Resolves a network origin to a coarse location.
///
/// Lookups may be slow; the engine wraps every call in a timeout.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// `Ok(None)` when the origin is unknown (e.g. a private address).
    async fn resolve(&self, origin: &str) -> WardenResult<Option<GeoLocation>>;
}

/// One independent risk detector.
///
/// Analyzers must not depend on each other's output: the engine runs them
/// concurrently and only the aggregation order of signals is affected.
#[async_trait]
pub trait SignalAnalyzer: Send + Sync {
    /// Stable name, used in degraded-signal details and logs.
    fn name(&self) -> &'static str;

    /// Inspect `request` and return whatever signals apply.
    ///
    /// `now` comes from the engine's clock so results are reproducible.
    async fn analyze(
        &self,
        request: &ThreatRequest,
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> WardenResult<AnalyzerOutcome>;
}

/// Maps a risk score to an action.
///
/// Implementations must be pure and deterministic.
pub trait ActionPolicy: Send + Sync {
    fn decide(&self, risk_score: u32, has_critical: bool) -> ThreatAction;
}
