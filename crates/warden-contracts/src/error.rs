//! Error taxonomy for the WARDEN ledger and threat engine.
//!
//! All fallible operations return `WardenResult<T>`. Variants carry enough
//! context to be written into a security event when they escalate.

use thiserror::Error;

/// The unified error type for WARDEN.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Hash chain verification failed.
    ///
    /// Always escalated to a critical security event; never corrected.
    #[error("audit chain integrity violation: {reason}")]
    IntegrityViolation { reason: String },

    /// The storage collaborator rejected a batch. The batch stays buffered.
    #[error("audit flush failed: {reason}")]
    FlushFailure { reason: String },

    /// The encryptor could not seal an entry payload.
    ///
    /// Non-fatal for audit continuity: the ledger stores the entry with an
    /// `encryption_failed` compliance flag instead.
    #[error("encryption failed: {reason}")]
    EncryptionFailure { reason: String },

    /// A signal analyzer exceeded its time budget.
    #[error("analyzer '{analyzer}' timed out after {timeout_ms} ms")]
    AnalyzerTimeout { analyzer: String, timeout_ms: u64 },

    /// Query parameters are malformed.
    #[error("invalid query criteria: {reason}")]
    InvalidQueryCriteria { reason: String },

    /// The backing store cannot be reached.
    #[error("storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    /// A point lookup found nothing.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// A value could not be serialized for hashing or encryption.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// A service was started twice, or used after `stop()`.
    #[error("lifecycle error: {reason}")]
    LifecycleError { reason: String },
}

/// Convenience alias used throughout the WARDEN crates.
pub type WardenResult<T> = Result<T, WardenError>;
