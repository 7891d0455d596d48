//! Ledger notifications and statistics.
//!
//! Notifications are fanned out over a bounded `tokio::sync::broadcast`
//! channel. Slow subscribers lag and lose old notifications; the ledger
//! itself never blocks on them.

use serde::{Deserialize, Serialize};

use warden_contracts::audit::{AuditEntryId, EventType};

/// Something the ledger wants observers to know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerNotification {
    /// A new entry was sealed and buffered.
    EntryCreated {
        id: AuditEntryId,
        sequence_number: u64,
        event_type: EventType,
    },

    /// A batch reached the durable store.
    BatchFlushed { entries: usize, last_sequence: u64 },

    /// A batch was rejected and returned to the buffer.
    FlushFailed {
        entries: usize,
        consecutive_failures: u32,
        reason: String,
    },

    /// Consecutive flush failures reached the alert threshold.
    FlushAlert { consecutive_failures: u32 },

    /// Chain verification failed.
    IntegrityViolation {
        corrupted_entries: usize,
        missing_sequences: usize,
    },

    /// The retention sweep dropped persisted entries from memory.
    RetentionPurged { entries: usize, anchor_hash: Option<String> },
}

/// Point-in-time counters for operators and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// The sequence number the next entry will receive.
    pub next_sequence: u64,
    /// Entries sealed but not yet persisted.
    pub pending: usize,
    /// Persisted entries still held in the working chain.
    pub chained: usize,
    /// Successful store appends since construction.
    pub batches_flushed: u64,
    pub consecutive_flush_failures: u32,
    /// `hash` of the newest entry; a compact commitment to the whole chain.
    pub tail_hash: Option<String>,
    /// `hash` of the last entry removed by retention, if any.
    pub anchor_hash: Option<String>,
}
