//! In-memory implementation of `AuditStore`.
//!
//! `MemoryAuditStore` is the reference store used by tests and the demo. It
//! keeps persisted entries in a `Vec` behind an `RwLock` and supports fault
//! injection so the ledger's retry and unavailability paths can be
//! exercised deterministically:
//!
//! - `fail_next_appends(n)` rejects the next `n` appends
//! - `set_available(false)` makes every call fail with `StorageUnavailable`
//! - `rewrite(seq, edit)` alters a persisted entry in place, as an attacker
//!   with write access to the backing database would

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warden_contracts::{
    audit::{AuditEntry, AuditEntryId, AuditQuery},
    error::{WardenError, WardenResult},
};
use warden_core::traits::AuditStore;

/// An append-only store held entirely in memory.
#[derive(Debug)]
pub struct MemoryAuditStore {
    entries: RwLock<Vec<AuditEntry>>,
    available: AtomicBool,
    fail_next: AtomicU32,
    append_attempts: AtomicUsize,
    appends_succeeded: AtomicUsize,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            fail_next: AtomicU32::new(0),
            append_attempts: AtomicUsize::new(0),
            appends_succeeded: AtomicUsize::new(0),
        }
    }

    /// Reject the next `n` appends with a transient `FlushFailure`.
    pub fn fail_next_appends(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Simulate the store becoming unreachable (or reachable again).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `append` calls, successful or not.
    pub fn append_attempts(&self) -> usize {
        self.append_attempts.load(Ordering::SeqCst)
    }

    /// Number of `append` calls that persisted their batch.
    pub fn appends_succeeded(&self) -> usize {
        self.appends_succeeded.load(Ordering::SeqCst)
    }

    /// Apply `edit` to the persisted entry with `sequence_number`. Returns
    /// false if no such entry exists.
    pub fn rewrite(&self, sequence_number: u64, edit: impl FnOnce(&mut AuditEntry)) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.iter_mut().find(|e| e.sequence_number == sequence_number) {
            Some(entry) => {
                edit(entry);
                true
            }
            None => false,
        }
    }

    /// A copy of every persisted entry, in append order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> WardenResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(WardenError::StorageUnavailable {
                reason: "in-memory store marked unavailable".to_string(),
            })
        }
    }

    /// Consume one injected failure, if any remain.
    fn take_injected_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, batch: &[AuditEntry]) -> WardenResult<()> {
        self.append_attempts.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        if self.take_injected_failure() {
            return Err(WardenError::FlushFailure {
                reason: "injected transient append failure".to_string(),
            });
        }

        let mut entries = self.entries.write().map_err(|e| WardenError::FlushFailure {
            reason: format!("store lock poisoned: {}", e),
        })?;
        entries.extend_from_slice(batch);
        self.appends_succeeded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn range_query(&self, query: &AuditQuery) -> WardenResult<Vec<AuditEntry>> {
        self.ensure_available()?;
        let entries = self.entries.read().map_err(|e| WardenError::StorageUnavailable {
            reason: format!("store lock poisoned: {}", e),
        })?;
        let mut matched: Vec<AuditEntry> =
            entries.iter().filter(|e| query.matches(e)).cloned().collect();
        matched.sort_by_key(|e| e.sequence_number);
        Ok(matched)
    }

    async fn count_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WardenResult<usize> {
        self.ensure_available()?;
        let entries = self.entries.read().map_err(|e| WardenError::StorageUnavailable {
            reason: format!("store lock poisoned: {}", e),
        })?;
        Ok(entries
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp < end)
            .count())
    }

    async fn get(&self, id: &AuditEntryId) -> WardenResult<Option<AuditEntry>> {
        self.ensure_available()?;
        let entries = self.entries.read().map_err(|e| WardenError::StorageUnavailable {
            reason: format!("store lock poisoned: {}", e),
        })?;
        Ok(entries.iter().find(|e| &e.id == id).cloned())
    }
}
