//! The audit ledger service.
//!
//! `AuditLedger` owns the hash chain. Callers hand it events through
//! `log_event` (or one of the typed convenience forms) and get an entry ID
//! back immediately; persistence happens in the background.
//!
//! Entry lifecycle:
//!
//!   log_event → sanitize → seal → [critical section: sequence, link, hash]
//!             → pending buffer → flush → working chain → retention purge
//!
//! The critical section is a single `std::sync::Mutex` around `ChainState`,
//! so no two entries share a sequence number and `previous_hash` is never
//! computed from a stale tail. Flushes are serialized by an async gate so
//! batches reach the store in sequence order.
//!
//! Background tasks (started by `start()`, stopped by `stop()`):
//!
//! - flusher: whole batches when the buffer reaches `batch_size`, the whole
//!   buffer for a priority entry and every `flush_interval_ms`
//! - integrity monitor: every `integrity_check_interval_secs`, over the
//!   durable store plus the pending tail
//! - retention sweeper: every `retention_sweep_interval_secs`

use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use warden_contracts::{
    audit::{
        AuditContext, AuditEntry, AuditEntryId, AuditPage, AuditQuery, AuditReport, EventData,
        EventType, Priority, VerificationResult,
    },
    config::LedgerConfig,
    error::{WardenError, WardenResult},
    threat::Severity,
};
use warden_core::{
    clock::{Clock, SystemClock},
    traits::{AuditStore, Encryptor},
};

use crate::{
    chain::{compute_hash, verify_chain},
    event::{LedgerNotification, LedgerStats},
    report::{paginate, summarize, validate_query},
    sanitize::sanitize_event_data,
    seal::seal_payload,
};

/// Source tag used for entries the ledger writes about itself.
pub const LEDGER_SOURCE: &str = "audit-ledger";

// ── Internal mutable state ────────────────────────────────────────────────────

/// How much of the buffer a flush takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushMode {
    /// Only complete `batch_size` chunks; a partial tail stays buffered.
    WholeBatches,
    /// Everything pending, the last batch possibly short.
    Drain,
}

/// Everything guarded by the single-writer lock.
pub(crate) struct ChainState {
    /// Sequence number for the next entry (starts at 1).
    pub(crate) next_sequence: u64,

    /// `hash` of the newest entry, pending or persisted.
    pub(crate) tail_hash: Option<String>,

    /// Sealed entries awaiting a flush, oldest first.
    pub(crate) pending: VecDeque<AuditEntry>,

    /// Persisted entries still held in memory, oldest first.
    pub(crate) chained: VecDeque<AuditEntry>,

    /// `hash` of the last entry dropped by retention; the expected
    /// `previous_hash` of `chained[0]`. `None` while the chain still starts
    /// at genesis.
    pub(crate) anchor: Option<String>,
}

pub(crate) struct LedgerShared {
    config: LedgerConfig,
    store: Arc<dyn AuditStore>,
    encryptor: Option<Arc<dyn Encryptor>>,
    clock: Arc<dyn Clock>,
    pub(crate) state: Mutex<ChainState>,
    flush_gate: tokio::sync::Mutex<()>,
    flush_wanted: Notify,
    /// Set by priority entries so the next wake-up drains the buffer.
    drain_wanted: AtomicBool,
    notifications: broadcast::Sender<LedgerNotification>,
    consecutive_failures: AtomicU32,
    batches_flushed: AtomicU64,
}

struct LedgerTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

// ── Public ledger ─────────────────────────────────────────────────────────────

/// A buffered, append-only audit ledger backed by a SHA-256 hash chain.
///
/// # Thread safety
///
/// `AuditLedger` is meant to be shared behind an `Arc` by every request
/// handler. `log_event` holds the chain lock only long enough to link one
/// entry and never awaits.
///
/// ```rust,ignore
/// let ledger = Arc::new(AuditLedger::new(config.ledger, store).with_encryptor(enc));
/// ledger.start()?;
/// let id = ledger.log_event(EventType::DataAccess, data, ctx);
/// ledger.stop().await?;
/// ```
pub struct AuditLedger {
    pub(crate) shared: Arc<LedgerShared>,
    tasks: Mutex<Option<LedgerTasks>>,
}

impl AuditLedger {
    /// Create a ledger writing to `store`, using the system clock and no
    /// encryption.
    pub fn new(config: LedgerConfig, store: Arc<dyn AuditStore>) -> Self {
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
        let shared = LedgerShared {
            config,
            store,
            encryptor: None,
            clock: Arc::new(SystemClock),
            state: Mutex::new(ChainState {
                next_sequence: 1,
                tail_hash: None,
                pending: VecDeque::new(),
                chained: VecDeque::new(),
                anchor: None,
            }),
            flush_gate: tokio::sync::Mutex::new(()),
            flush_wanted: Notify::new(),
            drain_wanted: AtomicBool::new(false),
            notifications,
            consecutive_failures: AtomicU32::new(0),
            batches_flushed: AtomicU64::new(0),
        };
        Self {
            shared: Arc::new(shared),
            tasks: Mutex::new(None),
        }
    }

    /// Seal sensitive payloads with `encryptor`.
    ///
    /// Must be called before the ledger is shared.
    pub fn with_encryptor(self, encryptor: Arc<dyn Encryptor>) -> Self {
        self.rebuild(|shared| shared.encryptor = Some(encryptor))
    }

    /// Read time from `clock` instead of the system clock.
    ///
    /// Must be called before the ledger is shared.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        self.rebuild(|shared| shared.clock = clock)
    }

    fn rebuild(mut self, apply: impl FnOnce(&mut LedgerShared)) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => apply(shared),
            None => warn!("ledger already shared; builder option ignored"),
        }
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.shared.config
    }

    /// Subscribe to ledger notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerNotification> {
        self.shared.notifications.subscribe()
    }

    // ── Logging ───────────────────────────────────────────────────────────────

    /// Append one event to the chain and return its ID.
    ///
    /// Never fails and never waits on I/O. The payload is sanitized, sealed
    /// if its type is sensitive, linked to the current tail and buffered.
    /// Security, compliance and PHI events, and any context with
    /// `Priority::High`, request an immediate flush.
    pub fn log_event(
        &self,
        event_type: EventType,
        event_data: EventData,
        context: AuditContext,
    ) -> AuditEntryId {
        self.shared.log_event(event_type, event_data, context)
    }

    /// Record a login attempt.
    pub fn log_authentication(
        &self,
        actor_id: &str,
        success: bool,
        method: &str,
        context: AuditContext,
    ) -> AuditEntryId {
        let data = EventData::new()
            .with("actor_id", actor_id)
            .with("success", success)
            .with("method", method)
            .with("outcome", if success { "success" } else { "failure" });
        let context = if context.actor_id.is_none() {
            context.with_actor(actor_id)
        } else {
            context
        };
        self.log_event(EventType::Authentication, data, context)
    }

    /// Record access to protected health information.
    pub fn log_phi_access(
        &self,
        patient_id: &str,
        resource_id: &str,
        purpose: &str,
        fields: &[&str],
        context: AuditContext,
    ) -> AuditEntryId {
        let data = EventData::new()
            .with("patient_id", patient_id)
            .with(EventData::RESOURCE_ID, resource_id)
            .with("purpose", purpose)
            .with("fields", fields.iter().map(|f| Value::from(*f)).collect::<Vec<_>>());
        self.log_event(EventType::PhiAccess, data, context)
    }

    /// Record a create/update/delete on a resource.
    pub fn log_data_modification(
        &self,
        resource_id: &str,
        operation: &str,
        changes: EventData,
        context: AuditContext,
    ) -> AuditEntryId {
        let data = EventData::new()
            .with(EventData::RESOURCE_ID, resource_id)
            .with("operation", operation)
            .with("changes", Value::Object(changes.into_inner().into_iter().collect()));
        self.log_event(EventType::DataModification, data, context)
    }

    /// Record a configuration change.
    pub fn log_configuration_change(
        &self,
        setting: &str,
        old_value: Value,
        new_value: Value,
        context: AuditContext,
    ) -> AuditEntryId {
        let data = EventData::new()
            .with("setting", setting)
            .with("old_value", old_value)
            .with("new_value", new_value);
        self.log_event(EventType::ConfigurationChange, data, context)
    }

    /// Record a security event. High and critical events are flushed
    /// immediately, like every security event, and also marked high priority.
    pub fn log_security_event(
        &self,
        severity: Severity,
        description: &str,
        details: EventData,
        context: AuditContext,
    ) -> AuditEntryId {
        let mut data = details;
        data.insert("severity", severity.as_str());
        data.insert("description", description);
        let context = if severity >= Severity::High {
            context.with_priority(Priority::High)
        } else {
            context
        };
        self.log_event(EventType::SecurityEvent, data, context)
    }

    // ── Flushing ──────────────────────────────────────────────────────────────

    /// Persist every pending entry, one batch of `batch_size` at a time.
    ///
    /// Returns the number of entries persisted. Stops at the first failed
    /// batch, which goes back to the front of the buffer, and returns
    /// `WardenError::FlushFailure`; earlier batches of the same call stay
    /// persisted.
    pub async fn flush(&self) -> WardenResult<usize> {
        self.shared.flush_pending(FlushMode::Drain).await
    }

    // ── Integrity ─────────────────────────────────────────────────────────────

    /// Verify the chain: every entry in the durable store, then the pending
    /// tail.
    ///
    /// If the store cannot be read, the in-memory working chain is verified
    /// against the retention anchor instead. With `range`, only entries
    /// whose sequence number falls inside it are walked, anchored to the
    /// entry just before the range. Read-only: the result is returned, not
    /// escalated. See `run_integrity_check`.
    pub async fn verify_audit_integrity(
        &self,
        range: Option<RangeInclusive<u64>>,
    ) -> VerificationResult {
        self.shared.verify(range).await
    }

    /// Verify the full chain and escalate any failure as a critical
    /// security event, which is itself flushed immediately.
    pub async fn run_integrity_check(&self) -> VerificationResult {
        self.shared.run_integrity_check().await
    }

    // ── Retention ─────────────────────────────────────────────────────────────

    /// Drop persisted entries older than the retention window from memory.
    ///
    /// Only the oldest end of the working chain is trimmed, and never past
    /// an entry that is still pending. Returns the number of entries dropped.
    pub fn purge_expired(&self) -> usize {
        self.shared.purge_expired()
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Page through persisted entries matching `criteria`.
    ///
    /// No match is an empty page, not an error. Fails with
    /// `InvalidQueryCriteria` for malformed criteria and `StorageUnavailable`
    /// when the store cannot be reached.
    pub async fn query_audit_trail(&self, criteria: &AuditQuery) -> WardenResult<AuditPage> {
        validate_query(criteria, self.shared.config.max_query_limit)?;
        let matched = self.shared.store.range_query(criteria).await?;
        debug!(total = matched.len(), "audit trail query");
        Ok(paginate(matched, criteria.limit, criteria.offset))
    }

    /// Fetch a single persisted entry.
    pub async fn get_entry(&self, id: &AuditEntryId) -> WardenResult<AuditEntry> {
        self.shared
            .store
            .get(id)
            .await?
            .ok_or_else(|| WardenError::NotFound {
                what: format!("audit entry {}", id),
            })
    }

    /// Build a compliance report: a summary over every match, the requested
    /// page of events, and the integrity status of the whole chain.
    pub async fn generate_audit_report(&self, criteria: &AuditQuery) -> WardenResult<AuditReport> {
        validate_query(criteria, self.shared.config.max_query_limit)?;
        let matched = self.shared.store.range_query(criteria).await?;
        let summary = summarize(&matched);
        let page = paginate(matched, criteria.limit, criteria.offset);
        let integrity = self.shared.verify(None).await;

        info!(
            total_events = summary.total_events,
            verified = integrity.verified,
            "audit report generated"
        );

        Ok(AuditReport {
            generated_at: self.shared.clock.now(),
            criteria: criteria.clone(),
            summary,
            events: page.results,
            integrity,
        })
    }

    /// Persisted entries with `start <= timestamp < end`, counted by the store.
    pub async fn count_by_time_range(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> WardenResult<usize> {
        if start > end {
            return Err(WardenError::InvalidQueryCriteria {
                reason: format!("start ({}) is after end ({})", start, end),
            });
        }
        self.shared.store.count_by_time_range(start, end).await
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    pub fn stats(&self) -> LedgerStats {
        let state = self.shared.lock_state();
        LedgerStats {
            next_sequence: state.next_sequence,
            pending: state.pending.len(),
            chained: state.chained.len(),
            batches_flushed: self.shared.batches_flushed.load(Ordering::SeqCst),
            consecutive_flush_failures: self.shared.consecutive_failures.load(Ordering::SeqCst),
            tail_hash: state.tail_hash.clone(),
            anchor_hash: state.anchor.clone(),
        }
    }

    /// A copy of the working chain: persisted entries, then pending ones.
    pub fn entries(&self) -> Vec<AuditEntry> {
        let state = self.shared.lock_state();
        state.chained.iter().chain(state.pending.iter()).cloned().collect()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Spawn the flusher, integrity monitor and retention sweeper.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// `LifecycleError` if the ledger is already running.
    pub fn start(&self) -> WardenResult<()> {
        let mut tasks = self.tasks.lock().map_err(|e| WardenError::LifecycleError {
            reason: format!("ledger task lock poisoned: {}", e),
        })?;
        if tasks.is_some() {
            return Err(WardenError::LifecycleError {
                reason: "audit ledger already started".to_string(),
            });
        }

        let cancel = CancellationToken::new();
        let handles = vec![
            spawn_flusher(Arc::clone(&self.shared), cancel.clone()),
            spawn_integrity_monitor(Arc::clone(&self.shared), cancel.clone()),
            spawn_retention_sweeper(Arc::clone(&self.shared), cancel.clone()),
        ];
        *tasks = Some(LedgerTasks { cancel, handles });

        info!(
            batch_size = self.shared.config.batch_size,
            flush_interval_ms = self.shared.config.flush_interval_ms,
            "audit ledger started"
        );
        Ok(())
    }

    /// Stop background tasks and flush everything still buffered.
    ///
    /// Returns `FlushFailure` if the final flush could not drain the buffer;
    /// the entries remain pending and a later `flush()` may still persist
    /// them. Calling `stop` on a ledger that was never started just flushes.
    pub async fn stop(&self) -> WardenResult<()> {
        let tasks = self
            .tasks
            .lock()
            .map_err(|e| WardenError::LifecycleError {
                reason: format!("ledger task lock poisoned: {}", e),
            })?
            .take();

        if let Some(tasks) = tasks {
            tasks.cancel.cancel();
            for handle in tasks.handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "ledger background task ended abnormally");
                }
            }
        }

        self.shared.flush_pending(FlushMode::Drain).await?;

        let state = self.shared.lock_state();
        info!(
            next_sequence = state.next_sequence,
            chained = state.chained.len(),
            tail_hash = ?state.tail_hash,
            "audit ledger stopped"
        );
        Ok(())
    }
}

impl Drop for AuditLedger {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(tasks) = tasks.take() {
                tasks.cancel.cancel();
            }
        }
        let pending = self.shared.lock_state().pending.len();
        if pending > 0 {
            error!(pending, "audit ledger dropped with unflushed entries; call stop() first");
        }
    }
}

// ── Shared internals ──────────────────────────────────────────────────────────

impl LedgerShared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ChainState> {
        // A panic while holding the lock cannot leave the chain half-linked:
        // every mutation is a single push or pop. Keep going.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, notification: LedgerNotification) {
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }

    fn log_event(
        &self,
        event_type: EventType,
        mut event_data: EventData,
        context: AuditContext,
    ) -> AuditEntryId {
        let redacted = sanitize_event_data(&mut event_data);
        let sealed = seal_payload(self.encryptor.as_deref(), event_type, event_data);
        let immediate = event_type.requires_immediate_flush() || context.priority == Priority::High;
        let id = AuditEntryId::new();

        let (sequence_number, pending) = {
            let mut state = self.lock_state();
            let sequence_number = state.next_sequence;
            let mut entry = AuditEntry {
                id,
                sequence_number,
                timestamp: self.clock.now(),
                event_type,
                event_data: sealed.event_data,
                context,
                previous_hash: state.tail_hash.clone(),
                hash: String::new(),
                encrypted: sealed.encrypted,
                compliance_flags: sealed.compliance_flags,
            };
            entry.hash = compute_hash(&entry);

            state.tail_hash = Some(entry.hash.clone());
            state.next_sequence += 1;
            state.pending.push_back(entry);
            (sequence_number, state.pending.len())
        };

        debug!(
            entry_id = %id,
            sequence_number,
            event_type = %event_type,
            redacted,
            pending,
            "audit entry created"
        );

        if immediate {
            self.drain_wanted.store(true, Ordering::SeqCst);
            self.flush_wanted.notify_one();
        } else if pending >= self.config.batch_size {
            self.flush_wanted.notify_one();
        }

        self.notify(LedgerNotification::EntryCreated {
            id,
            sequence_number,
            event_type,
        });

        id
    }

    async fn flush_pending(&self, mode: FlushMode) -> WardenResult<usize> {
        let _gate = self.flush_gate.lock().await;
        let batch_size = self.config.batch_size.max(1);
        let mut flushed = 0;

        loop {
            let batch: Vec<AuditEntry> = {
                let mut state = self.lock_state();
                let n = state.pending.len().min(batch_size);
                if n == 0 || (mode == FlushMode::WholeBatches && n < batch_size) {
                    break;
                }
                state.pending.drain(..n).collect()
            };
            let count = batch.len();
            let last_sequence = batch.last().map_or(0, |e| e.sequence_number);

            match self.store.append(&batch).await {
                Ok(()) => {
                    self.lock_state().chained.extend(batch);
                    flushed += count;
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                    self.batches_flushed.fetch_add(1, Ordering::SeqCst);
                    debug!(entries = count, last_sequence, "audit batch flushed");
                    self.notify(LedgerNotification::BatchFlushed {
                        entries: count,
                        last_sequence,
                    });
                }
                Err(e) => {
                    {
                        let mut state = self.lock_state();
                        for entry in batch.into_iter().rev() {
                            state.pending.push_front(entry);
                        }
                    }
                    let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                    warn!(
                        entries = count,
                        consecutive_failures = failures,
                        error = %e,
                        "audit flush failed; batch returned to buffer"
                    );
                    self.notify(LedgerNotification::FlushFailed {
                        entries: count,
                        consecutive_failures: failures,
                        reason: e.to_string(),
                    });
                    if failures >= self.config.flush_failure_alert_threshold {
                        error!(
                            consecutive_failures = failures,
                            "audit flush failing repeatedly; entries are buffered, not lost"
                        );
                        self.notify(LedgerNotification::FlushAlert {
                            consecutive_failures: failures,
                        });
                    }
                    return Err(WardenError::FlushFailure {
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(flushed)
    }

    async fn verify(&self, range: Option<RangeInclusive<u64>>) -> VerificationResult {
        // Holding the gate keeps a batch from landing in the store between
        // the store read and the pending snapshot.
        let (snapshot, anchor) = {
            let _gate = self.flush_gate.lock().await;
            let durable = self.store.range_query(&AuditQuery::default()).await;
            let state = self.lock_state();
            let (mut snapshot, anchor) = match durable {
                Ok(entries) => (entries, None),
                Err(e) => {
                    warn!(error = %e, "audit store unreadable; verifying the in-memory chain");
                    (state.chained.iter().cloned().collect(), state.anchor.clone())
                }
            };
            snapshot.extend(state.pending.iter().cloned());
            (snapshot, anchor)
        };

        let Some(range) = range else {
            return verify_chain(&snapshot, anchor.as_deref());
        };

        let start = snapshot
            .iter()
            .position(|e| range.contains(&e.sequence_number))
            .unwrap_or(snapshot.len());
        let end = snapshot[start..]
            .iter()
            .position(|e| !range.contains(&e.sequence_number))
            .map_or(snapshot.len(), |offset| start + offset);

        let expected_start = if start == 0 {
            anchor
        } else {
            Some(snapshot[start - 1].hash.clone())
        };

        verify_chain(&snapshot[start..end], expected_start.as_deref())
    }

    async fn run_integrity_check(&self) -> VerificationResult {
        let result = self.verify(None).await;
        if result.verified {
            debug!(entries = result.entries_checked, "audit chain verified");
            return result;
        }

        let corrupted: Vec<u64> = result.corrupted.iter().map(|c| c.sequence_number).collect();
        error!(
            corrupted = ?corrupted,
            missing = result.missing_sequences.len(),
            duplicates = result.duplicate_sequences.len(),
            "audit chain integrity violation"
        );
        self.notify(LedgerNotification::IntegrityViolation {
            corrupted_entries: result.corrupted.len(),
            missing_sequences: result.missing_sequences.len(),
        });

        let details = EventData::new()
            .with("severity", Severity::Critical.as_str())
            .with("description", "audit chain integrity violation")
            .with("violation", "audit_integrity")
            .with("entries_checked", result.entries_checked as u64)
            .with("corrupted_sequences", json!(corrupted))
            .with("missing_sequences", result.missing_sequences.len() as u64)
            .with("duplicate_sequences", json!(result.duplicate_sequences));
        self.log_event(
            EventType::SecurityEvent,
            details,
            AuditContext::new(LEDGER_SOURCE).with_priority(Priority::High),
        );

        result
    }

    fn purge_expired(&self) -> usize {
        let retention = ChronoDuration::days(i64::from(self.config.retention_days));
        let cutoff = self.clock.now() - retention;

        let (purged, anchor) = {
            let mut state = self.lock_state();
            let mut purged = 0;
            while state.chained.front().is_some_and(|e| e.timestamp < cutoff) {
                if let Some(old) = state.chained.pop_front() {
                    state.anchor = Some(old.hash);
                    purged += 1;
                }
            }
            (purged, state.anchor.clone())
        };

        if purged > 0 {
            info!(purged, cutoff = %cutoff, "retention sweep removed expired entries from memory");
            self.notify(LedgerNotification::RetentionPurged {
                entries: purged,
                anchor_hash: anchor,
            });
        }
        purged
    }
}

// ── Background tasks ──────────────────────────────────────────────────────────

fn periodic(period: Duration) -> tokio::time::Interval {
    // The first tick fires one period from now, not immediately.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn spawn_flusher(shared: Arc<LedgerShared>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = periodic(shared.config.flush_interval());
        loop {
            let mode = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = shared.flush_wanted.notified() => {
                    if shared.drain_wanted.swap(false, Ordering::SeqCst) {
                        FlushMode::Drain
                    } else {
                        FlushMode::WholeBatches
                    }
                }
                _ = ticker.tick() => FlushMode::Drain,
            };
            // Failures are logged and retried on the next cycle.
            let _ = shared.flush_pending(mode).await;
        }
        debug!("ledger flusher stopped");
    })
}

fn spawn_integrity_monitor(shared: Arc<LedgerShared>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = periodic(shared.config.integrity_check_interval());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    shared.run_integrity_check().await;
                }
            }
        }
        debug!("ledger integrity monitor stopped");
    })
}

fn spawn_retention_sweeper(shared: Arc<LedgerShared>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = periodic(shared.config.retention_sweep_interval());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    shared.purge_expired();
                }
            }
        }
        debug!("ledger retention sweeper stopped");
    })
}
