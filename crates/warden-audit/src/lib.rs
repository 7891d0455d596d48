//! # warden-audit
//!
//! Buffered, append-only, SHA-256 hash-chained audit ledger for WARDEN.
//!
//! ## Overview
//!
//! Every audited event becomes an `AuditEntry` carrying a gap-free sequence
//! number and the hash of the entry before it. Changing any stored field of
//! any entry breaks the chain and is reported by `verify_chain`, with the
//! position of each bad entry.
//!
//! Entries are sanitized (credentials and identifiers redacted), sealed by an
//! `Encryptor` when their type is sensitive, buffered, and persisted in
//! batches through an `AuditStore`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_audit::{AuditLedger, MemoryAuditStore};
//!
//! let store = Arc::new(MemoryAuditStore::new());
//! let ledger = AuditLedger::new(config.ledger, store.clone());
//! ledger.start()?;
//!
//! ledger.log_phi_access("patient-17", "chart-17", "treatment", &["dx"], ctx);
//!
//! ledger.stop().await?;
//! assert!(ledger.verify_audit_integrity(None).await.verified);
//! ```

pub mod chain;
pub mod event;
pub mod ledger;
pub mod memory;
pub mod report;
pub mod sanitize;
pub mod seal;

pub use chain::{compute_hash, verify_chain};
pub use event::{LedgerNotification, LedgerStats};
pub use ledger::AuditLedger;
pub use memory::MemoryAuditStore;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use serde_json::{json, Value};

    use warden_contracts::{
        audit::{AuditContext, AuditEntry, AuditQuery, ChainCheck, EventData, EventType},
        config::LedgerConfig,
        error::{WardenError, WardenResult},
        threat::Severity,
    };
    use warden_core::{clock::ManualClock, traits::Encryptor};

    use super::{
        compute_hash, sanitize::REDACTED, verify_chain, AuditLedger, LedgerNotification,
        MemoryAuditStore,
    };

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Reversible toy cipher; enough to tell sealed from clear payloads.
    struct XorEncryptor;

    impl Encryptor for XorEncryptor {
        fn encrypt(&self, plaintext: &[u8]) -> WardenResult<Vec<u8>> {
            Ok(plaintext.iter().map(|b| b ^ 0x5a).collect())
        }

        fn key_id(&self) -> &str {
            "test-key-1"
        }
    }

    struct BrokenEncryptor;

    impl Encryptor for BrokenEncryptor {
        fn encrypt(&self, _plaintext: &[u8]) -> WardenResult<Vec<u8>> {
            Err(WardenError::EncryptionFailure {
                reason: "HSM unreachable".to_string(),
            })
        }

        fn key_id(&self) -> &str {
            "hsm-key-9"
        }
    }

    fn config(batch_size: usize) -> LedgerConfig {
        LedgerConfig {
            batch_size,
            // Long enough that the timer never fires inside a test.
            flush_interval_ms: 3_600_000,
            ..LedgerConfig::default()
        }
    }

    fn ledger_with(batch_size: usize) -> (AuditLedger, Arc<MemoryAuditStore>) {
        let store = Arc::new(MemoryAuditStore::new());
        let ledger = AuditLedger::new(config(batch_size), store.clone());
        (ledger, store)
    }

    fn ctx(actor: &str) -> AuditContext {
        AuditContext::new("test").with_actor(actor).with_origin("10.0.0.1")
    }

    fn access(ledger: &AuditLedger, n: usize) {
        for i in 0..n {
            ledger.log_event(
                EventType::DataAccess,
                EventData::new()
                    .with(EventData::RESOURCE_ID, format!("record-{}", i))
                    .with("i", i as u64),
                ctx("dr-house"),
            );
        }
    }

    /// Poll until `check` holds or ~2s pass.
    async fn eventually(check: impl Fn() -> bool) -> bool {
        for _ in 0..400 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        check()
    }

    // ── Chain ─────────────────────────────────────────────────────────────────

    /// The same entry always hashes to the same 64-char lowercase hex digest.
    #[test]
    fn test_hash_deterministic() {
        let (ledger, _) = ledger_with(10);
        access(&ledger, 1);
        let entry = ledger.entries().remove(0);

        let a = compute_hash(&entry);
        let b = compute_hash(&entry.clone());
        assert_eq!(a, b);
        assert_eq!(a, entry.hash);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    /// The first entry is the genesis: sequence 1, no previous hash.
    #[test]
    fn test_genesis_entry() {
        let (ledger, _) = ledger_with(10);
        access(&ledger, 3);
        let entries = ledger.entries();

        assert!(entries[0].is_genesis());
        assert_eq!(entries[0].sequence_number, 1);
        assert_eq!(entries[0].previous_hash, None);
        assert_eq!(entries[1].previous_hash.as_deref(), Some(entries[0].hash.as_str()));
        assert_eq!(entries[2].previous_hash.as_deref(), Some(entries[1].hash.as_str()));
    }

    /// Changing any stored field of one entry is caught at that entry's index.
    #[test]
    fn test_tamper_any_field_detected() {
        let (ledger, _) = ledger_with(100);
        access(&ledger, 5);
        let pristine = ledger.entries();
        assert!(verify_chain(&pristine, None).verified);

        let tampers: Vec<(&str, Box<dyn Fn(&mut AuditEntry)>)> = vec![
            ("event_data", Box::new(|e: &mut AuditEntry| {
                e.event_data.insert("i", 999u64);
            })),
            ("timestamp", Box::new(|e: &mut AuditEntry| e.timestamp += ChronoDuration::seconds(1))),
            ("event_type", Box::new(|e: &mut AuditEntry| e.event_type = EventType::DataModification)),
            ("actor", Box::new(|e: &mut AuditEntry| e.context.actor_id = Some("mallory".to_string()))),
            ("encrypted", Box::new(|e: &mut AuditEntry| e.encrypted = true)),
            ("compliance_flags", Box::new(|e: &mut AuditEntry| e.compliance_flags.push("x".to_string()))),
            ("hash", Box::new(|e: &mut AuditEntry| e.hash = "0".repeat(64))),
        ];

        for (field, tamper) in tampers {
            let mut entries = pristine.clone();
            tamper(&mut entries[2]);
            let result = verify_chain(&entries, None);
            assert!(!result.verified, "tampering with {} must be detected", field);
            assert!(
                result.corrupted_indices().contains(&2),
                "tampering with {} must be reported at index 2, got {:?}",
                field,
                result.corrupted_indices()
            );
        }
    }

    /// A rewritten back-link is a linkage failure as well as a hash failure.
    #[test]
    fn test_tamper_previous_hash() {
        let (ledger, _) = ledger_with(100);
        access(&ledger, 4);
        let mut entries = ledger.entries();
        entries[1].previous_hash = Some("f".repeat(64));

        let result = verify_chain(&entries, None);
        assert!(!result.verified);
        let checks: Vec<ChainCheck> = result
            .corrupted
            .iter()
            .filter(|c| c.index == 1)
            .map(|c| c.check)
            .collect();
        assert!(checks.contains(&ChainCheck::PreviousHashMismatch));
        assert!(checks.contains(&ChainCheck::HashMismatch));
        // Later entries still link to the stored hash of entry 1.
        assert!(result.corrupted.iter().all(|c| c.index == 1));
    }

    /// Removing or repeating an entry shows up as a sequence problem.
    #[test]
    fn test_sequence_gaps_and_duplicates() {
        let (ledger, _) = ledger_with(100);
        access(&ledger, 6);
        let entries = ledger.entries();

        let mut gapped = entries.clone();
        gapped.remove(3);
        let result = verify_chain(&gapped, None);
        assert!(!result.verified);
        assert_eq!(result.missing_sequences, vec![4]);

        let mut duplicated = entries.clone();
        duplicated.insert(3, entries[2].clone());
        let result = verify_chain(&duplicated, None);
        assert!(!result.verified);
        assert_eq!(result.duplicate_sequences, vec![3]);
    }

    /// An empty chain is valid.
    #[test]
    fn test_verify_empty() {
        let result = verify_chain(&[], None);
        assert!(result.verified);
        assert_eq!(result.entries_checked, 0);
        assert_eq!(result.first_sequence, None);
    }

    /// Concurrent writers never share a sequence number or fork the chain.
    #[test]
    fn test_concurrent_logging_is_linear() {
        let (ledger, _) = ledger_with(10_000);
        let ledger = Arc::new(ledger);

        std::thread::scope(|s| {
            for t in 0..8 {
                let ledger = Arc::clone(&ledger);
                s.spawn(move || {
                    for i in 0..50u64 {
                        ledger.log_event(
                            EventType::DataAccess,
                            EventData::new().with("thread", t as u64).with("i", i),
                            ctx("worker"),
                        );
                    }
                });
            }
        });

        let entries = ledger.entries();
        assert_eq!(entries.len(), 400);
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequences, (1..=400).collect::<Vec<_>>());
        assert!(verify_chain(&entries, None).verified);
    }

    // ── Sanitizing and sealing ────────────────────────────────────────────────

    /// Credentials never reach the chain in clear.
    #[test]
    fn test_sensitive_keys_redacted() {
        let (ledger, _) = ledger_with(10);
        ledger.log_event(
            EventType::ConfigurationChange,
            EventData::new()
                .with("setting", "smtp")
                .with("smtp_password", "hunter2")
                .with("nested", json!({ "api_key": "abc", "ok": 1 })),
            ctx("admin"),
        );

        let entry = ledger.entries().remove(0);
        assert_eq!(entry.event_data.get_str("smtp_password"), Some(REDACTED));
        assert_eq!(entry.event_data.get("nested"), Some(&json!({ "api_key": REDACTED, "ok": 1 })));
        assert_eq!(entry.event_data.get_str("setting"), Some("smtp"));
    }

    /// Sensitive types are sealed; index keys stay queryable.
    #[test]
    fn test_phi_access_encrypted() {
        let store = Arc::new(MemoryAuditStore::new());
        let ledger = AuditLedger::new(config(10), store).with_encryptor(Arc::new(XorEncryptor));

        ledger.log_phi_access("patient-17", "chart-17", "treatment", &["diagnosis"], ctx("dr-grey"));
        ledger.log_event(EventType::DataAccess, EventData::new().with("x", 1u64), ctx("dr-grey"));

        let entries = ledger.entries();
        let phi = &entries[0];
        assert!(phi.encrypted);
        assert!(phi.compliance_flags.is_empty());
        assert!(phi.event_data.get_str("ciphertext").is_some());
        assert_eq!(phi.event_data.get_str("key_id"), Some("test-key-1"));
        assert_eq!(phi.resource_id(), Some("chart-17"));
        assert!(!phi.event_data.contains_key("patient_id"));

        // Non-sensitive types stay in clear.
        assert!(!entries[1].encrypted);
        assert_eq!(entries[1].event_data.get("x"), Some(&json!(1)));
        assert!(verify_chain(&entries, None).verified);
    }

    /// Encryption failure keeps the entry, in clear, flagged for remediation.
    #[test]
    fn test_encryption_failure_marked() {
        let store = Arc::new(MemoryAuditStore::new());
        let ledger =
            AuditLedger::new(config(10), store).with_encryptor(Arc::new(BrokenEncryptor));

        ledger.log_authentication("dr-grey", false, "password", AuditContext::new("test"));

        let entry = ledger.entries().remove(0);
        assert!(!entry.encrypted);
        assert_eq!(entry.event_data.get(AuditEntry::ENCRYPTION_FAILED), Some(&Value::Bool(true)));
        assert_eq!(entry.compliance_flags, vec![AuditEntry::ENCRYPTION_FAILED.to_string()]);
        assert_eq!(entry.event_data.get_str("actor_id"), Some("dr-grey"));
        assert_eq!(entry.context.actor_id.as_deref(), Some("dr-grey"));
        assert_eq!(ledger.stats().next_sequence, 2);
    }

    // ── Flushing ──────────────────────────────────────────────────────────────

    /// 1 000 events at batch size 100 are exactly 10 appends, and one
    /// transient failure loses nothing.
    #[tokio::test]
    async fn test_thousand_events_ten_batches_with_retry() {
        let (ledger, store) = ledger_with(100);
        access(&ledger, 1000);
        store.fail_next_appends(1);

        let first = ledger.flush().await;
        assert!(matches!(first, Err(WardenError::FlushFailure { .. })));
        assert_eq!(ledger.stats().pending, 1000);
        assert_eq!(ledger.stats().consecutive_flush_failures, 1);

        let flushed = ledger.flush().await.unwrap();
        assert_eq!(flushed, 1000);
        assert_eq!(store.append_attempts(), 11);
        assert_eq!(store.appends_succeeded(), 10);
        assert_eq!(store.len(), 1000);

        let stats = ledger.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.batches_flushed, 10);
        assert_eq!(stats.consecutive_flush_failures, 0);

        let persisted: Vec<u64> = store.entries().iter().map(|e| e.sequence_number).collect();
        assert_eq!(persisted, (1..=1000).collect::<Vec<_>>());
        assert!(verify_chain(&store.entries(), None).verified);

        let result = ledger.verify_audit_integrity(None).await;
        assert!(result.verified);
        assert_eq!(result.entries_checked, 1000);
    }

    /// A failure part-way keeps earlier batches persisted and the rest in order.
    #[tokio::test]
    async fn test_partial_flush_failure_preserves_order() {
        let (ledger, store) = ledger_with(10);
        access(&ledger, 25);

        ledger.flush().await.unwrap();
        access(&ledger, 5);
        store.set_available(false);
        assert!(ledger.flush().await.is_err());
        store.set_available(true);
        assert_eq!(ledger.flush().await.unwrap(), 5);

        let persisted: Vec<u64> = store.entries().iter().map(|e| e.sequence_number).collect();
        assert_eq!(persisted, (1..=30).collect::<Vec<_>>());
    }

    /// Security events are flushed right away; routine ones wait for the batch.
    #[tokio::test]
    async fn test_security_event_flushed_immediately() {
        let (ledger, store) = ledger_with(100);
        ledger.start().unwrap();

        access(&ledger, 3);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_empty(), "routine events must wait for a full batch");

        ledger.log_security_event(
            Severity::Critical,
            "SQL injection attempt",
            EventData::new().with("origin", "203.0.113.9"),
            AuditContext::new("threat-engine"),
        );
        assert!(eventually(|| store.len() == 4).await, "security event must trigger a flush");

        ledger.stop().await.unwrap();
    }

    /// Concurrent writers with the flusher running: every append is a whole
    /// batch, so 1 000 events at batch size 100 are exactly 10 appends.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_background_flusher_appends_whole_batches() {
        let (ledger, store) = ledger_with(100);
        let ledger = Arc::new(ledger);
        ledger.start().unwrap();

        let mut writers = Vec::new();
        for t in 0..10u64 {
            let ledger = Arc::clone(&ledger);
            writers.push(tokio::spawn(async move {
                for i in 0..100u64 {
                    ledger.log_event(
                        EventType::DataAccess,
                        EventData::new().with("writer", t).with("i", i),
                        ctx("worker"),
                    );
                    if i % 7 == 0 {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                }
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }
        ledger.stop().await.unwrap();

        assert_eq!(store.len(), 1000);
        assert_eq!(store.appends_succeeded(), 10);
        assert_eq!(ledger.stats().batches_flushed, 10);
        let persisted: Vec<u64> = store.entries().iter().map(|e| e.sequence_number).collect();
        assert_eq!(persisted, (1..=1000).collect::<Vec<_>>());
        assert!(ledger.verify_audit_integrity(None).await.verified);
    }

    /// A partial tail waits for the timer, which then flushes it.
    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_partial_batch() {
        let store = Arc::new(MemoryAuditStore::new());
        let cfg = LedgerConfig {
            flush_interval_ms: 5_000,
            ..config(100)
        };
        let ledger = AuditLedger::new(cfg, store.clone());
        ledger.start().unwrap();

        access(&ledger, 3);
        tokio::time::sleep(Duration::from_millis(4_000)).await;
        assert!(store.is_empty());

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(eventually(|| store.len() == 3).await, "timer must flush the tail");
        assert_eq!(store.appends_succeeded(), 1);

        ledger.stop().await.unwrap();
    }

    /// A full batch triggers a flush without waiting for the timer.
    #[tokio::test]
    async fn test_full_batch_triggers_flush() {
        let (ledger, store) = ledger_with(5);
        ledger.start().unwrap();
        access(&ledger, 5);
        assert!(eventually(|| store.len() == 5).await);
        ledger.stop().await.unwrap();
    }

    /// `stop` drains the buffer.
    #[tokio::test]
    async fn test_stop_flushes_pending() {
        let (ledger, store) = ledger_with(100);
        ledger.start().unwrap();
        access(&ledger, 7);
        ledger.stop().await.unwrap();

        assert_eq!(store.len(), 7);
        assert_eq!(ledger.stats().pending, 0);
    }

    /// When the store is down at shutdown the entries stay buffered.
    #[tokio::test]
    async fn test_stop_reports_unflushed_entries() {
        let (ledger, store) = ledger_with(100);
        access(&ledger, 3);
        store.set_available(false);

        assert!(matches!(ledger.stop().await, Err(WardenError::FlushFailure { .. })));
        assert_eq!(ledger.stats().pending, 3);

        store.set_available(true);
        assert_eq!(ledger.flush().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let (ledger, _) = ledger_with(10);
        ledger.start().unwrap();
        assert!(matches!(ledger.start(), Err(WardenError::LifecycleError { .. })));
        ledger.stop().await.unwrap();
    }

    /// Repeated failures raise an alert once the threshold is reached.
    #[tokio::test]
    async fn test_flush_failure_alert() {
        let (ledger, store) = ledger_with(10);
        let mut rx = ledger.subscribe();
        access(&ledger, 1);
        store.set_available(false);

        for _ in 0..ledger.config().flush_failure_alert_threshold {
            assert!(ledger.flush().await.is_err());
        }

        let mut alerts = 0;
        let mut failures = 0;
        while let Ok(n) = rx.try_recv() {
            match n {
                LedgerNotification::FlushFailed { .. } => failures += 1,
                LedgerNotification::FlushAlert { consecutive_failures } => {
                    assert_eq!(consecutive_failures, 3);
                    alerts += 1;
                }
                _ => {}
            }
        }
        assert_eq!(failures, 3);
        assert_eq!(alerts, 1);
    }

    // ── Integrity ─────────────────────────────────────────────────────────────

    /// A range check walks only the requested sequence numbers.
    #[tokio::test]
    async fn test_verify_range() {
        let (ledger, _) = ledger_with(100);
        access(&ledger, 10);
        ledger.flush().await.unwrap();

        let result = ledger.verify_audit_integrity(Some(4..=6)).await;
        assert!(result.verified);
        assert_eq!(result.entries_checked, 3);
        assert_eq!(result.first_sequence, Some(4));
        assert_eq!(result.last_sequence, Some(6));
    }

    /// An entry rewritten in the durable store is caught, and so are
    /// report integrity results.
    #[tokio::test]
    async fn test_store_tampering_detected() {
        let (ledger, store) = ledger_with(100);
        access(&ledger, 5);
        ledger.flush().await.unwrap();
        access(&ledger, 2);

        assert!(store.rewrite(2, |e| {
            e.event_data.insert("i", 999u64);
        }));

        let result = ledger.verify_audit_integrity(None).await;
        assert!(!result.verified);
        assert_eq!(result.entries_checked, 7);
        assert_eq!(result.corrupted_indices(), vec![1]);
        assert_eq!(result.corrupted[0].sequence_number, 2);

        let report = ledger.generate_audit_report(&AuditQuery::default()).await.unwrap();
        assert!(!report.integrity.verified);

        // A pending entry that no longer links to the durable tail is caught too.
        assert!(store.rewrite(5, |e| e.hash = "e".repeat(64)));
        let result = ledger.verify_audit_integrity(Some(6..=7)).await;
        assert!(!result.verified);
        assert_eq!(result.corrupted[0].sequence_number, 6);
        assert_eq!(result.corrupted[0].check, ChainCheck::PreviousHashMismatch);
    }

    /// Tampering found by the integrity check is escalated as a critical
    /// security event and broadcast.
    #[tokio::test]
    async fn test_integrity_violation_escalated() {
        let (ledger, store) = ledger_with(100);
        let mut rx = ledger.subscribe();
        access(&ledger, 5);
        ledger.flush().await.unwrap();

        store.rewrite(2, |e| {
            e.event_data.insert("i", 42u64);
        });

        let result = ledger.run_integrity_check().await;
        assert!(!result.verified);
        assert_eq!(result.corrupted_indices(), vec![1]);
        assert_eq!(result.corrupted[0].sequence_number, 2);

        let last = ledger.entries().pop().unwrap();
        assert_eq!(last.event_type, EventType::SecurityEvent);
        assert_eq!(last.event_data.get_str("severity"), Some("critical"));
        assert_eq!(last.event_data.get_str("violation"), Some("audit_integrity"));

        let mut saw_violation = false;
        while let Ok(n) = rx.try_recv() {
            if let LedgerNotification::IntegrityViolation { corrupted_entries, .. } = n {
                assert_eq!(corrupted_entries, 1);
                saw_violation = true;
            }
        }
        assert!(saw_violation);

        // The escalation itself is persisted.
        ledger.flush().await.unwrap();
        assert_eq!(store.len(), 6);
    }

    /// The scheduled monitor finds store tampering without being asked.
    #[tokio::test(start_paused = true)]
    async fn test_integrity_monitor_runs_on_schedule() {
        let store = Arc::new(MemoryAuditStore::new());
        let cfg = LedgerConfig {
            integrity_check_interval_secs: 60,
            ..config(100)
        };
        let ledger = AuditLedger::new(cfg, store.clone());
        let mut rx = ledger.subscribe();
        ledger.start().unwrap();

        access(&ledger, 5);
        ledger.flush().await.unwrap();
        store.rewrite(3, |e| e.context.actor_id = Some("mallory".to_string()));

        tokio::time::sleep(Duration::from_secs(61)).await;
        let escalated = || {
            store.entries().iter().any(|e| {
                e.event_type == EventType::SecurityEvent
                    && e.event_data.get_str("violation") == Some("audit_integrity")
            })
        };
        assert!(eventually(escalated).await, "monitor must escalate and flush");

        let mut saw_violation = false;
        while let Ok(n) = rx.try_recv() {
            if let LedgerNotification::IntegrityViolation { corrupted_entries, .. } = n {
                assert_eq!(corrupted_entries, 1);
                saw_violation = true;
            }
        }
        assert!(saw_violation);

        ledger.stop().await.unwrap();
    }

    // ── Retention ─────────────────────────────────────────────────────────────

    /// Purged entries leave an anchor; the remaining chain still verifies.
    #[tokio::test]
    async fn test_retention_purge_keeps_chain_verifiable() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryAuditStore::new());
        let cfg = LedgerConfig {
            retention_days: 30,
            ..config(100)
        };
        let ledger = AuditLedger::new(cfg, store.clone()).with_clock(clock.clone());

        access(&ledger, 3);
        ledger.flush().await.unwrap();
        clock.advance(ChronoDuration::days(31));
        access(&ledger, 2);

        // The two new entries are still pending and must survive.
        let purged = ledger.purge_expired();
        assert_eq!(purged, 3);

        let stats = ledger.stats();
        assert_eq!(stats.chained, 0);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.anchor_hash, Some(store.entries()[2].hash.clone()));

        // The durable history is still verified from genesis.
        let result = ledger.verify_audit_integrity(None).await;
        assert!(result.verified);
        assert_eq!(result.first_sequence, Some(1));
        assert_eq!(result.entries_checked, 5);

        // Without the store, the working chain verifies against the anchor.
        store.set_available(false);
        let result = ledger.verify_audit_integrity(None).await;
        assert!(result.verified, "chain must verify against the retention anchor");
        assert_eq!(result.first_sequence, Some(4));
        store.set_available(true);

        // The durable store is untouched by the in-memory sweep.
        assert_eq!(store.len(), 3);
        assert_eq!(ledger.purge_expired(), 0);
    }

    /// The sweeper task purges on its own schedule and says so.
    #[tokio::test(start_paused = true)]
    async fn test_retention_sweeper_runs_on_schedule() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryAuditStore::new());
        let cfg = LedgerConfig {
            retention_days: 30,
            retention_sweep_interval_secs: 600,
            ..config(100)
        };
        let ledger = AuditLedger::new(cfg, store.clone()).with_clock(clock.clone());
        let mut rx = ledger.subscribe();
        ledger.start().unwrap();

        access(&ledger, 3);
        ledger.flush().await.unwrap();
        clock.advance(ChronoDuration::days(31));

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert!(eventually(|| ledger.stats().chained == 0).await);

        let mut purged = None;
        while let Ok(n) = rx.try_recv() {
            if let LedgerNotification::RetentionPurged { entries, anchor_hash } = n {
                purged = Some((entries, anchor_hash));
            }
        }
        assert_eq!(purged, Some((3, Some(store.entries()[2].hash.clone()))));

        ledger.stop().await.unwrap();
    }

    // ── Queries and reports ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_query_paging() {
        let (ledger, _) = ledger_with(100);
        access(&ledger, 5);
        ledger.log_authentication("dr-grey", true, "password", AuditContext::new("test"));
        ledger.flush().await.unwrap();

        let query = AuditQuery {
            event_type: Some(EventType::DataAccess),
            limit: 2,
            offset: 2,
            ..AuditQuery::default()
        };
        let page = ledger.query_audit_trail(&query).await.unwrap();
        assert_eq!(page.total, 5);
        assert!(page.has_more);
        let seqs: Vec<u64> = page.results.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![3, 4]);

        let last = AuditQuery { offset: 4, ..query.clone() };
        let page = ledger.query_audit_trail(&last).await.unwrap();
        assert_eq!(page.results.len(), 1);
        assert!(!page.has_more);

        let by_resource = AuditQuery {
            resource_id: Some("record-3".to_string()),
            ..AuditQuery::default()
        };
        let page = ledger.query_audit_trail(&by_resource).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.results[0].sequence_number, 4);
    }

    /// No match is an empty page, not an error.
    #[tokio::test]
    async fn test_query_no_match() {
        let (ledger, _) = ledger_with(100);
        access(&ledger, 2);
        ledger.flush().await.unwrap();

        let query = AuditQuery {
            actor_id: Some("nobody".to_string()),
            ..AuditQuery::default()
        };
        let page = ledger.query_audit_trail(&query).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(page.results.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_query_invalid_criteria() {
        let (ledger, _) = ledger_with(100);
        let now = Utc::now();

        let bad = [
            AuditQuery { limit: 0, ..AuditQuery::default() },
            AuditQuery { limit: 1_000_000, ..AuditQuery::default() },
            AuditQuery {
                start: Some(now),
                end: Some(now - ChronoDuration::hours(1)),
                ..AuditQuery::default()
            },
            AuditQuery { actor_id: Some("  ".to_string()), ..AuditQuery::default() },
        ];
        for query in bad {
            let err = ledger.query_audit_trail(&query).await.unwrap_err();
            assert!(matches!(err, WardenError::InvalidQueryCriteria { .. }), "got {:?}", err);
        }
    }

    #[tokio::test]
    async fn test_query_storage_unavailable() {
        let (ledger, store) = ledger_with(100);
        store.set_available(false);
        let err = ledger.query_audit_trail(&AuditQuery::default()).await.unwrap_err();
        assert!(matches!(err, WardenError::StorageUnavailable { .. }));
    }

    /// Pending entries are not visible to queries until flushed.
    #[tokio::test]
    async fn test_query_reads_durable_store_only() {
        let (ledger, _) = ledger_with(100);
        access(&ledger, 3);
        let page = ledger.query_audit_trail(&AuditQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);

        ledger.flush().await.unwrap();
        let page = ledger.query_audit_trail(&AuditQuery::default()).await.unwrap();
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_get_entry() {
        let (ledger, _) = ledger_with(100);
        let id = ledger.log_event(EventType::SystemAccess, EventData::new(), AuditContext::new("test"));
        assert!(matches!(ledger.get_entry(&id).await, Err(WardenError::NotFound { .. })));

        ledger.flush().await.unwrap();
        assert_eq!(ledger.get_entry(&id).await.unwrap().id, id);
    }

    #[tokio::test]
    async fn test_audit_report() {
        let store = Arc::new(MemoryAuditStore::new());
        let ledger =
            AuditLedger::new(config(100), store).with_encryptor(Arc::new(XorEncryptor));

        access(&ledger, 4);
        ledger.log_authentication("dr-grey", false, "password", AuditContext::new("test"));
        ledger.log_authentication("dr-grey", true, "password", AuditContext::new("test"));
        ledger.log_security_event(
            Severity::Critical,
            "blocked origin",
            EventData::new(),
            AuditContext::new("threat-engine"),
        );
        ledger.log_security_event(
            Severity::Low,
            "odd header",
            EventData::new(),
            AuditContext::new("threat-engine"),
        );
        ledger.flush().await.unwrap();

        let criteria = AuditQuery { limit: 3, ..AuditQuery::default() };
        let report = ledger.generate_audit_report(&criteria).await.unwrap();

        assert_eq!(report.summary.total_events, 8);
        assert_eq!(report.events.len(), 3);
        assert_eq!(report.summary.by_event_type.get("data_access"), Some(&4));
        assert_eq!(report.summary.by_actor.get("dr-house"), Some(&4));
        assert_eq!(report.summary.unique_actors, 2);
        assert_eq!(report.summary.failed_authentications, 1);
        assert_eq!(report.summary.security_events, 2);
        assert_eq!(report.summary.critical_security_events, 1);
        assert_eq!(report.summary.encrypted_entries, 2);
        assert!(report.integrity.verified);
        assert_eq!(report.criteria, criteria);
    }

    #[tokio::test]
    async fn test_count_by_time_range() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryAuditStore::new());
        let ledger = AuditLedger::new(config(100), store).with_clock(clock.clone());

        access(&ledger, 2);
        clock.advance(ChronoDuration::hours(2));
        access(&ledger, 3);
        ledger.flush().await.unwrap();

        let first_hour = ledger
            .count_by_time_range(start, start + ChronoDuration::hours(1))
            .await
            .unwrap();
        assert_eq!(first_hour, 2);
        let all = ledger
            .count_by_time_range(start, start + ChronoDuration::days(1))
            .await
            .unwrap();
        assert_eq!(all, 5);
    }

    // ── Notifications ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_notifications_on_log_and_flush() {
        let (ledger, _) = ledger_with(100);
        let mut rx = ledger.subscribe();

        let id = ledger.log_event(EventType::SystemAccess, EventData::new(), AuditContext::new("test"));
        ledger.flush().await.unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            LedgerNotification::EntryCreated {
                id,
                sequence_number: 1,
                event_type: EventType::SystemAccess,
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            LedgerNotification::BatchFlushed {
                entries: 1,
                last_sequence: 1,
            }
        );
    }
}
