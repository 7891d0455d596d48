//! Hash-chain primitives: hashing and chain integrity verification.
//!
//! Every field of an `AuditEntry` except `hash` itself is committed to. The
//! hash input is a domain tag followed by the canonical JSON of a
//! fixed-order struct:
//!
//!   1. `id`
//!   2. `sequence_number`
//!   3. `timestamp` as RFC 3339 with nanosecond precision
//!   4. `event_type`
//!   5. `event_data` (a `BTreeMap`, so keys are sorted)
//!   6. `context`
//!   7. `previous_hash` (`null` for the first entry)
//!   8. `encrypted`
//!   9. `compliance_flags`

use chrono::SecondsFormat;
use serde::Serialize;
use sha2::{Digest, Sha256};

use warden_contracts::audit::{
    AuditContext, AuditEntry, AuditEntryId, ChainCheck, CorruptedEntry, EventData, EventType,
    VerificationResult,
};

const DOMAIN_TAG: &[u8] = b"warden.audit.v1\n";

/// Upper bound on gap sequence numbers listed in one result.
const MAX_REPORTED_MISSING: usize = 10_000;

#[derive(Serialize)]
struct CanonicalEntry<'a> {
    id: &'a AuditEntryId,
    sequence_number: u64,
    timestamp: String,
    event_type: EventType,
    event_data: &'a EventData,
    context: &'a AuditContext,
    previous_hash: Option<&'a str>,
    encrypted: bool,
    compliance_flags: &'a [String],
}

/// Compute the SHA-256 hash for a single audit entry.
///
/// The stored `hash` field is ignored, so this can be called both when
/// sealing a new entry and when re-checking a stored one.
///
/// Returns a lowercase 64-character hex string.
///
/// # Panics
///
/// Panics if the canonical form cannot be serialized to JSON, which cannot
/// happen: every map key is a string and `serde_json::Value` cannot hold a
/// non-finite number.
pub fn compute_hash(entry: &AuditEntry) -> String {
    let canonical = CanonicalEntry {
        id: &entry.id,
        sequence_number: entry.sequence_number,
        timestamp: entry.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
        event_type: entry.event_type,
        event_data: &entry.event_data,
        context: &entry.context,
        previous_hash: entry.previous_hash.as_deref(),
        encrypted: entry.encrypted,
        compliance_flags: &entry.compliance_flags,
    };
    let json = serde_json::to_vec(&canonical).expect("audit entry must always be serializable to JSON");

    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_TAG);
    hasher.update(&json);

    hex::encode(hasher.finalize())
}

/// Verify the integrity of a chain segment.
///
/// `expected_start_hash` is the `hash` of the entry immediately before the
/// segment. `None` means the segment starts at genesis: its first entry must
/// have no `previous_hash` and sequence number 1.
///
/// For every entry, checks:
///
/// 1. **Sequence**: numbers increase by exactly one. Gaps are listed in
///    `missing_sequences`, repeats or regressions in `duplicate_sequences`.
/// 2. **Linkage**: `previous_hash` equals the preceding entry's `hash`.
/// 3. **Hash correctness**: the stored `hash` matches `compute_hash`.
///
/// Verification never stops early. An empty segment is valid.
pub fn verify_chain(entries: &[AuditEntry], expected_start_hash: Option<&str>) -> VerificationResult {
    let mut result = VerificationResult {
        entries_checked: entries.len(),
        first_sequence: entries.first().map(|e| e.sequence_number),
        last_sequence: entries.last().map(|e| e.sequence_number),
        ..VerificationResult::default()
    };

    let mut expected_prev: Option<String> = expected_start_hash.map(str::to_string);
    // At genesis the sequence starts at 1, so pretend 0 came before it.
    let mut prev_sequence: Option<u64> = expected_start_hash.is_none().then_some(0);

    for (index, entry) in entries.iter().enumerate() {
        let seq = entry.sequence_number;

        if let Some(prev) = prev_sequence {
            let next = prev.saturating_add(1);
            if seq > next {
                let room = MAX_REPORTED_MISSING.saturating_sub(result.missing_sequences.len());
                result.missing_sequences.extend((next..seq).take(room));
            } else if seq < next {
                result.duplicate_sequences.push(seq);
            }
        }
        prev_sequence = Some(prev_sequence.map_or(seq, |p| p.max(seq)));

        // Rule 2: the stored previous_hash must match what we expect.
        if entry.previous_hash != expected_prev {
            result.corrupted.push(CorruptedEntry {
                index,
                sequence_number: seq,
                entry_id: entry.id,
                check: ChainCheck::PreviousHashMismatch,
                expected: expected_prev.clone(),
                actual: entry.previous_hash.clone(),
            });
        }

        // Rule 3: recompute the hash and compare to the stored value.
        let recomputed = compute_hash(entry);
        if entry.hash != recomputed {
            result.corrupted.push(CorruptedEntry {
                index,
                sequence_number: seq,
                entry_id: entry.id,
                check: ChainCheck::HashMismatch,
                expected: Some(recomputed),
                actual: Some(entry.hash.clone()),
            });
        }

        // Advance to this entry's stored hash so one bad link does not
        // cascade into every later entry.
        expected_prev = Some(entry.hash.clone());
    }

    result.verified = result.missing_sequences.is_empty()
        && result.duplicate_sequences.is_empty()
        && result.corrupted.is_empty();
    result
}
