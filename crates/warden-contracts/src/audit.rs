//! Audit ledger types.
//!
//! `AuditEntry` is one link of the hash chain. `AuditContext` and
//! `EventData` are what callers hand to the ledger; `AuditQuery`,
//! `AuditPage` and `AuditReport` are what compliance tooling gets back.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier of a single audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditEntryId(pub uuid::Uuid);

impl AuditEntryId {
    /// Create a new, unique entry ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The category of an audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Authentication,
    Authorization,
    DataAccess,
    DataModification,
    PhiAccess,
    SystemAccess,
    ConfigurationChange,
    SecurityEvent,
    ComplianceEvent,
    ErrorEvent,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [EventType; 10] = [
        EventType::Authentication,
        EventType::Authorization,
        EventType::DataAccess,
        EventType::DataModification,
        EventType::PhiAccess,
        EventType::SystemAccess,
        EventType::ConfigurationChange,
        EventType::SecurityEvent,
        EventType::ComplianceEvent,
        EventType::ErrorEvent,
    ];

    /// The wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Authentication => "authentication",
            EventType::Authorization => "authorization",
            EventType::DataAccess => "data_access",
            EventType::DataModification => "data_modification",
            EventType::PhiAccess => "phi_access",
            EventType::SystemAccess => "system_access",
            EventType::ConfigurationChange => "configuration_change",
            EventType::SecurityEvent => "security_event",
            EventType::ComplianceEvent => "compliance_event",
            EventType::ErrorEvent => "error_event",
        }
    }

    /// Payloads of these types are encrypted when an encryptor is configured.
    pub fn is_sensitive(&self) -> bool {
        matches!(
            self,
            EventType::Authentication | EventType::PhiAccess | EventType::DataModification
        )
    }

    /// Entries of these types bypass batching and are flushed immediately.
    pub fn requires_immediate_flush(&self) -> bool {
        matches!(
            self,
            EventType::SecurityEvent | EventType::ComplianceEvent | EventType::PhiAccess
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flush priority carried in the audit context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    /// Forces an immediate flush regardless of event type.
    High,
}

/// Who did what from where.
///
/// Every field except `source` is optional because background tasks and
/// system jobs log events with no actor or network origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub actor_id: Option<String>,
    pub session_id: Option<String>,
    /// Network address of the caller.
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    /// Free-form tag naming the subsystem that produced the event.
    pub source: String,
    #[serde(default)]
    pub priority: Priority,
}

impl AuditContext {
    /// A context with only a source tag set.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Structured, schema-light event payload.
///
/// Backed by a `BTreeMap` so serialization order is stable, which the hash
/// chain depends on. Nested objects are `serde_json::Value`s, whose maps are
/// also sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventData(BTreeMap<String, Value>);

impl EventData {
    /// Well-known key used by `AuditQuery::resource_id`.
    pub const RESOURCE_ID: &'static str = "resource_id";

    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Value)> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for EventData {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for EventData {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A single link of the audit hash chain.
///
/// Once an entry has been flushed it is never modified. Changing any field
/// invalidates `hash` (and the next entry's `previous_hash`), which
/// `verify_chain` reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    /// Process-wide position in the chain, starting at 1.
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    /// Sanitized payload. When `encrypted` is set this holds only the
    /// sealed ciphertext.
    pub event_data: EventData,
    pub context: AuditContext,
    /// `hash` of the preceding entry; `None` for the first entry.
    pub previous_hash: Option<String>,
    /// Lowercase hex SHA-256 over the canonical form of this entry.
    pub hash: String,
    pub encrypted: bool,
    /// Remediation markers, e.g. `encryption_failed`.
    #[serde(default)]
    pub compliance_flags: Vec<String>,
}

impl AuditEntry {
    /// Compliance flag recorded when a sensitive payload could not be sealed.
    pub const ENCRYPTION_FAILED: &'static str = "encryption_failed";

    /// True for the first entry of a chain.
    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_none()
    }

    /// The `resource_id` key of the payload, if present and a string.
    pub fn resource_id(&self) -> Option<&str> {
        self.event_data.get_str(EventData::RESOURCE_ID)
    }
}

/// Filters for `query_audit_trail` and `generate_audit_report`.
///
/// All filters are conjunctive. `limit` and `offset` page the matching set,
/// which is ordered by sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub event_type: Option<EventType>,
    pub actor_id: Option<String>,
    pub resource_id: Option<String>,
    pub origin: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl AuditQuery {
    pub const DEFAULT_LIMIT: usize = 100;

    /// True when `entry` satisfies every filter that is set.
    ///
    /// `start` is inclusive and `end` is exclusive.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if self.start.is_some_and(|start| entry.timestamp < start) {
            return false;
        }
        if self.end.is_some_and(|end| entry.timestamp >= end) {
            return false;
        }
        if self.event_type.is_some_and(|t| entry.event_type != t) {
            return false;
        }
        if let Some(actor) = &self.actor_id {
            if entry.context.actor_id.as_deref() != Some(actor.as_str()) {
                return false;
            }
        }
        if let Some(origin) = &self.origin {
            if entry.context.origin.as_deref() != Some(origin.as_str()) {
                return false;
            }
        }
        if let Some(resource) = &self.resource_id {
            if entry.resource_id() != Some(resource.as_str()) {
                return false;
            }
        }
        true
    }
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            event_type: None,
            actor_id: None,
            resource_id: None,
            origin: None,
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPage {
    pub results: Vec<AuditEntry>,
    /// Number of entries matching the criteria, ignoring paging.
    pub total: usize,
    pub has_more: bool,
}

/// Which chain rule an entry broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainCheck {
    /// `previous_hash` does not equal the preceding entry's `hash`.
    PreviousHashMismatch,
    /// The stored `hash` does not match the recomputed one.
    HashMismatch,
}

/// A single integrity finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorruptedEntry {
    /// Position in the verified slice.
    pub index: usize,
    pub sequence_number: u64,
    pub entry_id: AuditEntryId,
    pub check: ChainCheck,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

/// The outcome of walking a chain segment.
///
/// Verification does not stop at the first problem; every gap and every
/// corrupted entry is reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub entries_checked: usize,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    /// Sequence numbers absent between consecutive entries.
    pub missing_sequences: Vec<u64>,
    /// Sequence numbers that appear more than once or run backwards.
    pub duplicate_sequences: Vec<u64>,
    pub corrupted: Vec<CorruptedEntry>,
}

impl VerificationResult {
    /// Slice indices of every corrupted entry, deduplicated, ascending.
    pub fn corrupted_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.corrupted.iter().map(|c| c.index).collect();
        indices.dedup();
        indices
    }
}

/// Aggregates over the entries a report covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_events: usize,
    pub by_event_type: BTreeMap<String, usize>,
    pub by_actor: BTreeMap<String, usize>,
    pub unique_actors: usize,
    pub security_events: usize,
    /// Security events whose payload carries `severity = "critical"`.
    pub critical_security_events: usize,
    /// Authentication events whose payload carries `success = false`.
    pub failed_authentications: usize,
    pub encrypted_entries: usize,
    /// Entries carrying at least one compliance flag.
    pub compliance_flagged: usize,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

/// A compliance report: summary, the matching events, and the chain status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub criteria: AuditQuery,
    pub summary: ReportSummary,
    pub events: Vec<AuditEntry>,
    pub integrity: VerificationResult,
}
