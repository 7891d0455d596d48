//! Query validation, paging and report summaries.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use warden_contracts::{
    audit::{AuditEntry, AuditPage, AuditQuery, EventType, ReportSummary},
    error::{WardenError, WardenResult},
};

/// Reject malformed criteria before touching the store.
pub fn validate_query(query: &AuditQuery, max_limit: usize) -> WardenResult<()> {
    if query.limit == 0 {
        return Err(WardenError::InvalidQueryCriteria {
            reason: "limit must be greater than 0".to_string(),
        });
    }
    if query.limit > max_limit {
        return Err(WardenError::InvalidQueryCriteria {
            reason: format!("limit {} exceeds maximum of {}", query.limit, max_limit),
        });
    }
    if let (Some(start), Some(end)) = (query.start, query.end) {
        if start > end {
            return Err(WardenError::InvalidQueryCriteria {
                reason: format!("start ({}) is after end ({})", start, end),
            });
        }
    }
    for (name, value) in [
        ("actor_id", &query.actor_id),
        ("resource_id", &query.resource_id),
        ("origin", &query.origin),
    ] {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(WardenError::InvalidQueryCriteria {
                reason: format!("{} filter must not be blank", name),
            });
        }
    }
    Ok(())
}

/// Cut one page out of the full, ordered match set.
pub fn paginate(matched: Vec<AuditEntry>, limit: usize, offset: usize) -> AuditPage {
    let total = matched.len();
    let results: Vec<AuditEntry> = matched.into_iter().skip(offset).take(limit).collect();
    let has_more = offset.saturating_add(results.len()) < total;
    AuditPage {
        results,
        total,
        has_more,
    }
}

/// Aggregate counts over `entries`.
///
/// `severity` and `success` survive sealing, so encrypted entries are
/// counted too.
pub fn summarize(entries: &[AuditEntry]) -> ReportSummary {
    let mut summary = ReportSummary {
        total_events: entries.len(),
        period_start: entries.iter().map(|e| e.timestamp).min(),
        period_end: entries.iter().map(|e| e.timestamp).max(),
        ..ReportSummary::default()
    };

    let mut by_event_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_actor: BTreeMap<String, usize> = BTreeMap::new();
    let mut actors: BTreeSet<&str> = BTreeSet::new();

    for entry in entries {
        *by_event_type.entry(entry.event_type.as_str().to_string()).or_default() += 1;

        if let Some(actor) = entry.context.actor_id.as_deref() {
            *by_actor.entry(actor.to_string()).or_default() += 1;
            actors.insert(actor);
        }

        match entry.event_type {
            EventType::SecurityEvent => {
                summary.security_events += 1;
                if entry.event_data.get_str("severity") == Some("critical") {
                    summary.critical_security_events += 1;
                }
            }
            EventType::Authentication => {
                if entry.event_data.get("success") == Some(&Value::Bool(false)) {
                    summary.failed_authentications += 1;
                }
            }
            _ => {}
        }

        if entry.encrypted {
            summary.encrypted_entries += 1;
        }
        if !entry.compliance_flags.is_empty() {
            summary.compliance_flagged += 1;
        }
    }

    summary.unique_actors = actors.len();
    summary.by_event_type = by_event_type;
    summary.by_actor = by_actor;
    summary
}
