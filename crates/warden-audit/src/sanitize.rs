//! Payload redaction.
//!
//! Raw secrets and identity-document numbers never enter the chain. Keys
//! whose normalized name contains a sensitive fragment are replaced with
//! [`REDACTED`], at any nesting depth. String values shaped like a US SSN
//! are redacted regardless of their key.

use serde_json::Value;

use warden_contracts::audit::EventData;

/// Replacement marker for redacted values.
pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "password",
    "passwd",
    "passphrase",
    "secret",
    "token",
    "api_key",
    "apikey",
    "private_key",
    "authorization",
    "credential",
    "ssn",
    "social_security",
    "credit_card",
    "card_number",
    "cvv",
    "drivers_license",
    "driver_license",
    "passport",
    "national_id",
    "tax_id",
];

/// Redact sensitive fields in place. Returns the number of values replaced.
pub fn sanitize_event_data(data: &mut EventData) -> usize {
    let mut redacted = 0;
    for (key, value) in data.iter_mut() {
        redacted += sanitize_field(key, value);
    }
    redacted
}

/// True when `key` names a secret or identity-document field.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.to_ascii_lowercase().replace(['-', ' '], "_");
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|fragment| normalized.contains(fragment))
}

fn sanitize_field(key: &str, value: &mut Value) -> usize {
    if is_sensitive_key(key) {
        if value.is_null() || value.as_str() == Some(REDACTED) {
            return 0;
        }
        *value = Value::String(REDACTED.to_string());
        return 1;
    }
    sanitize_value(value)
}

fn sanitize_value(value: &mut Value) -> usize {
    match value {
        Value::Object(map) => map.iter_mut().map(|(k, v)| sanitize_field(k, v)).sum(),
        Value::Array(items) => items.iter_mut().map(sanitize_value).sum(),
        Value::String(s) if looks_like_ssn(s) => {
            *value = Value::String(REDACTED.to_string());
            1
        }
        _ => 0,
    }
}

/// `ddd-dd-dddd`.
fn looks_like_ssn(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 11
        && bytes.iter().enumerate().all(|(i, b)| match i {
            3 | 6 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}
