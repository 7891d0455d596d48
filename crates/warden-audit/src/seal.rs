//! Payload sealing for sensitive event types.
//!
//! A sealed payload keeps only `ciphertext` (base64), `key_id`, and the
//! index keys in [`CLEAR_INDEX_KEYS`] if they were present, so entries can
//! still be queried and summarized without decryption. When the encryptor
//! fails the plaintext (already sanitized) is kept, marked with
//! `encryption_failed`, and flagged for remediation.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::warn;

use warden_contracts::audit::{AuditEntry, EventData, EventType};
use warden_core::traits::Encryptor;

/// Payload keys copied next to the ciphertext in clear.
pub const CLEAR_INDEX_KEYS: &[&str] = &[EventData::RESOURCE_ID, "success", "severity"];

/// The payload as it will be chained.
#[derive(Debug, Clone, PartialEq)]
pub struct SealedPayload {
    pub event_data: EventData,
    pub encrypted: bool,
    pub compliance_flags: Vec<String>,
}

impl SealedPayload {
    fn plain(event_data: EventData) -> Self {
        Self {
            event_data,
            encrypted: false,
            compliance_flags: Vec::new(),
        }
    }

    fn failed(mut event_data: EventData, reason: &str) -> Self {
        event_data.insert(AuditEntry::ENCRYPTION_FAILED, true);
        event_data.insert("encryption_error", reason);
        Self {
            event_data,
            encrypted: false,
            compliance_flags: vec![AuditEntry::ENCRYPTION_FAILED.to_string()],
        }
    }
}

/// Encrypt `data` if `event_type` is sensitive and an encryptor is present.
///
/// Never fails: audit continuity outranks confidentiality of the record.
pub fn seal_payload(
    encryptor: Option<&dyn Encryptor>,
    event_type: EventType,
    data: EventData,
) -> SealedPayload {
    let Some(encryptor) = encryptor else {
        return SealedPayload::plain(data);
    };
    if !event_type.is_sensitive() {
        return SealedPayload::plain(data);
    }

    let plaintext = match serde_json::to_vec(&data) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(event_type = %event_type, error = %e, "could not serialize payload for encryption");
            return SealedPayload::failed(data, &e.to_string());
        }
    };

    match encryptor.encrypt(&plaintext) {
        Ok(ciphertext) => {
            let mut sealed = EventData::new()
                .with("ciphertext", BASE64.encode(ciphertext))
                .with("key_id", encryptor.key_id());
            for key in CLEAR_INDEX_KEYS {
                if let Some(value) = data.get(key) {
                    sealed.insert(*key, value.clone());
                }
            }
            SealedPayload {
                event_data: sealed,
                encrypted: true,
                compliance_flags: Vec::new(),
            }
        }
        Err(e) => {
            warn!(
                event_type = %event_type,
                key_id = %encryptor.key_id(),
                error = %e,
                "encryption failed; storing sanitized plaintext with compliance flag"
            );
            SealedPayload::failed(data, &e.to_string())
        }
    }
}
