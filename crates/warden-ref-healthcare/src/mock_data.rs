//! Simulated clinic data for the WARDEN reference runtime.
//!
//! Everything in this module is hardcoded and fictional: patients, staff,
//! network origins and their locations. No external systems are contacted.

use sha2::{Digest, Sha256};

use warden_contracts::{error::WardenResult, threat::GeoLocation};
use warden_core::traits::Encryptor;
use warden_threat::analyzers::StaticGeoResolver;

// ── People ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Patient {
    pub id: &'static str,
    pub mrn: &'static str,
    pub name: &'static str,
    pub primary_condition: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct StaffMember {
    pub actor_id: &'static str,
    pub name: &'static str,
    pub role: &'static str,
}

pub const PATIENTS: &[Patient] = &[
    Patient {
        id: "pt-1001",
        mrn: "MRN-448210",
        name: "Jordan Avery",
        primary_condition: "Type 2 diabetes mellitus",
    },
    Patient {
        id: "pt-1002",
        mrn: "MRN-448377",
        name: "Sam Okafor",
        primary_condition: "Essential hypertension",
    },
    Patient {
        id: "pt-1003",
        mrn: "MRN-449102",
        name: "Riley Chen",
        primary_condition: "Iron deficiency anemia",
    },
];

pub const DR_RIVERA: StaffMember = StaffMember {
    actor_id: "dr-rivera",
    name: "Dr. A. Rivera",
    role: "attending-physician",
};

pub const NURSE_PATEL: StaffMember = StaffMember {
    actor_id: "rn-patel",
    name: "K. Patel, RN",
    role: "nurse",
};

pub const BILLING_CLERK: StaffMember = StaffMember {
    actor_id: "clerk-morgan",
    name: "T. Morgan",
    role: "billing",
};

// ── Network origins ───────────────────────────────────────────────────────────

/// The clinic's own egress address.
pub const CLINIC_NETWORK: &str = "10.20.0.15";
/// A physician's home connection in Paris.
pub const HOME_PARIS: &str = "192.0.2.10";
/// The same physician's credentials, seen from Copenhagen.
pub const REMOTE_COPENHAGEN: &str = "192.0.2.20";
/// A scanner hammering the patient portal.
pub const SCANNER_ORIGIN: &str = "203.0.113.66";
/// A Tor exit node in a sanctioned region.
pub const TOR_EXIT: &str = "198.51.100.250";
/// A commercial VPN endpoint.
pub const VPN_EXIT: &str = "198.51.100.31";

/// A resolver that knows every origin used by the scenarios.
pub fn clinic_geo_resolver() -> StaticGeoResolver {
    let mut tor = GeoLocation::new(39.0392, 125.7625, "KP").with_city("Pyongyang");
    tor.is_tor = true;
    let mut vpn = GeoLocation::new(40.7128, -74.0060, "US").with_city("New York");
    vpn.is_vpn = true;

    StaticGeoResolver::new()
        .with(CLINIC_NETWORK, GeoLocation::new(41.8781, -87.6298, "US").with_city("Chicago"))
        .with(HOME_PARIS, GeoLocation::new(48.8566, 2.3522, "FR").with_city("Paris"))
        .with(REMOTE_COPENHAGEN, GeoLocation::new(55.6761, 12.5683, "DK").with_city("Copenhagen"))
        .with(SCANNER_ORIGIN, GeoLocation::new(52.3676, 4.9041, "NL").with_city("Amsterdam"))
        .with(TOR_EXIT, tor)
        .with(VPN_EXIT, vpn)
}

// ── Encryption ────────────────────────────────────────────────────────────────

/// A keyed stream cipher built from SHA-256 in counter mode.
///
/// Stands in for a KMS or HSM. It is enough to show that sealed PHI payloads
/// never reach the store in clear; it is not authenticated encryption and must
/// not be used for real records.
pub struct DemoEncryptor {
    key_id: String,
    key: [u8; 32],
}

impl DemoEncryptor {
    pub fn new(key_id: impl Into<String>, secret: &str) -> Self {
        Self {
            key_id: key_id.into(),
            key: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    fn keystream_block(&self, counter: u64) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(counter.to_be_bytes());
        hasher.finalize().into()
    }
}

impl Encryptor for DemoEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> WardenResult<Vec<u8>> {
        let ciphertext = plaintext
            .chunks(32)
            .zip(0u64..)
            .flat_map(|(chunk, counter)| {
                let block = self.keystream_block(counter);
                chunk
                    .iter()
                    .zip(block)
                    .map(|(p, k)| p ^ k)
                    .collect::<Vec<u8>>()
            })
            .collect();
        Ok(ciphertext)
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_encryptor_is_keyed() {
        let a = DemoEncryptor::new("k1", "clinic-secret");
        let b = DemoEncryptor::new("k2", "other-secret");
        let plaintext = b"patient pt-1001 viewed by dr-rivera for treatment, 64 bytes long.";

        let ca = a.encrypt(plaintext).unwrap();
        assert_eq!(ca.len(), plaintext.len());
        assert_ne!(&ca[..], &plaintext[..]);
        assert_ne!(ca, b.encrypt(plaintext).unwrap());
        // XOR stream: applying it twice restores the input.
        assert_eq!(a.encrypt(&ca).unwrap(), plaintext.to_vec());
    }
}
