//! Healthcare reference scenarios.
//!
//! Each scenario builds its own `ClinicRuntime`, drives fictional clinic
//! traffic through it and prints what the ledger and the threat engine saw.
//! `simulate` returns the raw results for tests; `run_scenario` prints them.

pub mod impossible_travel;
pub mod injection_attack;
pub mod phi_audit_trail;
pub mod suspicious_escalation;
