//! # warden-ref-healthcare
//!
//! Healthcare reference runtime for WARDEN.
//!
//! Four scenarios over a fictional family clinic:
//!
//! 1. **PHI Audit Trail**: sign-ins, chart access and edits recorded in the
//!    hash-chained ledger, PHI sealed, queried and reported on, tampering
//!    detected.
//! 2. **Injection Attack**: a scanner's SQL injection is blocked, its origin
//!    refused until the block lapses, and encoded payloads are caught.
//! 3. **Impossible Travel**: a hijacked physician session hops from Paris to
//!    Copenhagen to a Tor exit node.
//! 4. **Suspicious-Origin Escalation**: borderline requests accumulate until
//!    the reviewer blocks the origin.
//!
//! All data is hardcoded and fictional. No external services are contacted.

pub mod mock_data;
pub mod runtime;
pub mod scenarios;

pub use runtime::ClinicRuntime;
