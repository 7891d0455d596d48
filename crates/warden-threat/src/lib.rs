//! warden-threat: request threat scoring and containment.
//!
//! # Pipeline
//!
//! ```text
//!   ThreatRequest + RequestContext
//!         │
//!         ▼
//!   Containment ── blocked? ──▶ Block (blocked_origin)
//!         │
//!         ▼
//!   RateLimiter ─▶ PayloadScanner ┐
//!                  GeoAnalyzer    ├─▶ score (clamped 0..=100) ─▶ ActionPolicy
//!                  SessionAnalyzer│
//!                  BehaviorAnalyzer┘
//!         │
//!         ▼
//!   ThreatAnalysis ─▶ Containment (monitor / block) ─▶ AuditLedger
//! ```
//!
//! The engine decides. It never rejects a request itself: callers act on
//! `ThreatAnalysis::action`.

pub mod analyzers;
pub mod containment;
pub mod engine;
pub mod rate_limit;

pub use containment::{Containment, Escalation};
pub use engine::{ThreatEngine, ThreatEngineBuilder};
pub use rate_limit::RateLimiter;
