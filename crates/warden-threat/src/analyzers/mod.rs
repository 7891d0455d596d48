//! The built-in signal analyzers.
//!
//! Each analyzer is independent: it sees the request, the caller identity
//! and the engine's clock, and keeps whatever per-actor or per-session state
//! it needs in its own concurrent map.

pub mod behavior;
pub mod geo;
pub mod payload;
pub mod session;

pub use behavior::{Activity, BehaviorAnalyzer};
pub use geo::{GeoAnalyzer, StaticGeoResolver};
pub use payload::PayloadScanner;
pub use session::SessionAnalyzer;
