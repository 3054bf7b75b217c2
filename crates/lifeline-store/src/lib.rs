//! # lifeline-store
//!
//! In-process implementations of the LIFELINE storage seams:
//!
//! - [`InMemoryAlertStore`]: `AlertRepository` with version compare-and-swap
//! - [`InMemoryTrustLedger`]: `TrustLedger`
//! - [`FixedWindowRateLimiter`]: `RateLimiter`
//!
//! A relational backend plugs in by implementing the same traits from
//! `lifeline-core`.

pub mod alerts;
pub mod rate_limit;
pub mod trust;

pub use alerts::InMemoryAlertStore;
pub use rate_limit::FixedWindowRateLimiter;
pub use trust::InMemoryTrustLedger;

// ── Tests ─────────────────────────────────────────────────────────────────────
