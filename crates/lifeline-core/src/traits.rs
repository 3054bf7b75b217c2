//! Trait seams for the LIFELINE pipeline.
//!
//! The workflow controller only talks to its collaborators through these
//! traits, so storage engines, the real-time fabric and external senders can
//! be swapped (or faked in tests) without touching the alert lifecycle logic.
//!
//! - `ContentModerator` — pure classification (never fails)
//! - `RateLimiter`      — per-user admission gate
//! - `AlertRepository`  — alert persistence with compare-and-swap updates
//! - `TrustLedger`      — reputation scores
//! - `AuditLogger`      — tamper-evident audit trail entry point
//! - `AuditSink`        — durable destination for flushed audit batches
//! - `AlertPublisher`   — real-time fan-out of alert lifecycle events
//! - `FieldCipher`      — encryption-at-rest capability
//! - `NotificationSender` — out-of-band channels (email, SMS, pager)
//! - `UserDirectory`    — existence checks for subject users
//! - `CommandValidator` — structural + semantic payload validation

use std::time::Duration;

use lifeline_contracts::{
    alert::{AlertFilter, AlertId, AlertPage, AlertPatch, PageRequest, SafetyAlert},
    audit::{AuditLogEntry, AuditRequest, SealedBlob},
    error::LifelineResult,
    identity::{Actor, UserId},
    moderation::{Classification, ModerationReport},
    notify::Notification,
    realtime::AlertEvent,
    trust::{TrustAction, TrustMetric},
    validation::{CommandSchema, ValidationReport},
};

/// Deterministic crisis / spam / inappropriate-content detection.
///
/// Implementations must be pure and fast: no I/O, no shared mutable state.
pub trait ContentModerator: Send + Sync {
    /// Crisis classification only.
    fn classify(&self, text: &str) -> Classification;

    /// Run every detector and decide whether the content needs human review.
    fn moderate(&self, text: &str, trust_score: f64) -> ModerationReport;
}

/// Per-user admission control for the publish-to-feed path.
pub trait RateLimiter: Send + Sync {
    /// Count one submission and return whether it is within the limit.
    fn admit(&self, user_id: &UserId) -> bool;

    /// Time until the user's current window resets.
    fn retry_after(&self, user_id: &UserId) -> Duration;
}

/// Alert persistence.
///
/// `update` is the single arbiter of concurrent transitions: it succeeds only
/// when `expected_version` equals the stored version, so of two callers that
/// read the same version exactly one can win.
pub trait AlertRepository: Send + Sync {
    /// Insert a new alert. The stored copy always starts at `New`, version 1.
    fn create(&self, alert: SafetyAlert) -> LifelineResult<SafetyAlert>;

    fn get(&self, id: AlertId) -> LifelineResult<SafetyAlert>;

    /// Filter, order (unhandled first, severity desc, newest first) and page.
    fn list(&self, filter: &AlertFilter, page: PageRequest) -> LifelineResult<AlertPage>;

    /// Apply `patch` if the stored version still equals `expected_version`.
    ///
    /// Fails with `NotFound`, `Conflict` (stale version) or
    /// `InvalidTransition`; on failure the stored alert is unchanged.
    fn update(
        &self,
        id: AlertId,
        patch: &AlertPatch,
        expected_version: u64,
    ) -> LifelineResult<SafetyAlert>;

    /// Purge an alert. Admin only. Returns the removed record.
    fn delete(&self, actor: &Actor, id: AlertId) -> LifelineResult<SafetyAlert>;
}

/// Reputation scores.
pub trait TrustLedger: Send + Sync {
    /// Current score, neutral when the user has no record.
    fn score(&self, user_id: &UserId) -> f64;

    fn metric(&self, user_id: &UserId) -> TrustMetric;

    /// Apply `action.base_delta() * weight`, clamp, append history, persist.
    fn adjust(&self, user_id: &UserId, action: TrustAction, weight: f64)
        -> LifelineResult<TrustMetric>;
}

/// The audit trail entry point used by the workflow.
///
/// `log` must never block on the durable sink for long: implementations
/// buffer, and sink failures are escalated to operators rather than returned.
/// Returns the new entry's id.
pub trait AuditLogger: Send + Sync {
    fn log(&self, request: AuditRequest) -> LifelineResult<String>;

    /// Push everything buffered to the sink now.
    fn flush(&self) -> LifelineResult<()>;
}

/// Durable destination for audit batches.
pub trait AuditSink: Send + Sync {
    /// Persist a batch in order. All or nothing.
    fn persist(&self, batch: &[AuditLogEntry]) -> LifelineResult<()>;
}

/// Real-time publication of alert lifecycle events.
pub trait AlertPublisher: Send + Sync {
    /// Fan out to every subscribed presence (and to peer instances).
    fn publish(&self, event: AlertEvent) -> LifelineResult<()>;

    /// Deliver an event only to the given user's connections.
    fn notify_user(&self, user_id: &UserId, event: AlertEvent) -> LifelineResult<()>;
}

/// Encryption-at-rest capability.
pub trait FieldCipher: Send + Sync {
    fn seal(&self, plaintext: &[u8]) -> LifelineResult<SealedBlob>;

    fn open(&self, blob: &SealedBlob) -> LifelineResult<Vec<u8>>;
}

/// External notification channels.
pub trait NotificationSender: Send + Sync {
    fn deliver(&self, notification: &Notification) -> LifelineResult<()>;
}

/// Lookup of known platform users.
pub trait UserDirectory: Send + Sync {
    fn exists(&self, user_id: &UserId) -> bool;
}

/// Command payload validation.
pub trait CommandValidator: Send + Sync {
    fn validate(
        &self,
        payload: &serde_json::Value,
        schema: &CommandSchema,
    ) -> LifelineResult<ValidationReport>;
}
