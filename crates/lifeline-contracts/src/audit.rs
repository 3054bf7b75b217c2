//! Audit trail types.
//!
//! An `AuditLogEntry` wraps an `AuditRecord` with its position in the hash
//! chain and the SHA-256 integrity hash that makes tampering detectable.
//! Entries are immutable once built; the hashing itself lives in
//! `lifeline-audit`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::UserId;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ContentModerated,
    AlertCreated,
    AlertUpdated,
    AlertDeleted,
    AlertViewed,
    TrustAdjusted,
    PresenceConnected,
    PresenceDisconnected,
    AuditQueried,
    BreakGlassAccess,
    AuditFailure,
}

impl AuditEventType {
    /// Event types whose details reference PHI and must be sealed before
    /// they leave process memory.
    pub fn carries_phi(self) -> bool {
        matches!(
            self,
            AuditEventType::ContentModerated
                | AuditEventType::AlertCreated
                | AuditEventType::AlertUpdated
                | AuditEventType::AlertViewed
                | AuditEventType::BreakGlassAccess
        )
    }
}

/// Ordered audit severity. Critical entries are flushed immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Partial,
}

/// An encrypted payload produced by the encryption capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlob {
    /// Identifies the key that sealed the payload, for rotation.
    pub key_id: String,
    /// Hex-encoded nonce.
    pub nonce: String,
    /// Hex-encoded ciphertext including the authentication tag.
    pub ciphertext: String,
}

/// The body of an audit entry: every field the integrity hash commits to
/// besides the chain position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    /// `None` for system-initiated events.
    pub actor_id: Option<UserId>,
    pub resource_id: String,
    pub action: String,
    pub outcome: AuditOutcome,
    /// Non-sensitive details, stored in the clear.
    pub details: Option<serde_json::Value>,
    /// Sensitive details, sealed by the encryption capability.
    pub details_encrypted: Option<SealedBlob>,
}

/// A single entry in the audit hash chain.
///
/// Modifying any field of `record`, the `sequence` or `prev_hash` invalidates
/// `integrity_hash`, which every read re-verifies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Position in the chain, starting at 0.
    pub sequence: u64,
    /// `integrity_hash` of the previous entry, or the genesis hash.
    pub prev_hash: String,
    pub record: AuditRecord,
    /// Lowercase hex SHA-256 over (sequence, prev_hash, record).
    pub integrity_hash: String,
}

impl AuditLogEntry {
    /// The `prev_hash` of the first entry in every chain.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// What a caller hands to the audit logger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRequest {
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub actor_id: Option<UserId>,
    pub resource_id: String,
    pub action: String,
    pub outcome: AuditOutcome,
    pub details: serde_json::Value,
    /// Force sealing even when the event type does not carry PHI.
    pub sensitive: bool,
}

impl AuditRequest {
    /// A successful, low-severity request with no details.
    pub fn new(
        event_type: AuditEventType,
        actor_id: Option<UserId>,
        resource_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            severity: AuditSeverity::Low,
            actor_id,
            resource_id: resource_id.into(),
            action: action.into(),
            outcome: AuditOutcome::Success,
            details: serde_json::Value::Null,
            sensitive: false,
        }
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Whether the details must be sealed before storage.
    pub fn needs_sealing(&self) -> bool {
        !self.details.is_null() && (self.sensitive || self.event_type.carries_phi())
    }
}

/// Filters for the audit query surface. `limit` defaults to 100; any field
/// left out of a serialized query takes its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub user_id: Option<UserId>,
    pub event_type: Option<AuditEventType>,
    pub severity: Option<AuditSeverity>,
    pub outcome: Option<AuditOutcome>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            user_id: None,
            event_type: None,
            severity: None,
            outcome: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl AuditQuery {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(start) = self.start_date {
            if record.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if record.timestamp > end {
                return false;
            }
        }
        if let Some(user) = &self.user_id {
            if record.actor_id.as_ref() != Some(user) {
                return false;
            }
        }
        if let Some(event_type) = self.event_type {
            if record.event_type != event_type {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if record.severity != severity {
                return false;
            }
        }
        if let Some(outcome) = self.outcome {
            if record.outcome != outcome {
                return false;
            }
        }
        true
    }
}

/// An entry returned from a read, with the result of re-verifying its hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedAuditEntry {
    pub entry: AuditLogEntry,
    /// False when the recomputed hash does not match `integrity_hash`.
    pub intact: bool,
}
