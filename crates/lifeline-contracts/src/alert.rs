//! Safety alert types and the alert lifecycle state table.
//!
//! A `SafetyAlert` is created when classified content crosses the severity
//! threshold (or when staff raise one manually) and is then driven through
//! the states below by counselor actions:
//!
//! ```text
//! new ──► acknowledged ──► in_progress ──► resolved
//!  │            ▲  │                  ├──► escalated
//!  │            └──┘                  └──► false_positive
//!  ├──► in_progress
//!  ├──► escalated        (supervisor override)
//!  └──► false_positive   (immediate dismissal)
//! ```

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::UserId;

/// Maximum characters of triggering content kept on an alert.
pub const MAX_CONTEXT_CHARS: usize = 1000;

/// Maximum number of indicator tokens kept on an alert.
pub const MAX_INDICATORS: usize = 20;

/// Maximum characters accepted for counselor notes.
pub const MAX_NOTES_CHARS: usize = 2000;

/// Maximum number of action tags appended in a single update.
pub const MAX_ACTIONS_PER_UPDATE: usize = 20;

/// Unique identifier for a safety alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub uuid::Uuid);

impl AlertId {
    /// Create a new, unique alert ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse an alert ID from its hyphenated string form.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of crisis the alert describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    SelfHarm,
    SuicideIdeation,
    SubstanceAbuse,
    DomesticViolence,
    CrisisContent,
    Other,
}

/// Ordered alert severity. `Critical` sorts highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map the external 1..=5 severity scale onto the four internal tiers.
    ///
    /// 1 → low, 2 → medium, 3 → high, 4 and 5 → critical. Anything else is
    /// out of range.
    pub fn from_scale(level: u8) -> Option<Self> {
        match level {
            1 => Some(Severity::Low),
            2 => Some(Severity::Medium),
            3 => Some(Severity::High),
            4 | 5 => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    New,
    Acknowledged,
    InProgress,
    Resolved,
    Escalated,
    FalsePositive,
}

impl AlertStatus {
    /// Every status reachable from `self` in one step.
    pub fn allowed_targets(self) -> &'static [AlertStatus] {
        use AlertStatus::*;
        match self {
            New => &[Acknowledged, InProgress, Escalated, FalsePositive],
            Acknowledged => &[Acknowledged, InProgress],
            InProgress => &[Resolved, Escalated, FalsePositive],
            Resolved | Escalated | FalsePositive => &[],
        }
    }

    /// Return true if the state table permits `self → to`.
    pub fn can_transition_to(self, to: AlertStatus) -> bool {
        self.allowed_targets().contains(&to)
    }

    /// Terminal states carry a `handled_at` timestamp and accept no further
    /// transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AlertStatus::Resolved | AlertStatus::Escalated | AlertStatus::FalsePositive
        )
    }

    /// New and acknowledged alerts still need a counselor to take ownership.
    pub fn is_unhandled(self) -> bool {
        matches!(self, AlertStatus::New | AlertStatus::Acknowledged)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::InProgress => "in_progress",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Escalated => "escalated",
            AlertStatus::FalsePositive => "false_positive",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle-tracked crisis alert.
///
/// Invariants maintained by the alert store:
/// - `handled_at` is set iff `status` is terminal;
/// - `handled_by` is set iff `status != New`;
/// - `actions` is append-only;
/// - `version` increases by exactly one on every successful update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAlert {
    pub id: AlertId,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: Severity,
    /// The user whose content triggered the alert.
    pub subject_user_id: UserId,
    /// Truncated excerpt of the triggering content.
    pub context: String,
    /// Matched keyword/pattern tokens, in match order.
    pub indicators: Vec<String>,
    pub status: AlertStatus,
    pub handled_by: Option<UserId>,
    pub actions: Vec<String>,
    pub notes: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub handled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency token.
    pub version: u64,
}

impl SafetyAlert {
    /// Build a fresh `New` alert, truncating `context` and capping
    /// `indicators` to their privacy bounds.
    pub fn new(
        alert_type: AlertType,
        severity: Severity,
        subject_user_id: UserId,
        context: &str,
        indicators: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        let mut indicators = indicators;
        indicators.truncate(MAX_INDICATORS);
        Self {
            id: AlertId::new(),
            alert_type,
            severity,
            subject_user_id,
            context: truncate_chars(context, MAX_CONTEXT_CHARS),
            indicators,
            status: AlertStatus::New,
            handled_by: None,
            actions: Vec::new(),
            notes: None,
            detected_at: now,
            handled_at: None,
            updated_at: now,
            version: 0,
        }
    }

    /// Summary safe to write into an audit entry: no content, no notes.
    pub fn redacted_summary(&self) -> RedactedAlertSummary {
        RedactedAlertSummary {
            id: self.id,
            alert_type: self.alert_type,
            severity: self.severity,
            status: self.status,
            indicator_count: self.indicators.len(),
            handled: self.handled_at.is_some(),
            detected_at: self.detected_at,
        }
    }
}

/// The PHI-free view of an alert recorded when an alert is purged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactedAlertSummary {
    pub id: AlertId,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: Severity,
    pub status: AlertStatus,
    pub indicator_count: usize,
    pub handled: bool,
    pub detected_at: DateTime<Utc>,
}

/// The mutable subset of an alert an update may touch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertPatch {
    pub status: Option<AlertStatus>,
    pub handled_by: Option<UserId>,
    pub notes: Option<String>,
    pub severity: Option<Severity>,
    /// Appended to `actions`; existing tags are never rewritten.
    #[serde(default)]
    pub append_actions: Vec<String>,
}

impl AlertPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.handled_by.is_none()
            && self.notes.is_none()
            && self.severity.is_none()
            && self.append_actions.is_empty()
    }
}

/// Filters accepted by the alert list query. Empty sets match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertFilter {
    #[serde(default)]
    pub severities: Vec<Severity>,
    #[serde(default)]
    pub statuses: Vec<AlertStatus>,
    pub subject_user_id: Option<UserId>,
    pub handled_by: Option<UserId>,
    /// `Some(true)` keeps only alerts with `handled_at` set.
    pub handled: Option<bool>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl AlertFilter {
    /// Return true if `alert` passes every populated filter.
    pub fn matches(&self, alert: &SafetyAlert) -> bool {
        if !self.severities.is_empty() && !self.severities.contains(&alert.severity) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&alert.status) {
            return false;
        }
        if let Some(subject) = &self.subject_user_id {
            if &alert.subject_user_id != subject {
                return false;
            }
        }
        if let Some(handler) = &self.handled_by {
            if alert.handled_by.as_ref() != Some(handler) {
                return false;
            }
        }
        if let Some(handled) = self.handled {
            if alert.handled_at.is_some() != handled {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if alert.detected_at < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if alert.detected_at > to {
                return false;
            }
        }
        true
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

/// One page of alerts plus the totals a client needs to paginate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPage {
    pub items: Vec<SafetyAlert>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// Default queue ordering: unhandled (new or acknowledged) first, then
/// severity descending, then new ahead of acknowledged, then most recently
/// detected first.
pub fn queue_order(a: &SafetyAlert, b: &SafetyAlert) -> Ordering {
    let tier = |s: AlertStatus| if s.is_unhandled() { 0u8 } else { 1 };
    let seen = |s: AlertStatus| u8::from(s == AlertStatus::Acknowledged);
    tier(a.status)
        .cmp(&tier(b.status))
        .then_with(|| b.severity.cmp(&a.severity))
        .then_with(|| seen(a.status).cmp(&seen(b.status)))
        .then_with(|| b.detected_at.cmp(&a.detected_at))
}

/// Truncate `s` to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
