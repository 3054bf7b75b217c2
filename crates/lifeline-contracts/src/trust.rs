//! Per-user reputation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::UserId;

/// Score every user starts from.
pub const NEUTRAL_TRUST_SCORE: f64 = 0.5;

/// Events that move a user's trust score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustAction {
    CleanContent,
    ResolvedWithoutIncident,
    SpamDetected,
    InappropriateContent,
    ConfirmedFalseAlarm,
}

impl TrustAction {
    /// Signed delta applied at weight 1.0.
    pub fn base_delta(self) -> f64 {
        match self {
            TrustAction::CleanContent => 0.01,
            TrustAction::ResolvedWithoutIncident => 0.02,
            TrustAction::SpamDetected => -0.10,
            TrustAction::InappropriateContent => -0.15,
            TrustAction::ConfirmedFalseAlarm => -0.05,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrustAction::CleanContent => "clean_content",
            TrustAction::ResolvedWithoutIncident => "resolved_without_incident",
            TrustAction::SpamDetected => "spam_detected",
            TrustAction::InappropriateContent => "inappropriate_content",
            TrustAction::ConfirmedFalseAlarm => "confirmed_false_alarm",
        }
    }
}

/// Tier derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Restricted,
    Low,
    Neutral,
    Trusted,
    Exemplary,
}

impl TrustLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.2 {
            TrustLevel::Restricted
        } else if score < 0.4 {
            TrustLevel::Low
        } else if score < 0.7 {
            TrustLevel::Neutral
        } else if score < 0.9 {
            TrustLevel::Trusted
        } else {
            TrustLevel::Exemplary
        }
    }
}

/// One applied adjustment. History is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustHistoryEntry {
    pub action: TrustAction,
    /// The delta actually applied after clamping.
    pub delta: f64,
    pub timestamp: DateTime<Utc>,
}

/// A user's reputation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustMetric {
    pub user_id: UserId,
    pub score: f64,
    pub level: TrustLevel,
    pub history: Vec<TrustHistoryEntry>,
}

impl TrustMetric {
    /// A neutral record for a user with no history.
    pub fn neutral(user_id: UserId) -> Self {
        Self {
            user_id,
            score: NEUTRAL_TRUST_SCORE,
            level: TrustLevel::from_score(NEUTRAL_TRUST_SCORE),
            history: Vec::new(),
        }
    }

    /// Apply a signed delta, clamp to `[0, 1]`, recompute the tier and append
    /// the effective change to history. Returns the applied delta.
    pub fn apply(&mut self, action: TrustAction, delta: f64, at: DateTime<Utc>) -> f64 {
        let before = self.score;
        let delta = if delta.is_finite() { delta } else { 0.0 };
        self.score = (before + delta).clamp(0.0, 1.0);
        self.level = TrustLevel::from_score(self.score);
        let applied = self.score - before;
        self.history.push(TrustHistoryEntry {
            action,
            delta: applied,
            timestamp: at,
        });
        applied
    }
}
