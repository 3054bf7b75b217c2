//! Classifier and moderation result types.
//!
//! The classifier is pure: it reads text and returns one of these values.
//! Nothing here performs I/O.

use serde::{Deserialize, Serialize};

use crate::alert::{AlertType, Severity};

/// Crisis risk tier produced by the classifier. `None` sorts lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// The alert severity a detection at this tier maps to.
    ///
    /// `None` maps to nothing: undetected content never raises an alert.
    pub fn alert_severity(self) -> Option<Severity> {
        match self {
            RiskLevel::None => None,
            RiskLevel::Low => Some(Severity::Medium),
            RiskLevel::Medium => Some(Severity::High),
            RiskLevel::High => Some(Severity::Critical),
        }
    }
}

/// Result of crisis classification for one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub detected: bool,
    pub level: RiskLevel,
    /// Matched pattern names, in tier order.
    pub keywords: Vec<String>,
    /// Operator guidance for the matched tier. Text only, never executed.
    pub suggested_interventions: Vec<String>,
    pub notify_counselors: bool,
    pub trigger_safety_plan: bool,
    /// The alert type implied by the first matched pattern.
    pub alert_type: Option<AlertType>,
}

impl Classification {
    /// The result for text that matched no crisis pattern.
    pub fn none() -> Self {
        Self {
            detected: false,
            level: RiskLevel::None,
            keywords: Vec::new(),
            suggested_interventions: Vec::new(),
            notify_counselors: false,
            trigger_safety_plan: false,
            alert_type: None,
        }
    }
}

/// Spam heuristics outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpamFinding {
    pub detected: bool,
    /// One entry per heuristic that fired (e.g. "excessive_links").
    pub reasons: Vec<String>,
    pub link_count: usize,
}

/// Inappropriate-content outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InappropriateFinding {
    pub detected: bool,
    /// Categories that matched: "hate", "violence", "harassment".
    pub categories: Vec<String>,
    pub terms: Vec<String>,
}

/// The union of every detector run over one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationReport {
    pub crisis: Classification,
    pub spam: SpamFinding,
    pub inappropriate: InappropriateFinding,
    /// True when a human moderator must look at the content before it is
    /// trusted: high crisis level, spam, inappropriate content, or a trust
    /// score under the review floor.
    pub requires_review: bool,
    pub review_reasons: Vec<String>,
}

impl ModerationReport {
    /// Content is safe to publish when neither spam nor inappropriate
    /// content was found. Crisis content is still published; it is handled by
    /// the alert path, not suppressed.
    pub fn is_safe(&self) -> bool {
        !self.spam.detected && !self.inappropriate.detected
    }
}
