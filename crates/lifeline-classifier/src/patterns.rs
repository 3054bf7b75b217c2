//! Classifier pattern configuration schema.
//!
//! A `PatternConfig` is deserialized from TOML once at startup and compiled
//! into the classifier. It is never mutated afterwards; tests inject their
//! own configuration instead of editing shared lists.
//!
//! Example:
//! ```toml
//! [high_risk]
//! interventions = ["Share the 988 Suicide & Crisis Lifeline"]
//!
//! [[high_risk.patterns]]
//! name = "kill_myself"
//! regex = '\bkill(ing)?\s+myself\b'
//! alert_type = "suicide_ideation"
//! ```

use serde::{Deserialize, Serialize};

use lifeline_contracts::alert::AlertType;

/// The patterns compiled into the classifier at startup.
pub const DEFAULT_PATTERNS: &str = include_str!("../patterns/default.toml");

/// One crisis pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisPattern {
    /// Reported as the keyword when the pattern matches.
    pub name: String,

    /// Matched case-insensitively.
    pub regex: String,

    /// The alert type a match implies. Defaults to `other`.
    #[serde(default = "default_alert_type")]
    pub alert_type: AlertType,
}

fn default_alert_type() -> AlertType {
    AlertType::Other
}

/// A crisis tier: its patterns and the interventions suggested when any of
/// them matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrisisTier {
    #[serde(default)]
    pub interventions: Vec<String>,

    #[serde(default)]
    pub patterns: Vec<CrisisPattern>,
}

/// Spam heuristics thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamConfig {
    /// More links than this is spam.
    pub max_links: usize,

    /// A run of the same character longer than this is spam.
    pub max_repeated_chars: usize,

    /// Distinct tokens / total tokens below this is spam.
    pub min_type_token_ratio: f64,

    /// The ratio check only applies to texts with at least this many tokens.
    pub min_tokens_for_ratio: usize,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            max_links: 3,
            max_repeated_chars: 10,
            min_type_token_ratio: 0.3,
            min_tokens_for_ratio: 10,
        }
    }
}

/// A named category of inappropriate terms ("hate", "violence", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermCategory {
    pub name: String,

    /// Literal phrases, matched case-insensitively on word boundaries.
    pub terms: Vec<String>,
}

/// The top-level structure deserialized from a TOML pattern file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Explicit self-harm or suicide intent. Short-circuits the other tiers.
    #[serde(default)]
    pub high_risk: CrisisTier,

    /// Despair and isolation language. All matches accumulate.
    #[serde(default)]
    pub medium_risk: CrisisTier,

    /// Explicit help-seeking.
    #[serde(default)]
    pub support_needed: CrisisTier,

    #[serde(default)]
    pub spam: SpamConfig,

    #[serde(default)]
    pub inappropriate: Vec<TermCategory>,
}
