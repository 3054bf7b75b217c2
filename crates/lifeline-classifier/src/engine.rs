//! Pattern-based risk classifier.
//!
//! `RiskClassifier` compiles a `PatternConfig` into `RegexSet`s once and
//! implements the `ContentModerator` trait from lifeline-core.
//!
//! Crisis evaluation:
//!
//! 1. High-risk tier. Any match returns immediately with `level = high`,
//!    counselor notification and the safety plan. Lower tiers are not
//!    consulted even if they would also match.
//! 2. Medium-risk tier. Every matching pattern is accumulated.
//! 3. Support-needed tier → `level = low`.
//! 4. Nothing matched → `detected = false`, `level = none`.
//!
//! Spam and inappropriate-content detection run independently of the crisis
//! tiers; `moderate` combines all three with the submitter's trust score.

use std::collections::HashSet;
use std::path::Path;

use regex::{Regex, RegexBuilder, RegexSet, RegexSetBuilder};
use tracing::debug;

use lifeline_contracts::{
    error::{LifelineError, LifelineResult},
    moderation::{Classification, InappropriateFinding, ModerationReport, RiskLevel, SpamFinding},
};
use lifeline_core::traits::ContentModerator;

use crate::patterns::{CrisisPattern, CrisisTier, PatternConfig, SpamConfig, DEFAULT_PATTERNS};

/// Default trust score below which every submission needs manual review.
pub const DEFAULT_REVIEW_FLOOR: f64 = 0.3;

#[derive(Debug)]
struct CompiledTier {
    set: RegexSet,
    patterns: Vec<CrisisPattern>,
    interventions: Vec<String>,
}

impl CompiledTier {
    fn compile(tier_name: &str, tier: CrisisTier) -> LifelineResult<Self> {
        let set = RegexSetBuilder::new(tier.patterns.iter().map(|p| p.regex.as_str()))
            .case_insensitive(true)
            .build()
            .map_err(|e| LifelineError::Config {
                reason: format!("invalid {} pattern: {}", tier_name, e),
            })?;
        Ok(Self {
            set,
            patterns: tier.patterns,
            interventions: tier.interventions,
        })
    }

    /// Matched patterns in declaration order.
    fn matches(&self, text: &str) -> Vec<&CrisisPattern> {
        self.set
            .matches(text)
            .into_iter()
            .map(|idx| &self.patterns[idx])
            .collect()
    }
}

#[derive(Debug)]
struct CompiledCategory {
    name: String,
    regex: Regex,
}

/// A `ContentModerator` driven by an immutable pattern configuration.
///
/// ```rust,ignore
/// use lifeline_classifier::RiskClassifier;
///
/// let classifier = RiskClassifier::with_defaults()?.with_review_floor(0.3);
/// ```
#[derive(Debug)]
pub struct RiskClassifier {
    high: CompiledTier,
    medium: CompiledTier,
    support: CompiledTier,
    links: Regex,
    spam: SpamConfig,
    inappropriate: Vec<CompiledCategory>,
    review_floor: f64,
}

impl RiskClassifier {
    /// Compile `config`. Returns `LifelineError::Config` for any invalid regex.
    pub fn from_config(config: PatternConfig) -> LifelineResult<Self> {
        let high = CompiledTier::compile("high_risk", config.high_risk)?;
        let medium = CompiledTier::compile("medium_risk", config.medium_risk)?;
        let support = CompiledTier::compile("support_needed", config.support_needed)?;

        let links = Regex::new(r"(?i)\b(?:https?://|www\.)\S+").map_err(|e| LifelineError::Config {
            reason: format!("invalid link pattern: {}", e),
        })?;

        let inappropriate = config
            .inappropriate
            .into_iter()
            .filter(|c| !c.terms.is_empty())
            .map(|category| {
                let alternation = category
                    .terms
                    .iter()
                    .map(|t| regex::escape(t))
                    .collect::<Vec<_>>()
                    .join("|");
                let regex = RegexBuilder::new(&format!(r"\b(?:{})\b", alternation))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| LifelineError::Config {
                        reason: format!("invalid terms for category '{}': {}", category.name, e),
                    })?;
                Ok(CompiledCategory {
                    name: category.name,
                    regex,
                })
            })
            .collect::<LifelineResult<Vec<_>>>()?;

        debug!(
            high = high.patterns.len(),
            medium = medium.patterns.len(),
            support = support.patterns.len(),
            categories = inappropriate.len(),
            "classifier patterns compiled"
        );

        Ok(Self {
            high,
            medium,
            support,
            links,
            spam: config.spam,
            inappropriate,
            review_floor: DEFAULT_REVIEW_FLOOR,
        })
    }

    /// Parse `s` as TOML and compile it.
    ///
    /// Returns `LifelineError::Config` if the TOML is malformed, does not
    /// match `PatternConfig`, or contains an invalid regex.
    pub fn from_toml_str(s: &str) -> LifelineResult<Self> {
        let config: PatternConfig = toml::from_str(s).map_err(|e| LifelineError::Config {
            reason: format!("failed to parse pattern TOML: {}", e),
        })?;
        Self::from_config(config)
    }

    pub fn from_file(path: &Path) -> LifelineResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LifelineError::Config {
            reason: format!("failed to read pattern file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// The built-in pattern set.
    pub fn with_defaults() -> LifelineResult<Self> {
        Self::from_toml_str(DEFAULT_PATTERNS)
    }

    /// Set the trust score below which content always needs review.
    pub fn with_review_floor(mut self, floor: f64) -> Self {
        self.review_floor = floor;
        self
    }

    pub fn detect_spam(&self, text: &str) -> SpamFinding {
        let mut reasons = Vec::new();

        let link_count = self.links.find_iter(text).count();
        if link_count > self.spam.max_links {
            reasons.push("excessive_links".to_string());
        }

        if longest_run(text) > self.spam.max_repeated_chars {
            reasons.push("repeated_characters".to_string());
        }

        let tokens: Vec<String> = text.split_whitespace().map(|t| t.to_lowercase()).collect();
        if tokens.len() >= self.spam.min_tokens_for_ratio && !tokens.is_empty() {
            let distinct = tokens.iter().collect::<HashSet<_>>().len();
            let ratio = distinct as f64 / tokens.len() as f64;
            if ratio < self.spam.min_type_token_ratio {
                reasons.push("low_lexical_diversity".to_string());
            }
        }

        SpamFinding {
            detected: !reasons.is_empty(),
            reasons,
            link_count,
        }
    }

    pub fn detect_inappropriate(&self, text: &str) -> InappropriateFinding {
        let mut categories = Vec::new();
        let mut terms = Vec::new();

        for category in &self.inappropriate {
            let mut hit = false;
            for m in category.regex.find_iter(text) {
                hit = true;
                let term = m.as_str().to_lowercase();
                if !terms.contains(&term) {
                    terms.push(term);
                }
            }
            if hit {
                categories.push(category.name.clone());
            }
        }

        InappropriateFinding {
            detected: !categories.is_empty(),
            categories,
            terms,
        }
    }

    fn tier_result(tier: &CompiledTier, level: RiskLevel, matched: &[&CrisisPattern]) -> Classification {
        Classification {
            detected: true,
            level,
            keywords: matched.iter().map(|p| p.name.clone()).collect(),
            suggested_interventions: tier.interventions.clone(),
            notify_counselors: level >= RiskLevel::Medium,
            trigger_safety_plan: level == RiskLevel::High,
            alert_type: matched.first().map(|p| p.alert_type),
        }
    }
}

impl ContentModerator for RiskClassifier {
    fn classify(&self, text: &str) -> Classification {
        if text.trim().is_empty() {
            return Classification::none();
        }

        let high = self.high.matches(text);
        if !high.is_empty() {
            return Self::tier_result(&self.high, RiskLevel::High, &high);
        }

        let medium = self.medium.matches(text);
        if !medium.is_empty() {
            return Self::tier_result(&self.medium, RiskLevel::Medium, &medium);
        }

        let support = self.support.matches(text);
        if !support.is_empty() {
            return Self::tier_result(&self.support, RiskLevel::Low, &support);
        }

        Classification::none()
    }

    fn moderate(&self, text: &str, trust_score: f64) -> ModerationReport {
        let crisis = self.classify(text);
        let spam = self.detect_spam(text);
        let inappropriate = self.detect_inappropriate(text);

        let mut review_reasons = Vec::new();
        if crisis.level == RiskLevel::High {
            review_reasons.push("high_risk_content".to_string());
        }
        if spam.detected {
            review_reasons.push("spam".to_string());
        }
        if inappropriate.detected {
            review_reasons.push("inappropriate_content".to_string());
        }
        if trust_score < self.review_floor {
            review_reasons.push("low_trust_score".to_string());
        }

        ModerationReport {
            requires_review: !review_reasons.is_empty(),
            review_reasons,
            crisis,
            spam,
            inappropriate,
        }
    }
}

/// Length of the longest run of one repeated character, ignoring whitespace.
fn longest_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if c.is_whitespace() {
            prev = None;
            current = 0;
            continue;
        }
        if Some(c) == prev {
            current += 1;
        } else {
            current = 1;
            prev = Some(c);
        }
        longest = longest.max(current);
    }
    longest
}
