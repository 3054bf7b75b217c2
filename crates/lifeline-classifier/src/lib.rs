//! # lifeline-classifier
//!
//! A deterministic, pattern-based content classifier for LIFELINE.
//!
//! ## Overview
//!
//! [`RiskClassifier`] implements the
//! [`ContentModerator`](lifeline_core::traits::ContentModerator) trait.
//! Crisis patterns are declared in TOML tiers, compiled once into
//! `RegexSet`s, and evaluated high → medium → support. High-risk matches win
//! outright.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use lifeline_classifier::RiskClassifier;
//!
//! let classifier = RiskClassifier::from_file(Path::new("patterns/crisis.toml"))?;
//! // Or use the built-in set:
//! let classifier = RiskClassifier::with_defaults()?;
//! ```

pub mod engine;
pub mod patterns;

pub use engine::RiskClassifier;
pub use patterns::{CrisisPattern, CrisisTier, PatternConfig, SpamConfig, TermCategory};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use lifeline_contracts::{
        alert::AlertType, error::LifelineError, moderation::RiskLevel,
    };
    use lifeline_core::traits::ContentModerator;

    use crate::RiskClassifier;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn classifier() -> RiskClassifier {
        RiskClassifier::with_defaults().expect("built-in patterns must compile")
    }

    // ── 1. crisis tiers ───────────────────────────────────────────────────────

    /// High-risk language wins even when medium and support patterns also
    /// match the same text.
    #[test]
    fn test_high_risk_takes_precedence() {
        let result = classifier()
            .classify("I feel hopeless, I need help, and I want to end it all");

        assert!(result.detected);
        assert_eq!(result.level, RiskLevel::High);
        assert!(result.notify_counselors);
        assert!(result.trigger_safety_plan);
        assert_eq!(result.keywords, vec!["end_it_all".to_string()]);
        assert!(!result.suggested_interventions.is_empty());
    }

    #[test]
    fn test_crisis_sentence_is_high_risk() {
        let result = classifier().classify("I can't go on, I want to kill myself");
        assert_eq!(result.level, RiskLevel::High);
        assert_eq!(result.alert_type, Some(AlertType::SuicideIdeation));
    }

    /// Medium-risk matches accumulate in declaration order.
    #[test]
    fn test_medium_risk_accumulates() {
        let result = classifier().classify("Everything feels hopeless and I am worthless");

        assert_eq!(result.level, RiskLevel::Medium);
        assert_eq!(
            result.keywords,
            vec!["hopeless".to_string(), "worthless".to_string()]
        );
        assert!(result.notify_counselors);
        assert!(!result.trigger_safety_plan);
    }

    #[test]
    fn test_support_needed_is_low() {
        let result = classifier().classify("Exams have me overwhelmed, I need some help");
        assert_eq!(result.level, RiskLevel::Low);
        assert!(!result.notify_counselors);
    }

    #[test]
    fn test_no_match_is_none() {
        let c = classifier();
        for text in ["Had a great day at work today", "", "   \n\t"] {
            let result = c.classify(text);
            assert!(!result.detected, "unexpected detection for {text:?}");
            assert_eq!(result.level, RiskLevel::None);
            assert!(result.keywords.is_empty());
        }
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let result = classifier().classify("I WANT TO KILL MYSELF");
        assert_eq!(result.level, RiskLevel::High);
    }

    /// The first matching pattern decides the alert type.
    #[test]
    fn test_alert_type_follows_first_pattern() {
        let result = classifier().classify("I keep cutting myself at night");
        assert_eq!(result.alert_type, Some(AlertType::SelfHarm));
    }

    // ── 2. spam ───────────────────────────────────────────────────────────────

    #[test]
    fn test_spam_excessive_links() {
        let text = "deals http://a.example http://b.example www.c.example https://d.example";
        let finding = classifier().detect_spam(text);
        assert!(finding.detected);
        assert_eq!(finding.link_count, 4);
        assert!(finding.reasons.contains(&"excessive_links".to_string()));
    }

    #[test]
    fn test_spam_repeated_characters() {
        let finding = classifier().detect_spam("heyyyyyyyyyyyyyy everyone");
        assert!(finding.reasons.contains(&"repeated_characters".to_string()));
    }

    #[test]
    fn test_spam_low_lexical_diversity() {
        let finding = classifier().detect_spam(&"buy ".repeat(12));
        assert!(finding.reasons.contains(&"low_lexical_diversity".to_string()));
    }

    #[test]
    fn test_ordinary_text_is_not_spam() {
        let finding = classifier().detect_spam("Went for a walk with my sister this morning");
        assert!(!finding.detected);
    }

    // ── 3. inappropriate content ──────────────────────────────────────────────

    #[test]
    fn test_inappropriate_terms_are_categorised() {
        let finding = classifier().detect_inappropriate("Shut up, you idiot");
        assert!(finding.detected);
        assert_eq!(finding.categories, vec!["harassment".to_string()]);
        assert!(finding.terms.contains(&"idiot".to_string()));
    }

    /// Terms only match on word boundaries.
    #[test]
    fn test_inappropriate_requires_word_boundary() {
        let finding = classifier().detect_inappropriate("The idiomatic solution works");
        assert!(!finding.detected);
    }

    // ── 4. moderation ─────────────────────────────────────────────────────────

    #[test]
    fn test_high_risk_requires_review() {
        let report = classifier().moderate("I want to kill myself", 0.9);
        assert!(report.requires_review);
        assert!(report.is_safe(), "crisis content is handled, not suppressed");
        assert_eq!(report.review_reasons, vec!["high_risk_content".to_string()]);
    }

    #[test]
    fn test_low_trust_requires_review() {
        let c = classifier().with_review_floor(0.3);
        assert!(!c.moderate("Nice weather today", 0.5).requires_review);

        let report = c.moderate("Nice weather today", 0.1);
        assert!(report.requires_review);
        assert_eq!(report.review_reasons, vec!["low_trust_score".to_string()]);
    }

    // ── 5. configuration ──────────────────────────────────────────────────────

    /// Injected configuration replaces the built-in patterns entirely.
    #[test]
    fn test_custom_patterns() {
        let toml = r#"
            [high_risk]
            interventions = ["call now"]

            [[high_risk.patterns]]
            name = "bridge"
            regex = '\bon the bridge\b'
            alert_type = "suicide_ideation"
        "#;

        let c = RiskClassifier::from_toml_str(toml).unwrap();
        assert_eq!(c.classify("I'm standing on the bridge").level, RiskLevel::High);
        assert_eq!(c.classify("I want to kill myself").level, RiskLevel::None);
    }

    /// A pattern without `alert_type` defaults to `other`.
    #[test]
    fn test_pattern_alert_type_defaults_to_other() {
        let toml = r#"
            [[support_needed.patterns]]
            name = "help"
            regex = 'help'
        "#;
        let c = RiskClassifier::from_toml_str(toml).unwrap();
        assert_eq!(c.classify("help").alert_type, Some(AlertType::Other));
    }

    #[test]
    fn test_toml_parse_error() {
        match RiskClassifier::from_toml_str("this is not valid toml ][[[") {
            Err(LifelineError::Config { reason }) => {
                assert!(
                    reason.contains("failed to parse pattern TOML"),
                    "unexpected reason: {reason}"
                );
            }
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_regex_is_config_error() {
        let toml = r#"
            [[medium_risk.patterns]]
            name = "broken"
            regex = '(unclosed'
        "#;
        match RiskClassifier::from_toml_str(toml) {
            Err(LifelineError::Config { reason }) => assert!(reason.contains("medium_risk")),
            other => panic!("expected Config error, got {:?}", other),
        }
    }
}
