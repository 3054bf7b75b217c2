//! Built-in command schemas.
//!
//! Optional fields accept JSON `null` so request structs can be serialized
//! directly without skipping `None` values.

use serde_json::{json, Value};

use lifeline_contracts::{
    alert::{MAX_ACTIONS_PER_UPDATE, MAX_CONTEXT_CHARS, MAX_INDICATORS, MAX_NOTES_CHARS},
    validation::{CommandSchema, ValidationRule, ValidationRuleType},
};

use crate::engine::NON_EMPTY_UPDATE;

const ALERT_TYPES: [&str; 6] = [
    "self_harm",
    "suicide_ideation",
    "substance_abuse",
    "domestic_violence",
    "crisis_content",
    "other",
];

const STATUSES: [&str; 6] = [
    "new",
    "acknowledged",
    "in_progress",
    "resolved",
    "escalated",
    "false_positive",
];

const SEVERITIES: [&str; 4] = ["low", "medium", "high", "critical"];

/// The given values plus `null`.
fn nullable(values: &[&str]) -> Vec<Value> {
    values
        .iter()
        .map(|v| Value::from(*v))
        .chain(std::iter::once(Value::Null))
        .collect()
}

fn rule(rule_id: &str, description: &str, rule_type: ValidationRuleType) -> ValidationRule {
    ValidationRule {
        rule_id: rule_id.to_string(),
        description: description.to_string(),
        rule_type,
    }
}

/// CreateAlert: type, severity on the 1..=5 scale, subject, context and
/// 1..=20 indicators.
pub fn create_alert() -> CommandSchema {
    CommandSchema {
        schema_id: "create-alert-v1".to_string(),
        json_schema: json!({
            "type": "object",
            "properties": {
                "type": { "enum": ALERT_TYPES },
                "severity": { "type": "integer", "minimum": 1, "maximum": 5 },
                "subject_user_id": { "type": "string", "minLength": 1 },
                "context": { "type": "string", "minLength": 1 },
                "indicators": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": MAX_INDICATORS,
                    "items": { "type": "string" }
                }
            },
            "required": ["type", "severity", "subject_user_id", "context", "indicators"]
        }),
        rules: vec![
            rule(
                "context-length",
                "context is an excerpt of at most 1000 characters",
                ValidationRuleType::MaxChars {
                    field_path: "context".to_string(),
                    max: MAX_CONTEXT_CHARS,
                },
            ),
            rule(
                "indicators-non-blank",
                "every indicator names a matched keyword or pattern",
                ValidationRuleType::NonBlankItems {
                    field_path: "indicators".to_string(),
                },
            ),
        ],
    }
}

/// UpdateAlert: every field optional, but at least one must be set.
pub fn update_alert() -> CommandSchema {
    CommandSchema {
        schema_id: "update-alert-v1".to_string(),
        json_schema: json!({
            "type": "object",
            "properties": {
                "status": { "enum": nullable(&STATUSES) },
                "handled_by": { "type": ["string", "null"], "minLength": 1 },
                "notes": { "type": ["string", "null"] },
                "actions": {
                    "type": ["array", "null"],
                    "maxItems": MAX_ACTIONS_PER_UPDATE,
                    "items": { "type": "string" }
                }
            },
            "additionalProperties": false
        }),
        rules: vec![
            rule(
                "notes-length",
                "notes are limited to 2000 characters",
                ValidationRuleType::MaxChars {
                    field_path: "notes".to_string(),
                    max: MAX_NOTES_CHARS,
                },
            ),
            rule(
                "actions-non-blank",
                "appended action tags must not be blank",
                ValidationRuleType::NonBlankItems {
                    field_path: "actions".to_string(),
                },
            ),
            rule(
                "update-not-empty",
                "an update must change something",
                ValidationRuleType::Custom {
                    function_name: NON_EMPTY_UPDATE.to_string(),
                },
            ),
        ],
    }
}

/// ListAlerts: filters plus a 1-based page whose size is capped at
/// `max_page_size`.
pub fn list_alerts(max_page_size: u32) -> CommandSchema {
    CommandSchema {
        schema_id: "list-alerts-v1".to_string(),
        json_schema: json!({
            "type": "object",
            "properties": {
                "severity": { "type": "array", "items": { "enum": SEVERITIES } },
                "status": { "type": "array", "items": { "enum": STATUSES } },
                "subject_user_id": { "type": ["string", "null"] },
                "handled_by": { "type": ["string", "null"] },
                "handled": { "type": ["boolean", "null"] },
                "date_from": { "type": ["string", "null"] },
                "date_to": { "type": ["string", "null"] },
                "page": { "type": "integer", "minimum": 1 },
                "limit": { "type": "integer", "minimum": 1, "maximum": max_page_size }
            }
        }),
        rules: vec![],
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use lifeline_core::traits::CommandValidator;

    use crate::SchemaValidator;

    fn valid_create() -> serde_json::Value {
        json!({
            "type": "self_harm",
            "severity": 4,
            "subject_user_id": "member-1",
            "context": "posted in the evening check-in thread",
            "indicators": ["self_harm"]
        })
    }

    #[test]
    fn create_alert_accepts_valid_payload() {
        let report = SchemaValidator::default()
            .validate(&valid_create(), &super::create_alert())
            .unwrap();
        assert!(report.passed, "failures: {:?}", report.failures);
    }

    #[test]
    fn create_alert_rejects_out_of_range_severity_and_empty_indicators() {
        let mut payload = valid_create();
        payload["severity"] = json!(0);
        payload["indicators"] = json!([]);

        let report = SchemaValidator::default()
            .validate(&payload, &super::create_alert())
            .unwrap();
        assert!(!report.passed);
        assert!(report.failures.len() >= 2);
    }

    #[test]
    fn create_alert_rejects_long_context() {
        let mut payload = valid_create();
        payload["context"] = json!("x".repeat(1001));

        let report = SchemaValidator::default()
            .validate(&payload, &super::create_alert())
            .unwrap();
        assert!(report.failures.iter().any(|f| f.rule_id == "context-length"));
    }

    #[test]
    fn update_alert_requires_a_change() {
        let validator = SchemaValidator::default();
        let schema = super::update_alert();

        let empty = json!({ "status": null, "handled_by": null, "notes": null, "actions": null });
        assert!(!validator.validate(&empty, &schema).unwrap().passed);

        let resolve = json!({ "status": "resolved", "handled_by": null, "notes": "safe", "actions": null });
        let report = validator.validate(&resolve, &schema).unwrap();
        assert!(report.passed, "failures: {:?}", report.failures);
    }

    #[test]
    fn update_alert_rejects_unknown_status() {
        let report = SchemaValidator::default()
            .validate(&json!({ "status": "closed" }), &super::update_alert())
            .unwrap();
        assert!(!report.passed);
    }

    #[test]
    fn list_alerts_caps_page_size() {
        let validator = SchemaValidator::default();
        let schema = super::list_alerts(100);

        let ok = json!({ "status": ["new"], "page": 1, "limit": 100 });
        assert!(validator.validate(&ok, &schema).unwrap().passed);

        let too_big = json!({ "page": 1, "limit": 101 });
        assert!(!validator.validate(&too_big, &schema).unwrap().passed);
    }
}
