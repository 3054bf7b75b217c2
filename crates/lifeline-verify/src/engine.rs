//! Schema-based command validator.
//!
//! `SchemaValidator` implements the `CommandValidator` trait from
//! `lifeline-core`. Validation runs in two phases:
//!
//! 1. **Structural**: the payload is validated against
//!    `CommandSchema::json_schema` using the `jsonschema` crate.
//! 2. **Semantic**: each `ValidationRule` in `CommandSchema::rules` is
//!    evaluated in order. All failures are collected before returning so the
//!    caller gets the full failure set in one pass.
//!
//! Custom rules delegate to named functions registered via `register_rule`.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use lifeline_contracts::{
    error::LifelineResult,
    validation::{CommandSchema, ValidationFailure, ValidationReport, ValidationRuleType},
};
use lifeline_core::traits::CommandValidator;

/// A caller-supplied validation function.
///
/// Receives the full payload. Returns `Some(message)` when the check fails,
/// or `None` on success.
pub type CustomRuleFn = Box<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Name of the built-in rule that rejects an UpdateAlert carrying no field.
pub const NON_EMPTY_UPDATE: &str = "non-empty-update";

/// The LIFELINE command validator.
pub struct SchemaValidator {
    custom_rules: HashMap<String, CustomRuleFn>,
}

impl SchemaValidator {
    /// Create a validator with no custom rules registered.
    pub fn new() -> Self {
        Self {
            custom_rules: HashMap::new(),
        }
    }

    /// A validator with the custom rules the built-in command schemas use.
    pub fn with_command_rules() -> Self {
        let mut validator = Self::new();
        validator.register_rule(
            NON_EMPTY_UPDATE,
            Box::new(|payload| {
                let populated = ["status", "handled_by", "notes", "actions"]
                    .iter()
                    .any(|key| match payload.get(*key) {
                        None | Some(Value::Null) => false,
                        Some(Value::Array(items)) => !items.is_empty(),
                        Some(_) => true,
                    });
                if populated {
                    None
                } else {
                    Some("update must change at least one field".to_string())
                }
            }),
        );
        validator
    }

    /// Register a custom validation function under `name`.
    ///
    /// Registering the same name twice replaces the previous function.
    pub fn register_rule(&mut self, name: impl Into<String>, f: CustomRuleFn) {
        self.custom_rules.insert(name.into(), f);
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    /// Resolve a dot-notation field path against a JSON value. Missing
    /// segments and JSON `null` both resolve to `None`.
    fn resolve_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
        let mut current = value;
        for segment in path.split('.') {
            match current.get(segment) {
                Some(v) if !v.is_null() => current = v,
                _ => return None,
            }
        }
        Some(current)
    }

    fn check_rule(&self, payload: &Value, rule_type: &ValidationRuleType) -> Option<String> {
        match rule_type {
            ValidationRuleType::RequiredField { field_path } => {
                if Self::resolve_path(payload, field_path).is_none() {
                    Some(format!("required field '{field_path}' is missing or null"))
                } else {
                    None
                }
            }

            // Absent and non-string fields pass; counting is by character.
            ValidationRuleType::MaxChars { field_path, max } => {
                let len = Self::resolve_path(payload, field_path)
                    .and_then(Value::as_str)
                    .map(|s| s.chars().count())?;
                if len > *max {
                    Some(format!(
                        "field '{field_path}' has {len} characters; at most {max} allowed"
                    ))
                } else {
                    None
                }
            }

            ValidationRuleType::NonBlankItems { field_path } => {
                let items = Self::resolve_path(payload, field_path).and_then(Value::as_array)?;
                let blank = items
                    .iter()
                    .position(|item| item.as_str().map_or(true, |s| s.trim().is_empty()));
                blank.map(|idx| format!("field '{field_path}' item {idx} is blank or not a string"))
            }

            // An unregistered name is itself a failure so misconfigured
            // schemas surface immediately.
            ValidationRuleType::Custom { function_name } => {
                match self.custom_rules.get(function_name.as_str()) {
                    Some(f) => f(payload),
                    None => Some(format!(
                        "no custom rule registered for function name '{function_name}'"
                    )),
                }
            }
        }
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::with_command_rules()
    }
}

impl CommandValidator for SchemaValidator {
    fn validate(&self, payload: &Value, schema: &CommandSchema) -> LifelineResult<ValidationReport> {
        let mut failures: Vec<ValidationFailure> = Vec::new();

        // ── Phase 1: JSON Schema structural validation ────────────────────────
        if !schema.json_schema.is_null() {
            match jsonschema::validator_for(&schema.json_schema) {
                Ok(validator) => {
                    for error in validator.iter_errors(payload) {
                        let message = format!(
                            "JSON Schema violation at {}: {}",
                            error.instance_path, error
                        );
                        debug!(schema_id = %schema.schema_id, %message, "structural validation failure");
                        failures.push(ValidationFailure {
                            rule_id: "json-schema".to_string(),
                            message,
                        });
                    }
                }
                Err(e) => {
                    let message = format!("invalid JSON Schema document: {e}");
                    warn!(schema_id = %schema.schema_id, %message, "schema compilation failure");
                    failures.push(ValidationFailure {
                        rule_id: "json-schema".to_string(),
                        message,
                    });
                }
            }
        }

        // ── Phase 2: Semantic rule evaluation ────────────────────────────────
        for rule in &schema.rules {
            if let Some(message) = self.check_rule(payload, &rule.rule_type) {
                debug!(rule_id = %rule.rule_id, %message, "semantic rule failed");
                failures.push(ValidationFailure {
                    rule_id: rule.rule_id.clone(),
                    message,
                });
            }
        }

        let passed = failures.is_empty();
        debug!(
            schema_id = %schema.schema_id,
            passed,
            failure_count = failures.len(),
            "command validation complete"
        );

        Ok(ValidationReport { passed, failures })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
