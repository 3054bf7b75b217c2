//! Command payload validation schema and report types.
//!
//! Every command entering the service surface (CreateAlert, UpdateAlert,
//! ListAlerts) is checked against a `CommandSchema` before it reaches the
//! workflow. A failing `ValidationReport` becomes `LifelineError::Validation`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The schema a command payload is checked against: a JSON Schema document
/// for structure plus semantic rules JSON Schema cannot express.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSchema {
    /// Unique identifier, e.g. "create-alert-v1".
    pub schema_id: String,
    pub json_schema: Value,
    pub rules: Vec<ValidationRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRule {
    pub rule_id: String,
    pub description: String,
    pub rule_type: ValidationRuleType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ValidationRuleType {
    /// The field must be present and non-null.
    RequiredField { field_path: String },

    /// The string field must not exceed `max` characters (not bytes).
    MaxChars { field_path: String, max: usize },

    /// Every string in the array field must be non-blank.
    NonBlankItems { field_path: String },

    /// Delegate to a function registered by the hosting service.
    Custom { function_name: String },
}

/// Outcome of validating one payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    /// Join all failure messages into one human-readable reason.
    pub fn reason(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("{}: {}", f.rule_id, f.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub rule_id: String,
    pub message: String,
}
