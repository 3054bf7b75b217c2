//! Service configuration file.
//!
//! ```toml
//! [pipeline]
//! rate_limit_per_minute = 10
//! alert_severity_threshold = "high"
//!
//! [classifier]
//! patterns_file = "patterns/custom.toml"
//!
//! [audit]
//! key_id = "audit-2026-01"
//! key_hex = "…64 hex chars…"
//! ```
//!
//! Every section and key is optional. Without an `[audit]` key a random
//! per-process key is generated, which is only suitable for demos.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lifeline_contracts::{
    config::LifelineConfig,
    error::{LifelineError, LifelineResult},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub pipeline: LifelineConfig,
    pub classifier: ClassifierSection,
    pub audit: AuditSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSection {
    /// Replaces the built-in pattern set.
    pub patterns_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    pub key_id: String,
    /// 32-byte ChaCha20-Poly1305 key, hex encoded.
    pub key_hex: Option<String>,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            key_id: "ephemeral".to_string(),
            key_hex: None,
        }
    }
}

impl ServiceConfig {
    /// Parse `s` as TOML and validate the pipeline section.
    pub fn from_toml_str(s: &str) -> LifelineResult<Self> {
        let config: ServiceConfig = toml::from_str(s).map_err(|e| LifelineError::Config {
            reason: format!("failed to parse service TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> LifelineResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LifelineError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> LifelineResult<()> {
        self.pipeline.validate()?;
        if self.audit.key_id.trim().is_empty() {
            return Err(LifelineError::Config {
                reason: "audit.key_id must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lifeline_contracts::{alert::Severity, error::LifelineError};

    use super::ServiceConfig;

    #[test]
    fn empty_file_yields_defaults() {
        let config = ServiceConfig::from_toml_str("").unwrap();
        assert_eq!(config.pipeline.rate_limit_per_minute, 10);
        assert_eq!(config.pipeline.alert_severity_threshold, Severity::High);
        assert!(config.classifier.patterns_file.is_none());
        assert!(config.audit.key_hex.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let config = ServiceConfig::from_toml_str(
            r#"
            [pipeline]
            rateLimitPerMinute = 3
            alert_severity_threshold = "medium"

            [audit]
            key_id = "audit-1"
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.rate_limit_per_minute, 3);
        assert_eq!(config.pipeline.alert_severity_threshold, Severity::Medium);
        assert_eq!(config.audit.key_id, "audit-1");
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let err = ServiceConfig::from_toml_str("[pipeline]\nrate_limit_per_minute = 0\n").unwrap_err();
        assert!(matches!(err, LifelineError::Config { .. }));

        let err = ServiceConfig::from_toml_str("[pipeline\n").unwrap_err();
        match err {
            LifelineError::Config { reason } => assert!(reason.contains("failed to parse")),
            other => panic!("expected Config, got {:?}", other),
        }
    }

    #[test]
    fn bundled_sample_config_is_valid() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/lifeline.toml");
        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.pipeline.instance_id, "lifeline-dev-1");
        assert_eq!(config.audit.key_id, "dev-local");
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = ServiceConfig::from_file(std::path::Path::new("/nonexistent/lifeline.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/lifeline.toml"));
    }
}
