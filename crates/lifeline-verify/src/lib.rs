//! # lifeline-verify
//!
//! Command payload validation for LIFELINE.
//!
//! This crate provides [`engine::SchemaValidator`], which implements the
//! [`lifeline_core::traits::CommandValidator`] trait, and the built-in
//! [`schemas`] for the CreateAlert, UpdateAlert and ListAlerts commands.
//! Payloads are validated in two phases:
//!
//! 1. **Structural**: JSON Schema validation via the `jsonschema` crate.
//! 2. **Semantic**: rules JSON Schema cannot express (`RequiredField`,
//!    `MaxChars`, `NonBlankItems`, `Custom`).
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use lifeline_verify::{engine::SchemaValidator, schemas};
//!
//! let validator = SchemaValidator::with_command_rules();
//! let report = validator.validate(&payload, &schemas::create_alert())?;
//! ```

pub mod engine;
pub mod schemas;

pub use engine::SchemaValidator;
