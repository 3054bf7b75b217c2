//! # lifeline-core
//!
//! The alert workflow for LIFELINE.
//!
//! This crate provides:
//! - The component traits (`ContentModerator`, `AlertRepository`,
//!   `AuditLogger`, `AlertPublisher`, `TrustLedger`, ...)
//! - The `WorkflowController` that wires them together in pipeline order
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lifeline_core::{WorkflowController, workflow::{WorkflowComponents, WorkflowSettings}};
//! ```

pub mod traits;
pub mod workflow;

pub use workflow::WorkflowController;
