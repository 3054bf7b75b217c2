//! # lifeline-service
//!
//! The assembled LIFELINE pipeline: classifier, rate limiter, alert store,
//! workflow controller, buffered audit logger and real-time dispatcher,
//! wired together behind [`AlertService`].
//!
//! Four reference scenarios drive the service end to end with fictional
//! users and posts:
//!
//! 1. **Crisis Escalation**: a high-risk post raises a critical alert, two
//!    counselors race to accept it and exactly one wins.
//! 2. **Benign Post**: everyday and support-tier posts publish without
//!    reaching a counselor.
//! 3. **Rate Limiting**: a chatty member is throttled, but a crisis post in
//!    the same window still raises its alert.
//! 4. **Audit Review**: role-gated audit queries, break-glass access to
//!    sealed details and tamper detection.
//!
//! All data is fictional. Nothing leaves the process.

pub mod adapters;
pub mod config;
pub mod mock_data;
pub mod scenarios;
pub mod service;

pub use adapters::{StaticUserDirectory, TracingNotifier};
pub use config::ServiceConfig;
pub use service::{AlertService, CreateAlertRequest, ListAlertsQuery, UpdateAlertRequest};
