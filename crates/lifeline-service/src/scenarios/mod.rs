//! Reference scenarios.
//!
//! Each scenario starts a fresh `AlertService` with the fictional users
//! from `mock_data`, drives it through one end-to-end flow and prints what
//! happened at each step. They double as executable documentation for the
//! demo CLI.

pub mod audit_review;
pub mod benign_post;
pub mod crisis_escalation;
pub mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use lifeline_contracts::{error::LifelineResult, realtime::ChannelMessage};
use lifeline_realtime::Connection;

use crate::{adapters::TracingNotifier, config::ServiceConfig, mock_data, service::AlertService};

/// Start a service over the mock directory with default settings.
pub fn start_service(config: &ServiceConfig) -> LifelineResult<AlertService> {
    AlertService::start(
        config,
        Arc::new(mock_data::directory()),
        Arc::new(TracingNotifier::new()),
        None,
    )
}

/// Collect alert frames until none arrives for `quiet`. Pings are answered
/// and skipped; every collected frame is acknowledged.
pub async fn collect_events(conn: &mut Connection, quiet: Duration) -> Vec<ChannelMessage> {
    let mut frames = Vec::new();
    while let Ok(Some(frame)) = tokio::time::timeout(quiet, conn.next_event()).await {
        // Best effort: an ack the dispatcher never sees only expires.
        let _ = conn.ack(&frame.id);
        frames.push(frame);
    }
    frames
}

/// One line per frame, as printed by the scenarios.
pub(crate) fn describe(frame: &ChannelMessage) -> String {
    let status = frame.payload["alert"]["status"].as_str().unwrap_or("?");
    let severity = frame.payload["alert"]["severity"].as_str().unwrap_or("?");
    let handler = frame.payload["alert"]["handled_by"]
        .as_str()
        .unwrap_or("-");
    format!(
        "{:?}: status={} severity={} handled_by={}",
        frame.kind, status, severity, handler
    )
}
