//! Scenario: ordinary posts never reach counselors.
//!
//!   1. A counselor connects
//!   2. A member posts everyday content → published, no alert
//!   3. Another member posts support-tier content → published, below the
//!      alert threshold, still no alert
//!   4. The counselor's queue and live channel are both empty

use std::time::Duration;

use lifeline_contracts::error::LifelineResult;
use lifeline_core::workflow::SubmissionOutcome;

use crate::{
    config::ServiceConfig,
    mock_data::{counselor, member, BENIGN_POST, COUNSELOR_A, MEMBER_CHATTY, MEMBER_SUPPORT, SUPPORT_POST},
    scenarios::{collect_events, start_service},
    service::ListAlertsQuery,
};

#[derive(Debug)]
pub struct BenignReport {
    pub benign: SubmissionOutcome,
    pub support: SubmissionOutcome,
    pub events_delivered: usize,
    pub queue_total: u64,
}

pub async fn run_scenario() -> LifelineResult<BenignReport> {
    println!("=== Scenario: Benign Post ===");
    println!();

    let service = start_service(&ServiceConfig::default())?;
    let sam = counselor(COUNSELOR_A);
    let mut conn = service.connect(&sam)?;
    println!("  [1] {} connected", COUNSELOR_A);

    let benign = service.submit_content(&member(MEMBER_CHATTY), BENIGN_POST)?;
    println!(
        "  [2] Everyday post: level={:?} published={} alert={}",
        benign.moderation.crisis.level,
        benign.published,
        benign.alert.is_some()
    );

    let support = service.submit_content(&member(MEMBER_SUPPORT), SUPPORT_POST)?;
    println!(
        "  [3] Support post: level={:?} interventions={:?} alert={}",
        support.moderation.crisis.level,
        support.moderation.crisis.suggested_interventions,
        support.alert.is_some()
    );

    let events = collect_events(&mut conn, Duration::from_millis(150)).await;
    let queue = service.list_alerts(&sam, &ListAlertsQuery::default())?;
    println!(
        "  [4] Live events received: {}; alerts in queue: {}",
        events.len(),
        queue.total
    );
    println!();

    let report = BenignReport {
        benign,
        support,
        events_delivered: events.len(),
        queue_total: queue.total,
    };
    drop(conn);
    service.shutdown()?;
    Ok(report)
}
