//! Scenario: crisis post, accept race, resolution.
//!
//!   1. Two counselors connect to the crisis channel
//!   2. A member posts high-risk content → critical alert, held for review
//!   3. Both counselors receive `alert_created`
//!   4. Both try to accept at the same moment → exactly one wins; the other
//!      is told who holds the alert
//!   5. The winner resolves the alert with notes
//!   6. Events, trust feedback and the audit chain are checked

use std::thread;
use std::time::Duration;

use lifeline_contracts::{
    alert::SafetyAlert,
    error::{LifelineError, LifelineResult},
    realtime::ChannelMessage,
};
use lifeline_core::traits::{AlertRepository, TrustLedger};

use crate::{
    config::ServiceConfig,
    mock_data::{counselor, member, COUNSELOR_A, COUNSELOR_B, CRISIS_POST, MEMBER_IN_CRISIS},
    scenarios::{collect_events, describe, start_service},
};

/// What the scenario observed, for tests.
#[derive(Debug)]
pub struct CrisisReport {
    pub alert: SafetyAlert,
    pub winner: String,
    pub loser_error: String,
    /// Holder named in the loser's conflict error.
    pub reported_holder: Option<String>,
    pub events_a: Vec<ChannelMessage>,
    pub events_b: Vec<ChannelMessage>,
    pub audit_intact: bool,
}

pub async fn run_scenario() -> LifelineResult<CrisisReport> {
    println!("=== Scenario: Crisis Escalation ===");
    println!();

    let service = start_service(&ServiceConfig::default())?;
    let sam = counselor(COUNSELOR_A);
    let quinn = counselor(COUNSELOR_B);

    let mut conn_a = service.connect(&sam)?;
    let mut conn_b = service.connect(&quinn)?;
    println!("  [1] {} and {} connected to crisis-alerts", COUNSELOR_A, COUNSELOR_B);

    let outcome = service.submit_content(&member(MEMBER_IN_CRISIS), CRISIS_POST)?;
    let alert = outcome.alert.ok_or_else(|| LifelineError::validation("crisis post raised no alert"))?;
    println!(
        "  [2] Post classified {:?} (keywords: {:?}); alert {} severity={} held_for_review={}",
        outcome.moderation.crisis.level,
        outcome.moderation.crisis.keywords,
        alert.id,
        alert.severity,
        outcome.held_for_review
    );

    let created_a = collect_events(&mut conn_a, Duration::from_millis(100)).await;
    let created_b = collect_events(&mut conn_b, Duration::from_millis(100)).await;
    println!(
        "  [3] alert_created delivered: {}={} {}={}",
        COUNSELOR_A,
        created_a.len(),
        COUNSELOR_B,
        created_b.len()
    );

    let workflow = service.workflow();
    let (result_a, result_b) = thread::scope(|s| {
        let a = s.spawn(|| workflow.accept(&sam, alert.id));
        let b = s.spawn(|| workflow.accept(&quinn, alert.id));
        (a.join(), b.join())
    });
    let result_a = result_a.map_err(|_| LifelineError::validation("accept thread panicked"))?;
    let result_b = result_b.map_err(|_| LifelineError::validation("accept thread panicked"))?;

    let (winner, loser, loser_error) = match (result_a, result_b) {
        (Ok(_), Err(e)) => (sam.clone(), quinn.clone(), e),
        (Err(e), Ok(_)) => (quinn.clone(), sam.clone(), e),
        (Ok(_), Ok(_)) => {
            return Err(LifelineError::validation("both accepts succeeded"));
        }
        (Err(a), Err(_)) => return Err(a),
    };
    println!("  [4] {} accepted the alert", winner.user_id);
    println!("      {} was refused: {}", loser.user_id, loser_error);
    let reported_holder = match &loser_error {
        LifelineError::Conflict { holder, .. } => holder.clone(),
        _ => None,
    };
    println!("      holder reported to the loser: {:?}", reported_holder);

    let resolved = service.workflow().resolve(
        &winner,
        alert.id,
        Some("Spoke with the member; safety plan in place and follow-up booked.".to_string()),
    )?;
    println!(
        "  [5] Resolved by {} at {:?}",
        winner.user_id,
        resolved.handled_at.map(|t| t.to_rfc3339())
    );

    let mut events_a = created_a;
    events_a.extend(collect_events(&mut conn_a, Duration::from_millis(100)).await);
    let mut events_b = created_b;
    events_b.extend(collect_events(&mut conn_b, Duration::from_millis(100)).await);
    for frame in &events_a {
        println!("      {} <- {}", COUNSELOR_A, describe(frame));
    }
    for frame in &events_b {
        println!("      {} <- {}", COUNSELOR_B, describe(frame));
    }

    let audit_intact = service.verify_audit_chain()?;
    let trust = service.trust_ledger().metric(&member(MEMBER_IN_CRISIS).user_id);
    println!(
        "  [6] Audit entries: {}, chain intact: {}; member trust score {:.2}",
        service.audit_store().len(),
        audit_intact,
        trust.score
    );
    println!();

    let final_alert = service.alert_store().get(alert.id)?;
    let report = CrisisReport {
        alert: final_alert,
        winner: winner.user_id.to_string(),
        loser_error: loser_error.to_string(),
        reported_holder,
        events_a,
        events_b,
        audit_intact,
    };
    drop(conn_a);
    drop(conn_b);
    service.shutdown()?;
    Ok(report)
}
