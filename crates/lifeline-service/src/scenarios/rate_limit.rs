//! Scenario: the rate limiter gates the feed, never crisis detection.
//!
//!   1. A member posts up to the per-minute limit → all admitted
//!   2. One more everyday post → `RateLimited`
//!   3. A crisis post in the same window → withheld from the feed, but the
//!      alert is still raised

use lifeline_contracts::{
    error::{LifelineError, LifelineResult},
    config::LifelineConfig,
};

use crate::{
    config::ServiceConfig,
    mock_data::{member, BENIGN_POST, CRISIS_POST, MEMBER_CHATTY},
    scenarios::start_service,
};

#[derive(Debug)]
pub struct RateLimitReport {
    pub limit: u32,
    pub admitted: u32,
    pub rejection: Option<String>,
    pub throttled_crisis_raised_alert: bool,
}

pub async fn run_scenario() -> LifelineResult<RateLimitReport> {
    println!("=== Scenario: Rate Limiting ===");
    println!();

    let limit = 3;
    let config = ServiceConfig {
        pipeline: LifelineConfig {
            rate_limit_per_minute: limit,
            ..Default::default()
        },
        ..Default::default()
    };
    let service = start_service(&config)?;
    let riley = member(MEMBER_CHATTY);

    let mut admitted = 0;
    for n in 1..=limit {
        let outcome = service.submit_content(&riley, BENIGN_POST)?;
        if outcome.admitted {
            admitted += 1;
        }
        println!("  [1] Post {} of {}: admitted={}", n, limit, outcome.admitted);
    }

    let rejection = match service.submit_content(&riley, BENIGN_POST) {
        Err(e @ LifelineError::RateLimited { .. }) => {
            println!("  [2] Post {}: {}", limit + 1, e);
            Some(e.to_string())
        }
        Err(e) => return Err(e),
        Ok(outcome) => {
            println!("  [2] Post {} unexpectedly admitted={}", limit + 1, outcome.admitted);
            None
        }
    };

    let crisis = service.submit_content(&riley, CRISIS_POST)?;
    println!(
        "  [3] Crisis post while throttled: admitted={} alert={}",
        crisis.admitted,
        crisis.alert.as_ref().map(|a| a.id.to_string()).unwrap_or_default()
    );
    println!();

    let report = RateLimitReport {
        limit,
        admitted,
        rejection,
        throttled_crisis_raised_alert: !crisis.admitted && crisis.alert.is_some(),
    };
    service.shutdown()?;
    Ok(report)
}
