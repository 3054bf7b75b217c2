//! In-memory implementation of `TrustLedger`.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tracing::debug;

use lifeline_contracts::{
    error::{LifelineError, LifelineResult},
    identity::UserId,
    trust::{TrustAction, TrustMetric},
};
use lifeline_core::traits::TrustLedger;

/// Trust metrics keyed by user. Users without a record read as neutral.
#[derive(Default)]
pub struct InMemoryTrustLedger {
    metrics: Mutex<HashMap<UserId, TrustMetric>>,
}

impl InMemoryTrustLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrustLedger for InMemoryTrustLedger {
    fn score(&self, user_id: &UserId) -> f64 {
        self.metric(user_id).score
    }

    fn metric(&self, user_id: &UserId) -> TrustMetric {
        // Reads tolerate a poisoned lock: a stale score is better than
        // failing moderation.
        let metrics = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
        metrics
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| TrustMetric::neutral(user_id.clone()))
    }

    fn adjust(
        &self,
        user_id: &UserId,
        action: TrustAction,
        weight: f64,
    ) -> LifelineResult<TrustMetric> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(LifelineError::validation(format!(
                "trust weight must be a finite, non-negative number; got {}",
                weight
            )));
        }

        let mut metrics = self
            .metrics
            .lock()
            .map_err(|e| LifelineError::lock_poisoned("trust ledger", e))?;
        let metric = metrics
            .entry(user_id.clone())
            .or_insert_with(|| TrustMetric::neutral(user_id.clone()));
        let applied = metric.apply(action, action.base_delta() * weight, Utc::now());

        debug!(
            user_id = %user_id,
            action = action.as_str(),
            applied,
            score = metric.score,
            "trust score adjusted"
        );
        Ok(metric.clone())
    }
}
