//! Runtime configuration schema.
//!
//! Every key is optional; missing keys take the defaults below. Keys are
//! snake_case, and the camelCase spellings used by the platform's existing
//! settings files are accepted as aliases.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    alert::Severity,
    error::{LifelineError, LifelineResult},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifelineConfig {
    /// Submissions admitted to the feed per user per 60-second window.
    #[serde(alias = "rateLimitPerMinute")]
    pub rate_limit_per_minute: u32,

    /// Upper bound on `limit` for alert list queries.
    #[serde(alias = "alertListMaxPageSize")]
    pub alert_list_max_page_size: u32,

    #[serde(alias = "heartbeatIntervalMs")]
    pub heartbeat_interval_ms: u64,

    /// Missed heartbeat intervals tolerated before a connection is dead.
    #[serde(alias = "heartbeatMissLimit")]
    pub heartbeat_miss_limit: u32,

    /// Age after which an unacknowledged delivery is logged and dropped.
    #[serde(alias = "messageTimeoutMs")]
    pub message_timeout_ms: u64,

    #[serde(alias = "reconnectMaxAttempts")]
    pub reconnect_max_attempts: u32,

    /// Base delay for the first reconnect attempt; doubles per attempt.
    #[serde(alias = "reconnectBackoffMs")]
    pub reconnect_backoff_ms: u64,

    #[serde(alias = "auditBufferSize")]
    pub audit_buffer_size: usize,

    #[serde(alias = "auditFlushIntervalMs")]
    pub audit_flush_interval_ms: u64,

    /// Failed flush attempts before a batch is parked for manual reconciliation.
    #[serde(alias = "auditMaxRetries")]
    pub audit_max_retries: u32,

    /// Users scoring below this always require manual review.
    #[serde(alias = "trustReviewFloor")]
    pub trust_review_floor: f64,

    /// Minimum alert severity that creates an alert from classified content.
    #[serde(alias = "alertSeverityThreshold")]
    pub alert_severity_threshold: Severity,

    /// Identifies this process on the cross-instance pub/sub topic.
    #[serde(alias = "instanceId")]
    pub instance_id: String,
}

impl Default for LifelineConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 10,
            alert_list_max_page_size: 100,
            heartbeat_interval_ms: 30_000,
            heartbeat_miss_limit: 2,
            message_timeout_ms: 60_000,
            reconnect_max_attempts: 5,
            reconnect_backoff_ms: 1_000,
            audit_buffer_size: 100,
            audit_flush_interval_ms: 5_000,
            audit_max_retries: 5,
            trust_review_floor: 0.3,
            alert_severity_threshold: Severity::High,
            instance_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl LifelineConfig {
    /// Reject values that would make a component misbehave.
    pub fn validate(&self) -> LifelineResult<()> {
        let fail = |reason: &str| {
            Err(LifelineError::Config {
                reason: reason.to_string(),
            })
        };
        if self.rate_limit_per_minute == 0 {
            return fail("rate_limit_per_minute must be at least 1");
        }
        if self.alert_list_max_page_size == 0 {
            return fail("alert_list_max_page_size must be at least 1");
        }
        if self.heartbeat_interval_ms == 0 {
            return fail("heartbeat_interval_ms must be positive");
        }
        if self.message_timeout_ms == 0 {
            return fail("message_timeout_ms must be positive");
        }
        if self.audit_buffer_size == 0 {
            return fail("audit_buffer_size must be at least 1");
        }
        if self.audit_flush_interval_ms == 0 {
            return fail("audit_flush_interval_ms must be positive");
        }
        if !(0.0..=1.0).contains(&self.trust_review_floor) {
            return fail("trust_review_floor must lie within [0, 1]");
        }
        if self.instance_id.trim().is_empty() {
            return fail("instance_id must not be empty");
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    pub fn audit_flush_interval(&self) -> Duration {
        Duration::from_millis(self.audit_flush_interval_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}
