//! Client-side reconnect policy.
//!
//! Exponential backoff starting at the configured base delay and doubling
//! per attempt. Once `max_attempts` reconnects have failed the state stays
//! `Disconnected` until `reset` is called.

use std::time::Duration;

use lifeline_contracts::{config::LifelineConfig, realtime::ConnectionState};

/// Upper bound on a single backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    max_attempts: u32,
    attempt: u32,
    state: ConnectionState,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
            attempt: 0,
            state: ConnectionState::Connected,
        }
    }

    pub fn from_config(config: &LifelineConfig) -> Self {
        Self::new(config.reconnect_backoff(), config.reconnect_max_attempts)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(MAX_DELAY)
            .min(MAX_DELAY)
    }

    /// The connection dropped or an attempt failed. Returns how long to wait
    /// before the next attempt, or `None` once attempts are exhausted.
    pub fn on_disconnect(&mut self) -> Option<Duration> {
        if self.state == ConnectionState::Disconnected {
            return None;
        }
        if self.attempt >= self.max_attempts {
            self.state = ConnectionState::Disconnected;
            return None;
        }
        self.attempt += 1;
        self.state = ConnectionState::Reconnecting {
            attempt: self.attempt,
        };
        Some(self.delay_for(self.attempt))
    }

    /// A (re)connect succeeded. Ignored once `Disconnected`.
    pub fn on_connected(&mut self) {
        if self.state != ConnectionState::Disconnected {
            self.attempt = 0;
            self.state = ConnectionState::Connected;
        }
    }

    /// Manual reset after exhaustion. The caller reconnects afterwards.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.state = ConnectionState::Connected;
    }
}
