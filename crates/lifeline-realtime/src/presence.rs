//! Presence registry.
//!
//! Owned exclusively by the dispatcher task, so none of these methods lock.
//! Each `Presence` pairs the public `PresenceSession` with the bounded outbox
//! its frames are pushed into and the bookkeeping for heartbeats and acks.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};

use lifeline_contracts::{
    error::{LifelineError, LifelineResult},
    identity::UserId,
    realtime::{ChannelMessage, ConnectionId, PresenceSession, CRISIS_ALERTS_CHANNEL},
};

pub(crate) struct Presence {
    pub(crate) session: PresenceSession,
    outbox: mpsc::Sender<ChannelMessage>,
    /// Delivered message id -> delivery time.
    pending: HashMap<String, Instant>,
    awaiting_pong: bool,
    missed_heartbeats: u32,
}

impl Presence {
    fn snapshot(&self) -> PresenceSession {
        let mut session = self.session.clone();
        session.pending_ack_ids = self.pending.keys().cloned().collect();
        session
    }
}

/// Why a delivery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    QueueFull,
    /// The client side of the connection is gone.
    Closed,
    UnknownConnection,
}

#[derive(Default)]
pub struct PresenceRegistry {
    connections: HashMap<ConnectionId, Presence>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Admit a privileged session and subscribe it to the crisis channel.
    pub fn register(
        &mut self,
        mut session: PresenceSession,
        outbox: mpsc::Sender<ChannelMessage>,
    ) -> LifelineResult<ConnectionId> {
        if !session.role.is_privileged() {
            return Err(LifelineError::Forbidden {
                reason: format!(
                    "role '{}' may not subscribe to {}",
                    session.role, CRISIS_ALERTS_CHANNEL
                ),
            });
        }
        if self.connections.contains_key(&session.connection_id) {
            return Err(LifelineError::Conflict {
                resource: "connection".to_string(),
                id: session.connection_id.to_string(),
                reason: "connection id already registered".to_string(),
                holder: Some(session.user_id.to_string()),
            });
        }

        session
            .subscribed_channels
            .insert(CRISIS_ALERTS_CHANNEL.to_string());
        session.last_heartbeat_at = Utc::now();
        let id = session.connection_id.clone();

        info!(
            connection_id = %id,
            user_id = %session.user_id,
            role = %session.role,
            "presence registered"
        );
        self.connections.insert(
            id.clone(),
            Presence {
                session,
                outbox,
                pending: HashMap::new(),
                awaiting_pong: false,
                missed_heartbeats: 0,
            },
        );
        Ok(id)
    }

    /// Remove a session, discarding its pending acks.
    pub fn unregister(&mut self, connection_id: &ConnectionId) -> Option<PresenceSession> {
        let presence = self.connections.remove(connection_id)?;
        info!(
            connection_id = %connection_id,
            user_id = %presence.session.user_id,
            dropped_acks = presence.pending.len(),
            "presence removed"
        );
        Some(presence.session)
    }

    /// Connections subscribed to `channel`.
    pub fn subscribers(&self, channel: &str) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, p)| p.session.is_subscribed(channel))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn connections_for(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, p)| &p.session.user_id == user_id)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn user_of(&self, connection_id: &ConnectionId) -> Option<&UserId> {
        self.connections
            .get(connection_id)
            .map(|p| &p.session.user_id)
    }

    /// Push a frame without waiting. Non-control frames are tracked until
    /// acknowledged.
    pub fn deliver(
        &mut self,
        connection_id: &ConnectionId,
        message: ChannelMessage,
    ) -> Result<(), DeliveryFailure> {
        let presence = self
            .connections
            .get_mut(connection_id)
            .ok_or(DeliveryFailure::UnknownConnection)?;
        let message_id = message.id.clone();
        let tracked = !message.is_control();

        match presence.outbox.try_send(message) {
            Ok(()) => {
                if tracked {
                    presence.pending.insert(message_id, Instant::now());
                }
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(DeliveryFailure::QueueFull),
            Err(TrySendError::Closed(_)) => Err(DeliveryFailure::Closed),
        }
    }

    /// Clear a delivered message. Returns false for unknown ids.
    pub fn acknowledge(&mut self, connection_id: &ConnectionId, message_id: &str) -> bool {
        self.connections
            .get_mut(connection_id)
            .map(|p| p.pending.remove(message_id).is_some())
            .unwrap_or(false)
    }

    pub fn record_pong(&mut self, connection_id: &ConnectionId) {
        if let Some(presence) = self.connections.get_mut(connection_id) {
            presence.awaiting_pong = false;
            presence.missed_heartbeats = 0;
            presence.session.last_heartbeat_at = Utc::now();
        }
    }

    /// Advance every connection by one heartbeat interval.
    ///
    /// A ping still unanswered at the next tick counts as one missed
    /// interval. Connections that have missed more than `miss_limit`
    /// intervals are removed and their sessions returned. Survivors need a
    /// fresh ping.
    pub fn heartbeat_tick(&mut self, miss_limit: u32) -> (Vec<PresenceSession>, Vec<ConnectionId>) {
        let mut dead = Vec::new();
        let mut alive = Vec::new();
        for (id, presence) in self.connections.iter_mut() {
            if presence.awaiting_pong {
                presence.missed_heartbeats += 1;
            }
            if presence.missed_heartbeats > miss_limit {
                dead.push(id.clone());
            } else {
                presence.awaiting_pong = true;
                alive.push(id.clone());
            }
        }
        let dead = dead.iter().filter_map(|id| self.unregister(id)).collect();
        (dead, alive)
    }

    /// Drop deliveries unacknowledged for longer than `timeout`. Returns
    /// (connection, message id) for each dropped delivery.
    pub fn expire_acks(&mut self, now: Instant, timeout: Duration) -> Vec<(ConnectionId, String)> {
        let mut expired = Vec::new();
        for (id, presence) in self.connections.iter_mut() {
            presence.pending.retain(|message_id, sent_at| {
                let keep = now.saturating_duration_since(*sent_at) <= timeout;
                if !keep {
                    expired.push((id.clone(), message_id.clone()));
                }
                keep
            });
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "unacknowledged deliveries expired");
        }
        expired
    }

    /// Public view of every session, with current pending ack ids.
    pub fn sessions(&self) -> Vec<PresenceSession> {
        self.connections.values().map(Presence::snapshot).collect()
    }
}
