//! Real-time channel frames, alert lifecycle events and presence sessions.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    alert::{AlertStatus, SafetyAlert, Severity},
    identity::{Role, UserId},
};

/// The channel every privileged session subscribes to on connect.
pub const CRISIS_ALERTS_CHANNEL: &str = "crisis-alerts";

/// Unique identifier for one socket connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Frame discriminant on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    AlertCreated,
    AlertUpdated,
    SeverityChanged,
    Ping,
    Pong,
}

/// One frame on the real-time channel: `{id, type, payload, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ChannelMessage {
    pub fn new(kind: MessageKind, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn ping() -> Self {
        Self::new(MessageKind::Ping, serde_json::Value::Null)
    }

    /// Control frames are never tracked for acknowledgment.
    pub fn is_control(&self) -> bool {
        matches!(self.kind, MessageKind::Ping | MessageKind::Pong)
    }
}

/// An alert lifecycle event published by the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AlertEvent {
    Created {
        alert: SafetyAlert,
    },
    Updated {
        alert: SafetyAlert,
        previous_status: AlertStatus,
    },
    SeverityChanged {
        alert: SafetyAlert,
        previous_severity: Severity,
    },
}

impl AlertEvent {
    pub fn alert(&self) -> &SafetyAlert {
        match self {
            AlertEvent::Created { alert }
            | AlertEvent::Updated { alert, .. }
            | AlertEvent::SeverityChanged { alert, .. } => alert,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            AlertEvent::Created { .. } => MessageKind::AlertCreated,
            AlertEvent::Updated { .. } => MessageKind::AlertUpdated,
            AlertEvent::SeverityChanged { .. } => MessageKind::SeverityChanged,
        }
    }

    /// Frame payload for this event.
    ///
    /// `alert_updated` always carries the new status and `handled_by` at the
    /// top level so clients can update their queue without parsing the alert.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            AlertEvent::Created { alert } => serde_json::json!({ "alert": alert }),
            AlertEvent::Updated {
                alert,
                previous_status,
            } => serde_json::json!({
                "alert": alert,
                "status": alert.status,
                "handled_by": alert.handled_by,
                "previous_status": previous_status,
            }),
            AlertEvent::SeverityChanged {
                alert,
                previous_severity,
            } => serde_json::json!({
                "alert": alert,
                "severity": alert.severity,
                "previous_severity": previous_severity,
            }),
        }
    }

    /// Build the wire frame for this event with a fresh message id.
    pub fn to_message(&self) -> ChannelMessage {
        ChannelMessage::new(self.kind(), self.payload())
    }
}

/// A connected privileged session. Lives only in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceSession {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub role: Role,
    pub subscribed_channels: HashSet<String>,
    pub last_heartbeat_at: DateTime<Utc>,
    /// Message ids delivered but not yet acknowledged.
    pub pending_ack_ids: HashSet<String>,
}

impl PresenceSession {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            connection_id: ConnectionId::new(),
            user_id,
            role,
            subscribed_channels: HashSet::new(),
            last_heartbeat_at: Utc::now(),
            pending_ack_ids: HashSet::new(),
        }
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.subscribed_channels.contains(channel)
    }
}

/// Client-visible connection state, driven by the reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Reconnecting { attempt: u32 },
    /// Attempts exhausted. Persistent until the operator resets it.
    Disconnected,
}
