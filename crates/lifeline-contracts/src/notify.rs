//! Outbound notification type handed to external senders (email, SMS,
//! push, pager). LIFELINE only builds the value; delivery is external.

use serde::{Deserialize, Serialize};

/// Who should receive a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// The on-call platform operator.
    Operator,
    /// All on-duty staff holding a role.
    Role(String),
    User(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Normal,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub priority: NotificationPriority,
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// An urgent operator page, used for audit failures.
    pub fn operator_alert(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient: Recipient::Operator,
            priority: NotificationPriority::Urgent,
            subject: subject.into(),
            body: body.into(),
        }
    }
}
