//! Default adapters for the outward-facing seams.
//!
//! `TracingNotifier` stands in for the email/SMS/pager integration: it logs
//! every notification and keeps the most recent ones for inspection.
//! `StaticUserDirectory` answers existence checks from a fixed set that can
//! be extended at runtime.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, RwLock};

use tracing::{error, info};

use lifeline_contracts::{
    error::{LifelineError, LifelineResult},
    identity::UserId,
    notify::{Notification, NotificationPriority},
};
use lifeline_core::traits::{NotificationSender, UserDirectory};

const RECENT_NOTIFICATIONS: usize = 64;

#[derive(Default)]
pub struct TracingNotifier {
    recent: Mutex<VecDeque<Notification>>,
}

impl TracingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent notifications, oldest first.
    pub fn recent(&self) -> Vec<Notification> {
        self.recent
            .lock()
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl NotificationSender for TracingNotifier {
    fn deliver(&self, notification: &Notification) -> LifelineResult<()> {
        match notification.priority {
            NotificationPriority::Urgent => error!(
                recipient = ?notification.recipient,
                subject = %notification.subject,
                body = %notification.body,
                "urgent notification"
            ),
            NotificationPriority::Normal => info!(
                recipient = ?notification.recipient,
                subject = %notification.subject,
                "notification"
            ),
        }

        let mut recent = self
            .recent
            .lock()
            .map_err(|e| LifelineError::lock_poisoned("notifier", e))?;
        if recent.len() == RECENT_NOTIFICATIONS {
            recent.pop_front();
        }
        recent.push_back(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct StaticUserDirectory {
    users: RwLock<HashSet<UserId>>,
}

impl StaticUserDirectory {
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: RwLock::new(users.into_iter().map(UserId::new).collect()),
        }
    }

    pub fn insert(&self, user_id: UserId) -> LifelineResult<()> {
        self.users
            .write()
            .map_err(|e| LifelineError::lock_poisoned("user directory", e))?
            .insert(user_id);
        Ok(())
    }
}

impl UserDirectory for StaticUserDirectory {
    fn exists(&self, user_id: &UserId) -> bool {
        match self.users.read() {
            Ok(users) => users.contains(user_id),
            Err(poisoned) => poisoned.into_inner().contains(user_id),
        }
    }
}
