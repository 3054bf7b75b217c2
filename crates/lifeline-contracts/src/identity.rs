//! Verified caller identity.
//!
//! Authentication happens upstream. Every command entering the pipeline
//! carries an `Actor` that the session layer has already verified; LIFELINE
//! only decides what that role is allowed to do.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier for a platform user (members and staff alike).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Construct a user id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Platform roles relevant to the crisis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A community member. Produces content, never receives alerts.
    User,
    /// Content moderator. May read the audit trail for moderation events only
    /// through external tooling; holds no alert privileges here.
    Moderator,
    /// Receives and handles safety alerts.
    CrisisCounselor,
    /// Oversees counselors; may override ownership and escalate directly.
    Supervisor,
    /// Full control, including the audited purge of alerts.
    Admin,
}

impl Role {
    /// Roles allowed to hold a real-time presence and act on alerts.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::CrisisCounselor | Role::Supervisor | Role::Admin)
    }

    /// Roles that may act on alerts they do not personally handle.
    pub fn is_supervisory(self) -> bool {
        matches!(self, Role::Supervisor | Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::CrisisCounselor => "crisis_counselor",
            Role::Supervisor => "supervisor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verified caller: who they are and what role their session carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role,
        }
    }
}
