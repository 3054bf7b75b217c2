//! Fictional users and posts for the reference scenarios.
//!
//! Nothing here refers to real people. The crisis posts are written to hit
//! the built-in pattern set, not to depict any real conversation.

use lifeline_contracts::identity::{Actor, Role};

use crate::adapters::StaticUserDirectory;

pub const MEMBER_IN_CRISIS: &str = "member-avery";
pub const MEMBER_SUPPORT: &str = "member-jordan";
pub const MEMBER_CHATTY: &str = "member-riley";

pub const COUNSELOR_A: &str = "counselor-sam";
pub const COUNSELOR_B: &str = "counselor-quinn";
pub const SUPERVISOR: &str = "supervisor-morgan";
pub const ADMIN: &str = "admin-casey";

/// A post that matches the high-risk tier.
pub const CRISIS_POST: &str =
    "I can't do this anymore. I want to kill myself and I have a plan for tonight.";

/// A post that matches only the support tier, which stays below the
/// default alert threshold.
pub const SUPPORT_POST: &str = "Feeling overwhelmed with exams this week and struggling to sleep.";

/// A post that matches the medium-risk tier.
pub const HOPELESS_POST: &str = "Everything feels hopeless lately and nobody cares.";

pub const BENIGN_POST: &str =
    "Went for a long walk by the river today and tried the new bakery. Recommend the rye.";

pub fn member(id: &str) -> Actor {
    Actor::new(id, Role::User)
}

pub fn counselor(id: &str) -> Actor {
    Actor::new(id, Role::CrisisCounselor)
}

pub fn supervisor() -> Actor {
    Actor::new(SUPERVISOR, Role::Supervisor)
}

pub fn admin() -> Actor {
    Actor::new(ADMIN, Role::Admin)
}

/// Every fictional user, staff included.
pub fn directory() -> StaticUserDirectory {
    StaticUserDirectory::new([
        MEMBER_IN_CRISIS,
        MEMBER_SUPPORT,
        MEMBER_CHATTY,
        COUNSELOR_A,
        COUNSELOR_B,
        SUPERVISOR,
        ADMIN,
    ])
}
