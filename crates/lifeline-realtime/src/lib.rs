//! # lifeline-realtime
//!
//! Live delivery of alert lifecycle events to counselors.
//!
//! - [`PresenceRegistry`]: privileged sessions, heartbeats, pending acks
//! - [`Dispatcher`]: the actor that owns the registry and fans events out
//! - [`PubSubBus`]: cross-instance topic, with an in-process implementation
//! - [`ReconnectPolicy`]: client-side exponential backoff

pub mod bus;
pub mod dispatcher;
pub mod presence;
pub mod reconnect;

pub use bus::{BusEnvelope, InProcessBus, PubSubBus, ALERTS_TOPIC};
pub use dispatcher::{Connection, Dispatcher, DispatcherSettings};
pub use presence::{DeliveryFailure, PresenceRegistry};
pub use reconnect::ReconnectPolicy;

// ── Tests ─────────────────────────────────────────────────────────────────────
