//! Cross-instance pub/sub.
//!
//! Each dispatcher publishes the events it originates on one topic, tagged
//! with its instance id, and fans out what peers publish without forwarding
//! it again. `InProcessBus` backs the topic with a tokio broadcast channel,
//! which is enough for tests and single-host deployments; a Redis or NATS
//! adapter implements the same trait.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use lifeline_contracts::{error::LifelineResult, realtime::AlertEvent};

/// Topic name shared by every instance.
pub const ALERTS_TOPIC: &str = "lifeline:crisis-alerts";

/// An event as carried between instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEnvelope {
    /// Instance id of the publishing dispatcher.
    pub origin: String,
    pub event: AlertEvent,
}

pub trait PubSubBus: Send + Sync {
    fn publish(&self, envelope: BusEnvelope) -> LifelineResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<BusEnvelope>;
}

#[derive(Clone)]
pub struct InProcessBus {
    sender: broadcast::Sender<BusEnvelope>,
}

impl InProcessBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl PubSubBus for InProcessBus {
    fn publish(&self, envelope: BusEnvelope) -> LifelineResult<()> {
        // No subscribers is not an error: there are simply no peers.
        let receivers = self.sender.send(envelope).unwrap_or(0);
        debug!(topic = ALERTS_TOPIC, receivers, "event published to bus");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BusEnvelope> {
        self.sender.subscribe()
    }
}
