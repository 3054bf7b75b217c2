//! Actor-based alert dispatcher.
//!
//! A single task owns the `PresenceRegistry`. Everything that touches it
//! (registration, fan-out, acks, heartbeats, timeout sweeps, events from
//! peer instances) arrives as a `Command` over one unbounded mpsc channel or
//! as a timer tick inside the same `select!` loop, so a connection can never
//! be observed half torn down.
//!
//! `Dispatcher` is the cheap, cloneable handle. It implements
//! `AlertPublisher`, which lets the synchronous workflow controller publish
//! without awaiting: sending a command never blocks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lifeline_contracts::{
    alert::{AlertFilter, AlertId, AlertStatus, PageRequest},
    audit::{AuditEventType, AuditRequest},
    config::LifelineConfig,
    error::{LifelineError, LifelineResult},
    identity::{Actor, UserId},
    realtime::{AlertEvent, ChannelMessage, ConnectionId, PresenceSession, CRISIS_ALERTS_CHANNEL},
};
use lifeline_core::traits::{AlertPublisher, AlertRepository, AuditLogger};

use crate::bus::{BusEnvelope, PubSubBus};
use crate::presence::{DeliveryFailure, PresenceRegistry};

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub heartbeat_interval: Duration,
    pub heartbeat_miss_limit: u32,
    pub message_timeout: Duration,
    /// Frames buffered per connection before deliveries start failing.
    pub outbox_capacity: usize,
    /// Page size used when replaying unresolved alerts.
    pub replay_page_size: u32,
    pub instance_id: String,
}

impl From<&LifelineConfig> for DispatcherSettings {
    fn from(config: &LifelineConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_miss_limit: config.heartbeat_miss_limit,
            message_timeout: config.message_timeout(),
            outbox_capacity: 256,
            replay_page_size: config.alert_list_max_page_size,
            instance_id: config.instance_id.clone(),
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

enum Command {
    Register {
        session: PresenceSession,
        outbox: mpsc::Sender<ChannelMessage>,
    },
    Unregister {
        connection_id: ConnectionId,
    },
    Publish {
        event: AlertEvent,
    },
    Direct {
        user_id: UserId,
        event: AlertEvent,
    },
    Ack {
        connection_id: ConnectionId,
        message_id: String,
    },
    Pong {
        connection_id: ConnectionId,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<PresenceSession>>,
    },
    Shutdown,
}

fn send(commands: &mpsc::UnboundedSender<Command>, command: Command) -> LifelineResult<()> {
    commands.send(command).map_err(|_| LifelineError::Delivery {
        connection_id: "dispatcher".to_string(),
        reason: "dispatcher has shut down".to_string(),
    })
}

// ── Handle ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Dispatcher {
    commands: mpsc::UnboundedSender<Command>,
    outbox_capacity: usize,
}

impl Dispatcher {
    /// Start the dispatcher task. Must be called from within a tokio runtime.
    pub fn spawn(
        settings: DispatcherSettings,
        alerts: Arc<dyn AlertRepository>,
        bus: Option<Arc<dyn PubSubBus>>,
    ) -> (Self, JoinHandle<()>) {
        Self::start(settings, alerts, bus, None)
    }

    /// Like `spawn`, and every session that ends (closed, silent or
    /// unreachable) is recorded as `presence_disconnected`.
    pub fn spawn_audited(
        settings: DispatcherSettings,
        alerts: Arc<dyn AlertRepository>,
        bus: Option<Arc<dyn PubSubBus>>,
        audit: Arc<dyn AuditLogger>,
    ) -> (Self, JoinHandle<()>) {
        Self::start(settings, alerts, bus, Some(audit))
    }

    fn start(
        settings: DispatcherSettings,
        alerts: Arc<dyn AlertRepository>,
        bus: Option<Arc<dyn PubSubBus>>,
        audit: Option<Arc<dyn AuditLogger>>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            commands: tx,
            outbox_capacity: settings.outbox_capacity.max(1),
        };
        let remote = bus.as_ref().map(|b| b.subscribe());
        let task = DispatchLoop {
            settings,
            registry: PresenceRegistry::new(),
            alerts,
            bus,
            audit,
            seen: HashMap::new(),
        };
        let join = tokio::spawn(task.run(rx, remote));
        (handle, join)
    }

    /// Open a real-time connection for a privileged actor.
    ///
    /// The connection is subscribed to the crisis channel and receives the
    /// unresolved alerts it has not yet seen before any live event.
    pub fn connect(&self, actor: &Actor) -> LifelineResult<Connection> {
        if !actor.role.is_privileged() {
            return Err(LifelineError::Forbidden {
                reason: format!(
                    "role '{}' may not subscribe to {}",
                    actor.role, CRISIS_ALERTS_CHANNEL
                ),
            });
        }
        let (outbox, inbox) = mpsc::channel(self.outbox_capacity);
        let session = PresenceSession::new(actor.user_id.clone(), actor.role);
        let connection_id = session.connection_id.clone();
        send(&self.commands, Command::Register { session, outbox })?;

        Ok(Connection {
            connection_id,
            user_id: actor.user_id.clone(),
            inbox,
            commands: self.commands.clone(),
        })
    }

    /// Current sessions with their pending ack ids.
    pub async fn sessions(&self) -> LifelineResult<Vec<PresenceSession>> {
        let (reply, rx) = oneshot::channel();
        send(&self.commands, Command::Snapshot { reply })?;
        rx.await.map_err(|_| LifelineError::Delivery {
            connection_id: "dispatcher".to_string(),
            reason: "dispatcher stopped before answering".to_string(),
        })
    }

    /// Stop the task. Every open connection's stream ends.
    pub fn shutdown(&self) {
        // Already stopped is fine.
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl AlertPublisher for Dispatcher {
    fn publish(&self, event: AlertEvent) -> LifelineResult<()> {
        send(&self.commands, Command::Publish { event })
    }

    fn notify_user(&self, user_id: &UserId, event: AlertEvent) -> LifelineResult<()> {
        send(
            &self.commands,
            Command::Direct {
                user_id: user_id.clone(),
                event,
            },
        )
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

/// The receiving end of one presence. Dropping it unregisters the session.
#[derive(Debug)]
pub struct Connection {
    connection_id: ConnectionId,
    user_id: UserId,
    inbox: mpsc::Receiver<ChannelMessage>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Connection {
    pub fn id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Next raw frame, pings included. `None` once the dispatcher drops the
    /// connection.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.inbox.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChannelMessage> {
        self.inbox.try_recv().ok()
    }

    /// Next alert frame. Pings are answered with a pong along the way.
    pub async fn next_event(&mut self) -> Option<ChannelMessage> {
        loop {
            let message = self.inbox.recv().await?;
            if !message.is_control() {
                return Some(message);
            }
            if self.pong().is_err() {
                return None;
            }
        }
    }

    pub fn ack(&self, message_id: &str) -> LifelineResult<()> {
        send(
            &self.commands,
            Command::Ack {
                connection_id: self.connection_id.clone(),
                message_id: message_id.to_string(),
            },
        )
    }

    pub fn pong(&self) -> LifelineResult<()> {
        send(
            &self.commands,
            Command::Pong {
                connection_id: self.connection_id.clone(),
            },
        )
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unregister {
            connection_id: self.connection_id.clone(),
        });
    }
}

// ── Actor ─────────────────────────────────────────────────────────────────────

struct DispatchLoop {
    settings: DispatcherSettings,
    registry: PresenceRegistry,
    alerts: Arc<dyn AlertRepository>,
    bus: Option<Arc<dyn PubSubBus>>,
    audit: Option<Arc<dyn AuditLogger>>,
    /// Alerts each user has already been sent, for reconnect replay.
    seen: HashMap<UserId, HashSet<AlertId>>,
}

/// Next envelope from peers; pending forever without a bus.
async fn recv_remote(
    remote: &mut Option<broadcast::Receiver<BusEnvelope>>,
) -> Result<BusEnvelope, broadcast::error::RecvError> {
    match remote {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl DispatchLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut remote: Option<broadcast::Receiver<BusEnvelope>>,
    ) {
        let mut heartbeat =
            tokio::time::interval(self.settings.heartbeat_interval.max(Duration::from_millis(1)));
        let sweep_period = (self.settings.message_timeout / 4).max(Duration::from_millis(10));
        let mut sweep = tokio::time::interval(sweep_period);
        heartbeat.tick().await;
        sweep.tick().await;

        info!(instance_id = %self.settings.instance_id, "alert dispatcher started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle(command),
                },
                _ = heartbeat.tick() => self.heartbeat(),
                _ = sweep.tick() => self.expire_acks(),
                envelope = recv_remote(&mut remote) => match envelope {
                    Ok(envelope) => self.on_remote(envelope),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "dispatcher lagged behind the bus; events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("bus closed; continuing without peers");
                        remote = None;
                    }
                },
            }
        }

        info!(
            connections = self.registry.len(),
            "alert dispatcher stopped"
        );
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register { session, outbox } => {
                let user_id = session.user_id.clone();
                match self.registry.register(session, outbox) {
                    Ok(connection_id) => self.replay(&connection_id, &user_id),
                    Err(e) => warn!(user_id = %user_id, error = %e, "presence rejected"),
                }
            }
            Command::Unregister { connection_id } => {
                self.disconnect(&connection_id, "closed");
            }
            Command::Publish { event } => {
                self.fan_out(&event);
                self.forward_to_bus(event);
            }
            Command::Direct { user_id, event } => {
                let targets = self.registry.connections_for(&user_id);
                self.deliver_all(&targets, &event);
            }
            Command::Ack {
                connection_id,
                message_id,
            } => {
                if !self.registry.acknowledge(&connection_id, &message_id) {
                    debug!(connection_id = %connection_id, message_id = %message_id, "ack for unknown delivery");
                }
            }
            Command::Pong { connection_id } => self.registry.record_pong(&connection_id),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.registry.sessions());
            }
            Command::Shutdown => {}
        }
    }

    fn fan_out(&mut self, event: &AlertEvent) {
        let alert = event.alert();
        let mut targets = self.registry.subscribers(CRISIS_ALERTS_CHANNEL);
        if matches!(event, AlertEvent::Created { .. }) {
            // Replay on registration may have sent this alert already.
            targets.retain(|connection_id| !self.already_sent(connection_id, alert.id));
        }
        debug!(
            alert_id = %alert.id,
            kind = ?event.kind(),
            recipients = targets.len(),
            "fanning out alert event"
        );
        self.deliver_all(&targets, event);
        if !alert.status.is_unhandled() {
            self.forget(alert.id);
        }
    }

    fn deliver_all(&mut self, targets: &[ConnectionId], event: &AlertEvent) {
        let alert = event.alert();
        let track = alert.status.is_unhandled();
        for connection_id in targets {
            // A fresh message id per delivery so acks are per connection.
            let message = event.to_message();
            if self.deliver(connection_id, message) && track {
                if let Some(user_id) = self.registry.user_of(connection_id).cloned() {
                    self.seen.entry(user_id).or_default().insert(alert.id);
                }
            }
        }
    }

    fn already_sent(&self, connection_id: &ConnectionId, alert_id: AlertId) -> bool {
        self.registry
            .user_of(connection_id)
            .and_then(|user_id| self.seen.get(user_id))
            .is_some_and(|ids| ids.contains(&alert_id))
    }

    /// Drop a closed alert from every user's replay bookkeeping.
    fn forget(&mut self, alert_id: AlertId) {
        self.seen.retain(|_, ids| {
            ids.remove(&alert_id);
            !ids.is_empty()
        });
    }

    /// Push one frame, handling delivery failures. Returns true on success.
    fn deliver(&mut self, connection_id: &ConnectionId, message: ChannelMessage) -> bool {
        let message_id = message.id.clone();
        match self.registry.deliver(connection_id, message) {
            Ok(()) => true,
            Err(failure) => {
                let error = LifelineError::Delivery {
                    connection_id: connection_id.to_string(),
                    reason: match failure {
                        DeliveryFailure::QueueFull => "outbound queue full",
                        DeliveryFailure::Closed => "connection closed",
                        DeliveryFailure::UnknownConnection => "connection not registered",
                    }
                    .to_string(),
                };
                warn!(message_id = %message_id, error = %error, "delivery failed");
                if failure == DeliveryFailure::Closed {
                    self.disconnect(connection_id, "unreachable");
                }
                false
            }
        }
    }

    fn forward_to_bus(&self, event: AlertEvent) {
        if let Some(bus) = &self.bus {
            let envelope = BusEnvelope {
                origin: self.settings.instance_id.clone(),
                event,
            };
            if let Err(e) = bus.publish(envelope) {
                warn!(error = %e, "failed to publish alert event to peers");
            }
        }
    }

    fn on_remote(&mut self, envelope: BusEnvelope) {
        if envelope.origin == self.settings.instance_id {
            return;
        }
        debug!(origin = %envelope.origin, "event from peer instance");
        self.fan_out(&envelope.event);
    }

    /// Send the unresolved alerts this user has not seen yet.
    fn replay(&mut self, connection_id: &ConnectionId, user_id: &UserId) {
        let filter = AlertFilter {
            statuses: vec![AlertStatus::New, AlertStatus::Acknowledged],
            ..Default::default()
        };
        let limit = self.settings.replay_page_size.max(1);
        let mut page = 1;
        let mut replayed = 0usize;
        let mut open = HashSet::new();

        loop {
            let result = match self.alerts.list(&filter, PageRequest { page, limit }) {
                Ok(result) => result,
                Err(e) => {
                    warn!(connection_id = %connection_id, error = %e, "replay query failed");
                    return;
                }
            };
            for alert in result.items {
                open.insert(alert.id);
                let already_seen = self
                    .seen
                    .get(user_id)
                    .is_some_and(|s| s.contains(&alert.id));
                if already_seen {
                    continue;
                }
                let alert_id = alert.id;
                let message = AlertEvent::Created { alert }.to_message();
                if !self.deliver(connection_id, message) {
                    return;
                }
                self.seen.entry(user_id.clone()).or_default().insert(alert_id);
                replayed += 1;
            }
            if u64::from(page) >= result.total_pages {
                break;
            }
            page += 1;
        }

        // Alerts closed or purged while no event reached this instance.
        if let Some(ids) = self.seen.get_mut(user_id) {
            ids.retain(|id| open.contains(id));
            if ids.is_empty() {
                self.seen.remove(user_id);
            }
        }

        if replayed > 0 {
            info!(connection_id = %connection_id, user_id = %user_id, replayed, "replayed unresolved alerts");
        }
    }

    fn heartbeat(&mut self) {
        let (dead, alive) = self.registry.heartbeat_tick(self.settings.heartbeat_miss_limit);
        for session in &dead {
            warn!(connection_id = %session.connection_id, "connection missed heartbeats; removed");
            self.record_disconnect(session, "heartbeat_timeout");
        }
        for connection_id in &alive {
            self.deliver(connection_id, ChannelMessage::ping());
        }
    }

    fn disconnect(&mut self, connection_id: &ConnectionId, reason: &str) {
        if let Some(session) = self.registry.unregister(connection_id) {
            self.record_disconnect(&session, reason);
        }
    }

    fn record_disconnect(&self, session: &PresenceSession, reason: &str) {
        let Some(audit) = &self.audit else {
            return;
        };
        let request = AuditRequest::new(
            AuditEventType::PresenceDisconnected,
            Some(session.user_id.clone()),
            session.connection_id.to_string(),
            reason,
        );
        if let Err(e) = audit.log(request) {
            warn!(connection_id = %session.connection_id, error = %e, "disconnect not audited");
        }
    }

    fn expire_acks(&mut self) {
        let expired = self
            .registry
            .expire_acks(Instant::now(), self.settings.message_timeout);
        for (connection_id, message_id) in expired {
            warn!(
                connection_id = %connection_id,
                message_id = %message_id,
                "delivery not acknowledged in time; dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use lifeline_contracts::{
        alert::{AlertId, AlertStatus, AlertType, SafetyAlert, Severity},
        audit::{AuditEventType, AuditRequest},
        error::LifelineResult,
        identity::{Actor, Role, UserId},
        realtime::{AlertEvent, ChannelMessage, ConnectionId, MessageKind, PresenceSession},
    };
    use lifeline_core::traits::{AlertRepository, AuditLogger};
    use lifeline_store::InMemoryAlertStore;
    use tokio::sync::mpsc;

    use super::{Command, DispatchLoop, DispatcherSettings};
    use crate::presence::PresenceRegistry;

    fn dispatch_loop(store: Arc<InMemoryAlertStore>) -> DispatchLoop {
        DispatchLoop {
            settings: DispatcherSettings {
                heartbeat_interval: std::time::Duration::from_secs(60),
                heartbeat_miss_limit: 2,
                message_timeout: std::time::Duration::from_secs(60),
                outbox_capacity: 16,
                replay_page_size: 10,
                instance_id: "test".to_string(),
            },
            registry: PresenceRegistry::new(),
            alerts: store,
            bus: None,
            audit: None,
            seen: HashMap::new(),
        }
    }

    #[derive(Default)]
    struct RecordingAudit {
        requests: Mutex<Vec<AuditRequest>>,
    }

    impl AuditLogger for RecordingAudit {
        fn log(&self, request: AuditRequest) -> LifelineResult<String> {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            Ok(format!("audit-{}", requests.len()))
        }

        fn flush(&self) -> LifelineResult<()> {
            Ok(())
        }
    }

    fn register(dl: &mut DispatchLoop, user: &str) -> mpsc::Receiver<ChannelMessage> {
        register_with_id(dl, user).1
    }

    fn register_with_id(
        dl: &mut DispatchLoop,
        user: &str,
    ) -> (ConnectionId, mpsc::Receiver<ChannelMessage>) {
        let (outbox, inbox) = mpsc::channel(16);
        let actor = Actor::new(user, Role::CrisisCounselor);
        let session = PresenceSession::new(actor.user_id, actor.role);
        let connection_id = session.connection_id.clone();
        dl.handle(Command::Register { session, outbox });
        (connection_id, inbox)
    }

    fn drain(inbox: &mut mpsc::Receiver<ChannelMessage>) -> Vec<ChannelMessage> {
        std::iter::from_fn(|| inbox.try_recv().ok()).collect()
    }

    fn crisis_alert() -> SafetyAlert {
        SafetyAlert::new(
            AlertType::SelfHarm,
            Severity::High,
            UserId::from("member-1"),
            "nothing matters",
            vec!["self_harm".to_string()],
        )
    }

    fn seen_by(dl: &DispatchLoop, user: &str) -> Option<Vec<AlertId>> {
        dl.seen
            .get(&UserId::from(user))
            .map(|ids| ids.iter().copied().collect())
    }

    #[test]
    fn test_created_event_skips_connection_that_replayed_it() {
        let store = Arc::new(InMemoryAlertStore::new());
        let alert = store.create(crisis_alert()).unwrap();
        let mut dl = dispatch_loop(store);

        // Registration lands between the store write and the publish.
        let mut inbox = register(&mut dl, "counselor-a");
        dl.handle(Command::Publish {
            event: AlertEvent::Created {
                alert: alert.clone(),
            },
        });

        let frames = drain(&mut inbox);
        assert_eq!(frames.len(), 1, "alert delivered twice");
        assert_eq!(frames[0].kind, MessageKind::AlertCreated);
        assert_eq!(frames[0].payload["alert"]["id"], alert.id.to_string());
    }

    #[test]
    fn test_closed_alert_leaves_replay_bookkeeping() {
        let store = Arc::new(InMemoryAlertStore::new());
        let mut dl = dispatch_loop(store);
        let mut inbox = register(&mut dl, "counselor-a");

        let alert = crisis_alert();
        dl.handle(Command::Publish {
            event: AlertEvent::Created {
                alert: alert.clone(),
            },
        });
        assert_eq!(seen_by(&dl, "counselor-a"), Some(vec![alert.id]));

        let mut resolved = alert.clone();
        resolved.status = AlertStatus::Resolved;
        dl.handle(Command::Publish {
            event: AlertEvent::Updated {
                alert: resolved,
                previous_status: AlertStatus::New,
            },
        });

        assert_eq!(drain(&mut inbox).len(), 2, "the resolve is still delivered");
        assert!(dl.seen.is_empty());
    }

    #[test]
    fn test_replay_drops_alerts_no_longer_open() {
        let store = Arc::new(InMemoryAlertStore::new());
        let open = store.create(crisis_alert()).unwrap();
        let mut dl = dispatch_loop(store.clone());
        let purged = AlertId::new();
        dl.seen
            .entry(UserId::from("counselor-a"))
            .or_default()
            .insert(purged);

        let mut inbox = register(&mut dl, "counselor-a");

        assert_eq!(drain(&mut inbox).len(), 1);
        assert_eq!(seen_by(&dl, "counselor-a"), Some(vec![open.id]));
    }

    #[test]
    fn test_ended_sessions_are_audited() {
        let audit = Arc::new(RecordingAudit::default());
        let mut dl = dispatch_loop(Arc::new(InMemoryAlertStore::new()));
        dl.audit = Some(audit.clone());

        let (closed, _closed_inbox) = register_with_id(&mut dl, "counselor-a");
        let (silent, _silent_inbox) = register_with_id(&mut dl, "counselor-b");
        dl.handle(Command::Unregister {
            connection_id: closed.clone(),
        });
        // Ticks past the miss limit of 2 without a pong.
        for _ in 0..4 {
            dl.heartbeat();
        }

        let requests = audit.requests.lock().unwrap();
        let ended: Vec<_> = requests
            .iter()
            .map(|r| (r.event_type, r.resource_id.clone(), r.action.clone()))
            .collect();
        assert_eq!(
            ended,
            vec![
                (
                    AuditEventType::PresenceDisconnected,
                    closed.to_string(),
                    "closed".to_string()
                ),
                (
                    AuditEventType::PresenceDisconnected,
                    silent.to_string(),
                    "heartbeat_timeout".to_string()
                ),
            ]
        );
        assert_eq!(requests[0].actor_id, Some(UserId::from("counselor-a")));

        // Unregistering twice records nothing new.
        drop(requests);
        dl.handle(Command::Unregister {
            connection_id: closed,
        });
        assert_eq!(audit.requests.lock().unwrap().len(), 2);
    }
}
