//! Connection lifecycle: open, read loop, backoff and teardown.
//!
//! [`ConnectionManager`] owns the single transport connection and everything
//! that hangs off it: the outbound queue, heartbeat, subscription registry,
//! stats and lifecycle hooks.
//!
//! ```text
//! Closed --connect()--> Connecting --(open ok)--> Open
//! Open --(close/error, not manual)--> Closed [reconnect scheduled]
//! Closed --(backoff elapses)--> Connecting
//! Connecting --(open fails)--> Closed [reconnect scheduled]
//! Open --disconnect()--> Closing --> Closed (terminal)
//! ```
//!
//! Every attempt carries a generation number. `connect()` and `disconnect()`
//! bump it, and callbacks from an older generation are ignored, so at most
//! one connection is ever live.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::backoff::Backoff;
use super::heartbeat::HeartbeatMonitor;
use super::hooks::{LifecycleEvent, LifecycleHooks};
use super::messages::{InboundMessage, OutboundMessage};
use super::outbound_queue::OutboundQueue;
use super::subscription::{
    EventCallback, EventFilter, Subscription, SubscriptionInfo, SubscriptionRegistry, panic_message,
};
use super::transport::{Connector, TransportFrame};
use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::domain::{EventLog, Priority, RealtimeEvent, StatsTracker, SubscriptionId};
use crate::error::RealtimeError;
use crate::platform::{AlertSink, IdentityProvider, IdentityStore};
use crate::sync::lock;

/// Transport connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// An open attempt is in flight.
    Connecting,
    /// The transport is open.
    Open,
    /// A manual disconnect is tearing the connection down.
    Closing,
    /// No connection; a reconnect may be scheduled.
    Closed,
}

/// Collaborators injected into a [`ConnectionManager`].
#[derive(Debug)]
pub struct ManagerParts {
    /// Transport factory.
    pub connector: Arc<dyn Connector>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Durable last-principal storage.
    pub identity_store: Arc<dyn IdentityStore>,
    /// Live principal source, preferred over the stored one.
    pub identity_provider: Option<Arc<dyn IdentityProvider>>,
    /// Surface for critical events.
    pub alerts: Arc<dyn AlertSink>,
}

/// Owner of the single gateway connection.
#[derive(Debug)]
pub struct ConnectionManager {
    config: ClientConfig,
    backoff: Backoff,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
    identity_store: Arc<dyn IdentityStore>,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    alerts: Arc<dyn AlertSink>,

    state: Mutex<ConnectionState>,
    generation: AtomicU64,
    intentional_close: AtomicBool,
    exhausted: AtomicBool,
    outgoing: Mutex<Option<mpsc::UnboundedSender<String>>>,
    attempt_task: Mutex<Option<JoinHandle<()>>>,
    reconnect_timer: Mutex<Option<JoinHandle<()>>>,
    principal: Mutex<Option<String>>,

    stats: StatsTracker,
    queue: Mutex<OutboundQueue>,
    registry: SubscriptionRegistry,
    heartbeat: HeartbeatMonitor,
    hooks: LifecycleHooks,
    events: EventLog,
}

impl ConnectionManager {
    /// Creates a manager in the `Closed` state. Reads the last known
    /// principal from the identity store; a read failure is logged and
    /// treated as "no principal".
    #[must_use]
    pub fn new(config: ClientConfig, parts: ManagerParts) -> Self {
        let principal = match parts.identity_store.load_principal() {
            Ok(principal) => principal,
            Err(error) => {
                tracing::warn!(%error, "could not load last known principal");
                None
            }
        };

        Self {
            backoff: config.backoff(),
            queue: Mutex::new(OutboundQueue::new(config.outbound_queue_capacity)),
            events: EventLog::new(config.event_history_capacity, config.event_stream_capacity),
            config,
            connector: parts.connector,
            clock: parts.clock,
            identity_store: parts.identity_store,
            identity_provider: parts.identity_provider,
            alerts: parts.alerts,
            state: Mutex::new(ConnectionState::Closed),
            generation: AtomicU64::new(0),
            intentional_close: AtomicBool::new(false),
            exhausted: AtomicBool::new(false),
            outgoing: Mutex::new(None),
            attempt_task: Mutex::new(None),
            reconnect_timer: Mutex::new(None),
            principal: Mutex::new(principal),
            stats: StatsTracker::new(),
            registry: SubscriptionRegistry::new(),
            heartbeat: HeartbeatMonitor::new(),
            hooks: LifecycleHooks::new(),
        }
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Returns `true` while the transport is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Returns `true` once reconnection gave up; cleared by `connect()`.
    #[must_use]
    pub fn is_reconnect_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    /// Current time from the injected clock.
    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Connection counters.
    #[must_use]
    pub const fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    /// Subscription registry.
    #[must_use]
    pub const fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Lifecycle hooks.
    #[must_use]
    pub const fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }

    /// Recent-event window and live stream of dispatched events.
    #[must_use]
    pub const fn events(&self) -> &EventLog {
        &self.events
    }

    /// Heartbeat monitor.
    #[must_use]
    pub const fn heartbeat(&self) -> &HeartbeatMonitor {
        &self.heartbeat
    }

    /// Commands waiting for the connection to open.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Queued commands evicted because the queue was full.
    #[must_use]
    pub fn dropped_commands(&self) -> u64 {
        lock(&self.queue).dropped_count()
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    /// Starts connecting unless already connecting or open. Never blocks;
    /// must be called from within a tokio runtime.
    ///
    /// A manual call re-enables automatic reconnection after `disconnect()`.
    /// After exhaustion it also starts a fresh reconnect budget, so a failed
    /// manual attempt backs off and retries up to the configured maximum
    /// again.
    pub fn connect(self: &Arc<Self>) {
        if matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            tracing::debug!("connect ignored; connection already active");
            return;
        }
        self.intentional_close.store(false, Ordering::SeqCst);
        if self.exhausted.swap(false, Ordering::SeqCst) {
            let spent = self.stats.reset_reconnect_attempts();
            tracing::info!(spent, "reconnect budget renewed by manual connect");
        }
        if let Some(timer) = lock(&self.reconnect_timer).take() {
            timer.abort();
        }
        self.start_attempt();
    }

    /// Closes the connection for good: no reconnect, subscriptions and
    /// queued commands discarded. Only a later `connect()` revives it.
    pub fn disconnect(&self) {
        self.intentional_close.store(true, Ordering::SeqCst);
        let _ = self.generation.fetch_add(1, Ordering::SeqCst);

        let was_open = {
            let mut state = lock(&self.state);
            let was_open = *state == ConnectionState::Open;
            *state = ConnectionState::Closing;
            was_open
        };

        if let Some(timer) = lock(&self.reconnect_timer).take() {
            timer.abort();
        }
        drop(lock(&self.outgoing).take());
        if let Some(task) = lock(&self.attempt_task).take() {
            task.abort();
        }
        self.heartbeat.stop();

        let cleared_subscriptions = self.registry.clear();
        let dropped_commands = lock(&self.queue).clear();
        self.stats.mark_disconnected();
        *lock(&self.state) = ConnectionState::Closed;

        tracing::info!(
            cleared_subscriptions,
            dropped_commands,
            "disconnected from gateway"
        );
        if was_open {
            self.hooks.fire(LifecycleEvent::Disconnect);
        }
    }

    fn start_attempt(self: &Arc<Self>) {
        {
            let mut state = lock(&self.state);
            if matches!(*state, ConnectionState::Connecting | ConnectionState::Open) {
                return;
            }
            *state = ConnectionState::Connecting;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move { manager.run_attempt(generation).await });
        if let Some(previous) = lock(&self.attempt_task).replace(task) {
            previous.abort();
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run_attempt(self: Arc<Self>, generation: u64) {
        let url = self.config.endpoint_url();
        tracing::debug!(%url, generation, "opening gateway connection");

        match self.connector.connect(&url).await {
            Ok(link) => {
                if !self.is_current(generation) {
                    return;
                }
                self.handle_open(link.outgoing);
                self.read_loop(generation, link.incoming).await;
            }
            Err(error) => {
                if !self.is_current(generation) {
                    return;
                }
                tracing::warn!(%error, %url, "gateway connection attempt failed");
                *lock(&self.state) = ConnectionState::Closed;
                self.hooks.fire_error(&error);
                self.schedule_reconnect(generation);
            }
        }
    }

    fn handle_open(self: &Arc<Self>, outgoing: mpsc::UnboundedSender<String>) {
        let prior_attempts = self.stats.mark_connected(self.clock.now_ms());
        *lock(&self.outgoing) = Some(outgoing);

        // State flips to Open under the queue lock so a concurrent send()
        // cannot overtake commands that are still queued. subscribe() takes
        // the same lock, so each subscription is announced exactly once:
        // either in this snapshot or by subscribe() itself.
        let (flushed, active) = {
            let mut queue = lock(&self.queue);
            let active = self.registry.active();
            *lock(&self.state) = ConnectionState::Open;
            (queue.flush(|message| self.transmit(message)), active)
        };

        let announced = self.announce(active);

        let weak = Arc::downgrade(self);
        self.heartbeat
            .start(self.config.heartbeat_interval, move || {
                if let Some(manager) = weak.upgrade() {
                    manager.send_ping();
                }
            });

        tracing::info!(
            endpoint = %self.config.endpoint_url(),
            flushed,
            announced,
            reconnected = prior_attempts > 0,
            "gateway connection open"
        );
        self.hooks.fire(LifecycleEvent::Connect);
        if prior_attempts > 0 {
            self.hooks.fire(LifecycleEvent::Reconnect);
        }
    }

    async fn read_loop(
        self: &Arc<Self>,
        generation: u64,
        mut incoming: mpsc::UnboundedReceiver<TransportFrame>,
    ) {
        while let Some(frame) = incoming.recv().await {
            if !self.is_current(generation) {
                return;
            }
            match frame {
                TransportFrame::Text(text) => self.handle_text(&text),
                TransportFrame::Error(message) => {
                    let error = RealtimeError::Transport(message);
                    tracing::warn!(%error, "gateway connection error");
                    self.hooks.fire_error(&error);
                    break;
                }
                TransportFrame::Closed(reason) => {
                    tracing::debug!(?reason, "gateway closed the connection");
                    break;
                }
            }
        }
        self.handle_close(generation);
    }

    fn handle_close(self: &Arc<Self>, generation: u64) {
        if !self.is_current(generation) {
            return;
        }
        let was_open = {
            let mut state = lock(&self.state);
            let was_open = *state == ConnectionState::Open;
            *state = ConnectionState::Closed;
            was_open
        };
        drop(lock(&self.outgoing).take());
        self.heartbeat.stop();
        self.stats.mark_disconnected();

        if was_open {
            tracing::info!("gateway connection lost");
            self.hooks.fire(LifecycleEvent::Disconnect);
        }
        self.schedule_reconnect(generation);
    }

    fn schedule_reconnect(self: &Arc<Self>, generation: u64) {
        if self.intentional_close.load(Ordering::SeqCst) {
            return;
        }
        let attempts = self.stats.reconnect_attempts();
        let Some(delay) = self.backoff.next_delay(attempts) else {
            self.exhausted.store(true, Ordering::SeqCst);
            let error = RealtimeError::Exhausted { attempts };
            tracing::warn!(%error, "giving up on the gateway connection");
            return;
        };
        let attempt = self.stats.record_reconnect_scheduled();
        tracing::info!(
            attempt,
            max_attempts = self.backoff.max_attempts(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnect scheduled"
        );

        let manager = Arc::clone(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if manager.intentional_close.load(Ordering::SeqCst) || !manager.is_current(generation)
            {
                return;
            }
            manager.start_attempt();
        });
        if let Some(previous) = lock(&self.reconnect_timer).replace(timer) {
            previous.abort();
        }
    }

    // ── Outbound ───────────────────────────────────────────────────────────

    /// Transmits `message` if open, otherwise queues it. Never fails from
    /// the caller's point of view.
    pub fn send(&self, message: OutboundMessage) {
        let mut queue = lock(&self.queue);
        if queue.is_empty() && self.is_connected() {
            match self.transmit(&message) {
                Ok(()) => return,
                Err(error) => {
                    tracing::debug!(%error, kind = message.type_str(), "send failed; queueing");
                }
            }
        }
        tracing::trace!(kind = message.type_str(), queued = queue.len() + 1, "command queued");
        queue.enqueue(message);
    }

    fn transmit(&self, message: &OutboundMessage) -> Result<(), RealtimeError> {
        let json = message.to_json()?;
        {
            let outgoing = lock(&self.outgoing);
            let Some(sender) = outgoing.as_ref() else {
                return Err(RealtimeError::NotConnected);
            };
            sender
                .send(json)
                .map_err(|_| RealtimeError::Transport("outgoing channel closed".to_string()))?;
        }
        self.stats.record_sent();
        if let OutboundMessage::Ping { timestamp } = message {
            self.heartbeat.record_ping(*timestamp);
        }
        tracing::trace!(kind = message.type_str(), "command sent");
        Ok(())
    }

    fn send_ping(&self) {
        if self.is_connected() {
            self.send(OutboundMessage::Ping {
                timestamp: self.clock.now_ms(),
            });
        }
    }

    fn announce(&self, active: Vec<SubscriptionInfo>) -> usize {
        let count = active.len();
        for info in active {
            self.send(OutboundMessage::Subscribe {
                event_type: info.event_type,
                subscription_id: info.id,
                timestamp: self.clock.now_ms(),
            });
        }
        count
    }

    // ── Subscriptions ──────────────────────────────────────────────────────

    /// Registers a listener and announces it if connected.
    pub fn subscribe(
        &self,
        event_type: &str,
        callback: EventCallback,
        filter: Option<EventFilter>,
    ) -> Arc<Subscription> {
        let (subscription, connected) = {
            let _queue = lock(&self.queue);
            let subscription =
                self.registry
                    .subscribe(event_type, callback, filter, self.clock.now_ms());
            (subscription, self.is_connected())
        };
        if connected {
            self.send(OutboundMessage::Subscribe {
                event_type: event_type.to_string(),
                subscription_id: subscription.id(),
                timestamp: self.clock.now_ms(),
            });
        }
        subscription
    }

    /// Removes a listener and withdraws its announcement if connected.
    /// Returns `true` if it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.registry.unsubscribe(id).is_some();
        if removed && self.is_connected() {
            self.send(OutboundMessage::Unsubscribe {
                subscription_id: id,
                timestamp: self.clock.now_ms(),
            });
        }
        removed
    }

    // ── Inbound ────────────────────────────────────────────────────────────

    fn handle_text(&self, text: &str) {
        self.stats.record_received();
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(%error, bytes = text.len(), "dropping malformed frame");
                return;
            }
        };

        match message {
            InboundMessage::Pong { timestamp } => {
                let now = self.clock.now_ms();
                match self.heartbeat.resolve_pong(timestamp, now) {
                    Some(latency) => {
                        self.stats.record_latency(latency);
                        tracing::trace!(latency_ms = latency, "heartbeat acknowledged");
                    }
                    None => tracing::debug!(timestamp, "pong for unknown ping"),
                }
            }
            InboundMessage::Event { event } => {
                self.dispatch(event.into_event(self.clock.now_ms()));
            }
            InboundMessage::Error { error } => {
                let error = RealtimeError::Server(error);
                tracing::warn!(%error, "gateway reported an error");
            }
            InboundMessage::AuthRequired => self.authenticate(),
        }
    }

    fn dispatch(&self, event: RealtimeEvent) {
        if event.priority() == Priority::Critical {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.alerts.alert(&event))) {
                tracing::warn!(
                    event_id = event.id(),
                    panic = %panic_message(panic.as_ref()),
                    "alert sink panicked"
                );
            }
        }
        let report = self.registry.dispatch(&event);
        tracing::trace!(
            event_id = event.id(),
            event_type = event.event_type(),
            delivered = report.delivered,
            failed = report.failed,
            "event dispatched"
        );
        let _ = self.events.record(event);
    }

    // ── Identity ───────────────────────────────────────────────────────────

    /// Principal used for `authenticate`: the provider's, else the last
    /// known one.
    #[must_use]
    pub fn current_principal(&self) -> Option<String> {
        self.identity_provider
            .as_ref()
            .and_then(|provider| provider.principal())
            .or_else(|| lock(&self.principal).clone())
    }

    fn authenticate(&self) {
        let Some(principal) = self.current_principal() else {
            tracing::warn!("gateway requested authentication but no principal is known");
            return;
        };
        tracing::debug!(%principal, "authenticating");
        self.send(OutboundMessage::Authenticate {
            principal,
            timestamp: self.clock.now_ms(),
        });
    }

    /// Switches the connection's identity and remembers it durably.
    ///
    /// The in-memory principal and the `set_principal` command are updated
    /// even if persisting fails.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Identity`] if the identity store rejected
    /// the write.
    pub fn set_principal(&self, principal: &str) -> Result<(), RealtimeError> {
        *lock(&self.principal) = Some(principal.to_string());
        let stored = self.identity_store.store_principal(principal);
        if let Err(error) = &stored {
            tracing::warn!(%error, "could not persist principal");
        }
        self.send(OutboundMessage::SetPrincipal {
            principal: principal.to_string(),
            timestamp: self.clock.now_ms(),
        });
        stored
    }
}
