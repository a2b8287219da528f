//! Consumer-facing client.
//!
//! [`RealtimeClient`] is a cheap, cloneable handle over one
//! [`ConnectionManager`]. Build it once at start-up and pass clones to
//! whatever needs realtime events; all clones share the same connection.
//!
//! ```no_run
//! use credential_realtime::{ClientConfig, RealtimeClient, RealtimeEvent};
//!
//! # async fn run() -> Result<(), credential_realtime::RealtimeError> {
//! let client = RealtimeClient::builder(ClientConfig::from_env()?).build()?;
//! let handle = client.subscribe("credential_issued", |event: &RealtimeEvent| {
//!     println!("issued: {}", event.data());
//! });
//! client.connect();
//! // ...
//! handle.unsubscribe();
//! client.disconnect();
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Weak};

use tokio::sync::broadcast;

use crate::clock::{Clock, MonotonicClock};
use crate::config::ClientConfig;
use crate::domain::{ConnectionStats, Priority, RealtimeEvent, SubscriptionId};
use crate::error::RealtimeError;
use crate::platform::{
    AlertSink, FileIdentityStore, IdentityProvider, IdentityStore, MemoryIdentityStore,
    TracingAlertSink,
};
use crate::ws::connection::{ConnectionManager, ConnectionState, ManagerParts};
use crate::ws::hooks::{HookId, LifecycleEvent};
use crate::ws::messages::OutboundMessage;
use crate::ws::replay::{HealthStatus, ReplayCoordinator};
use crate::ws::subscription::{EventCallback, EventFilter, SubscriptionInfo};
use crate::ws::transport::{Connector, TungsteniteConnector};

/// Handle to the shared realtime connection.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    manager: Arc<ConnectionManager>,
    replay: ReplayCoordinator,
}

/// Builder for [`RealtimeClient`] with injectable collaborators.
#[derive(Debug)]
pub struct RealtimeClientBuilder {
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
    clock: Option<Arc<dyn Clock>>,
    identity_store: Option<Arc<dyn IdentityStore>>,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    alert_sink: Option<Arc<dyn AlertSink>>,
}

impl RealtimeClientBuilder {
    /// Uses `connector` instead of the WebSocket transport.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Uses `clock` for timestamps and latency.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Persists the last known principal in `store`.
    #[must_use]
    pub fn identity_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.identity_store = Some(store);
        self
    }

    /// Takes the current principal from `provider` when authenticating.
    #[must_use]
    pub fn identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    /// Surfaces critical events through `sink`.
    #[must_use]
    pub fn alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sink = Some(sink);
        self
    }

    /// Builds the client. Nothing connects until [`RealtimeClient::connect`].
    ///
    /// Without an explicit identity store, a [`FileIdentityStore`] is used
    /// when the configuration names an identity path, otherwise an
    /// in-memory one.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] if the configuration does not
    /// validate (non-`ws`/`wss` gateway URL or blank instance id).
    pub fn build(self) -> Result<RealtimeClient, RealtimeError> {
        self.config.validate()?;
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TungsteniteConnector::new(self.config.connect_timeout)));
        let identity_store = self.identity_store.unwrap_or_else(|| {
            let store: Arc<dyn IdentityStore> = match &self.config.identity_path {
                Some(path) => Arc::new(FileIdentityStore::new(path)),
                None => Arc::new(MemoryIdentityStore::new()),
            };
            store
        });
        let parts = ManagerParts {
            connector,
            clock: self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new())),
            identity_store,
            identity_provider: self.identity_provider,
            alerts: self.alert_sink.unwrap_or_else(|| Arc::new(TracingAlertSink)),
        };

        let manager = Arc::new(ConnectionManager::new(self.config, parts));
        let replay = ReplayCoordinator::new(Arc::clone(&manager));
        Ok(RealtimeClient { manager, replay })
    }
}

/// Returned by `subscribe`; removes the subscription when asked.
///
/// Dropping the handle does not unsubscribe.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    manager: Weak<ConnectionManager>,
}

impl SubscriptionHandle {
    /// Subscription identifier.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stops all future deliveries to this subscription. Returns `false` if
    /// it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.manager
            .upgrade()
            .is_some_and(|manager| manager.unsubscribe(self.id))
    }
}

/// Returned by the `on_*` hook registrations.
#[derive(Debug, Clone)]
pub struct HookHandle {
    event: LifecycleEvent,
    id: HookId,
    manager: Weak<ConnectionManager>,
}

impl HookHandle {
    /// Deregisters the hook. Returns `false` if it was already removed.
    pub fn remove(self) -> bool {
        self.manager
            .upgrade()
            .is_some_and(|manager| manager.hooks().remove(self.event, self.id))
    }
}

impl RealtimeClient {
    /// Starts building a client for `config`.
    #[must_use]
    pub fn builder(config: ClientConfig) -> RealtimeClientBuilder {
        RealtimeClientBuilder {
            config,
            connector: None,
            clock: None,
            identity_store: None,
            identity_provider: None,
            alert_sink: None,
        }
    }

    /// Client with the WebSocket transport and default collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] if `config` does not validate.
    pub fn new(config: ClientConfig) -> Result<Self, RealtimeError> {
        Self::builder(config).build()
    }

    // ── Connection ─────────────────────────────────────────────────────────

    /// Starts connecting in the background and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        self.manager.connect();
    }

    /// Closes the connection and stops reconnecting. Clears every
    /// subscription and queued command.
    pub fn disconnect(&self) {
        self.manager.disconnect();
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Returns `true` while the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Returns `true` once automatic reconnection has given up.
    #[must_use]
    pub fn is_reconnect_exhausted(&self) -> bool {
        self.manager.is_reconnect_exhausted()
    }

    /// Snapshot of the connection counters.
    #[must_use]
    pub fn connection_stats(&self) -> ConnectionStats {
        self.manager.stats().snapshot()
    }

    /// Commands waiting for the connection to open.
    #[must_use]
    pub fn queued_messages(&self) -> usize {
        self.manager.queued_len()
    }

    /// Queued commands evicted because the offline queue was full.
    #[must_use]
    pub fn dropped_messages(&self) -> u64 {
        self.manager.dropped_commands()
    }

    // ── Subscriptions ──────────────────────────────────────────────────────

    /// Delivers every `event_type` event to `callback`. Use
    /// [`WILDCARD`](crate::ws::WILDCARD) for all events.
    pub fn subscribe<F>(&self, event_type: &str, callback: F) -> SubscriptionHandle
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        self.register(event_type, Arc::new(callback), None)
    }

    /// Like [`subscribe`](Self::subscribe), but only for events `filter`
    /// accepts.
    pub fn subscribe_filtered<F, P>(
        &self,
        event_type: &str,
        callback: F,
        filter: P,
    ) -> SubscriptionHandle
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
        P: Fn(&RealtimeEvent) -> bool + Send + Sync + 'static,
    {
        self.register(event_type, Arc::new(callback), Some(Arc::new(filter)))
    }

    fn register(
        &self,
        event_type: &str,
        callback: EventCallback,
        filter: Option<EventFilter>,
    ) -> SubscriptionHandle {
        let subscription = self.manager.subscribe(event_type, callback, filter);
        SubscriptionHandle {
            id: subscription.id(),
            manager: Arc::downgrade(&self.manager),
        }
    }

    /// Removes a subscription by id. Returns `false` if unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.manager.unsubscribe(id)
    }

    /// Currently registered subscriptions, oldest first.
    #[must_use]
    pub fn active_subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.manager.registry().active()
    }

    /// Receiver for every dispatched event, for async consumers.
    #[must_use]
    pub fn event_stream(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.manager.events().stream()
    }

    /// Newest `limit` events from the in-memory window, optionally only of
    /// `event_type`, in arrival order.
    #[must_use]
    pub fn recent_events(&self, event_type: Option<&str>, limit: usize) -> Vec<RealtimeEvent> {
        self.manager.events().recent(event_type, limit)
    }

    // ── Commands ───────────────────────────────────────────────────────────

    /// Publishes an event with medium priority.
    pub fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.emit_with_priority(event_type, data, Priority::default());
    }

    /// Publishes an event. Queued if offline.
    pub fn emit_with_priority(&self, event_type: &str, data: serde_json::Value, priority: Priority) {
        self.manager.send(OutboundMessage::Emit {
            event_type: event_type.to_string(),
            data,
            priority,
            timestamp: self.manager.now_ms(),
        });
    }

    /// Sends a raw protocol command. Queued if offline.
    pub fn send(&self, message: OutboundMessage) {
        self.manager.send(message);
    }

    /// Requests redelivery of `event_type` since `from_timestamp`, or the
    /// configured lookback. Returns the start timestamp requested.
    pub fn request_replay(&self, event_type: &str, from_timestamp: Option<i64>) -> i64 {
        self.replay.request_replay(event_type, from_timestamp)
    }

    /// Round-trips a health check with the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::NotConnected`] if the connection is not open
    /// and [`RealtimeError::HealthCheckTimeout`] if the gateway does not
    /// answer in time.
    pub async fn health(&self) -> Result<HealthStatus, RealtimeError> {
        self.replay.health().await
    }

    // ── Identity ───────────────────────────────────────────────────────────

    /// Switches identity and persists it as the last known principal.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Identity`] if persisting failed; the new
    /// principal is still used for this session.
    pub fn set_principal(&self, principal: &str) -> Result<(), RealtimeError> {
        self.manager.set_principal(principal)
    }

    /// Principal that would be sent on `auth_required`.
    #[must_use]
    pub fn principal(&self) -> Option<String> {
        self.manager.current_principal()
    }

    // ── Hooks ──────────────────────────────────────────────────────────────

    /// Runs `callback` every time the connection opens.
    pub fn on_connect<F>(&self, callback: F) -> HookHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hook(LifecycleEvent::Connect, callback)
    }

    /// Runs `callback` every time an open connection closes.
    pub fn on_disconnect<F>(&self, callback: F) -> HookHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hook(LifecycleEvent::Disconnect, callback)
    }

    /// Runs `callback` when the connection opens after failed attempts.
    pub fn on_reconnect<F>(&self, callback: F) -> HookHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hook(LifecycleEvent::Reconnect, callback)
    }

    /// Runs `callback` with every transport-level error.
    pub fn on_error<F>(&self, callback: F) -> HookHandle
    where
        F: Fn(&RealtimeError) + Send + Sync + 'static,
    {
        let id = self.manager.hooks().register_error(Arc::new(callback));
        HookHandle {
            event: LifecycleEvent::Error,
            id,
            manager: Arc::downgrade(&self.manager),
        }
    }

    fn hook<F>(&self, event: LifecycleEvent, callback: F) -> HookHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.manager.hooks().register(event, Arc::new(callback));
        HookHandle {
            event,
            id,
            manager: Arc::downgrade(&self.manager),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::clock::ManualClock;
    use crate::platform::StaticIdentityProvider;

    fn offline_client() -> RealtimeClient {
        let Ok(client) = RealtimeClient::builder(ClientConfig::new("ws://gateway.test", "issuer-1"))
            .clock(Arc::new(ManualClock::new(1_000)))
            .build()
        else {
            panic!("valid config should build");
        };
        client
    }

    #[test]
    fn new_client_is_closed_and_empty() {
        let client = offline_client();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(!client.is_connected());
        assert!(!client.is_reconnect_exhausted());
        assert!(client.active_subscriptions().is_empty());
        assert_eq!(client.connection_stats().messages_sent, 0);
    }

    #[test]
    fn invalid_config_is_rejected_at_build() {
        let Err(err) = RealtimeClient::new(ClientConfig::new("http://gateway.test", "issuer-1"))
        else {
            panic!("http scheme must be rejected");
        };
        assert_eq!(err.error_code(), 4001);
        let Err(err) = RealtimeClient::new(ClientConfig::new("ws://gateway.test", "  ")) else {
            panic!("blank instance must be rejected");
        };
        assert_eq!(err.error_code(), 4001);
    }

    #[test]
    fn full_offline_queue_counts_evictions() {
        let mut config = ClientConfig::new("ws://gateway.test", "issuer-1");
        config.outbound_queue_capacity = 2;
        let Ok(client) = RealtimeClient::builder(config)
            .clock(Arc::new(ManualClock::new(0)))
            .build()
        else {
            panic!("valid config should build");
        };
        for seq in 0..5 {
            client.emit("credential_issued", serde_json::json!({ "seq": seq }));
        }
        assert_eq!(client.queued_messages(), 2);
        assert_eq!(client.dropped_messages(), 3);
    }

    #[test]
    fn offline_commands_are_queued() {
        let client = offline_client();
        client.emit("credential_issued", serde_json::json!({"holder": "h-1"}));
        client.request_replay("credential_issued", None);
        assert_eq!(client.queued_messages(), 2);
        assert_eq!(client.connection_stats().messages_sent, 0);
    }

    #[test]
    fn subscription_handle_unsubscribes_once() {
        let client = offline_client();
        let handle = client.subscribe("fraud_alert", |_: &RealtimeEvent| {});
        let id = handle.id();
        assert_eq!(client.active_subscriptions().len(), 1);
        assert!(handle.clone().unsubscribe());
        assert!(!handle.unsubscribe());
        assert!(!client.unsubscribe(id));
        assert!(client.active_subscriptions().is_empty());
    }

    #[test]
    fn hook_handle_removes_hook() {
        let client = offline_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = client.on_connect(move || {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(handle.clone().remove());
        assert!(!handle.remove());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn provider_principal_wins_over_stored() {
        let Ok(client) = RealtimeClient::builder(ClientConfig::new("ws://gateway.test", "issuer-1"))
            .identity_store(Arc::new(MemoryIdentityStore::with_principal("stored")))
            .identity_provider(Arc::new(StaticIdentityProvider::new("live")))
            .build()
        else {
            panic!("valid config should build");
        };
        assert_eq!(client.principal().as_deref(), Some("live"));
    }

    #[test]
    fn set_principal_persists_and_queues_command() {
        let store = Arc::new(MemoryIdentityStore::new());
        let Ok(client) = RealtimeClient::builder(ClientConfig::new("ws://gateway.test", "issuer-1"))
            .identity_store(Arc::clone(&store) as Arc<dyn IdentityStore>)
            .build()
        else {
            panic!("valid config should build");
        };

        tokio_test::assert_ok!(client.set_principal("did:web:issuer.example"));
        assert_eq!(client.principal().as_deref(), Some("did:web:issuer.example"));
        let Ok(Some(stored)) = store.load_principal() else {
            panic!("principal should be persisted");
        };
        assert_eq!(stored, "did:web:issuer.example");
        assert_eq!(client.queued_messages(), 1);
    }
}
