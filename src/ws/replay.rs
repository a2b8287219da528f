//! Historical redelivery and ad-hoc health checks.
//!
//! Replayed events come back as ordinary `event` frames and go through the
//! same dispatch path as live ones; nothing marks them as replayed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

use super::connection::ConnectionManager;
use super::messages::OutboundMessage;
use super::subscription::EventCallback;
use crate::domain::{RealtimeEvent, SubscriptionId};
use crate::error::RealtimeError;
use crate::sync::lock;

/// Event type the gateway uses to answer `health_check`.
pub const HEALTH_RESPONSE_EVENT: &str = "health_response";

/// Result of a successful health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// Always `true` for a timely answer.
    pub connected: bool,
    /// Round trip of the check in milliseconds.
    pub latency: u64,
    /// Gateway clock at the time it answered, if reported.
    pub server_time: Option<i64>,
    /// Gateway version, if reported.
    pub version: Option<String>,
}

/// Issues replay requests and health checks over a shared connection.
#[derive(Debug, Clone)]
pub struct ReplayCoordinator {
    manager: Arc<ConnectionManager>,
    lookback: Duration,
    health_timeout: Duration,
}

/// Removes the temporary health subscription however `health()` ends.
struct SubscriptionGuard<'a> {
    manager: &'a ConnectionManager,
    id: SubscriptionId,
}

impl Drop for SubscriptionGuard<'_> {
    fn drop(&mut self) {
        let _ = self.manager.unsubscribe(self.id);
    }
}

impl ReplayCoordinator {
    /// Creates a coordinator using the manager's configured lookback and
    /// health timeout.
    #[must_use]
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        let lookback = manager.config().replay_lookback;
        let health_timeout = manager.config().health_check_timeout;
        Self {
            manager,
            lookback,
            health_timeout,
        }
    }

    /// Asks the gateway to redeliver `event_type` events since
    /// `from_timestamp`, or since one lookback window ago when omitted.
    ///
    /// Returns the timestamp actually requested. Queued if offline.
    pub fn request_replay(&self, event_type: &str, from_timestamp: Option<i64>) -> i64 {
        let now = self.manager.now_ms();
        let lookback_ms = i64::try_from(self.lookback.as_millis()).unwrap_or(i64::MAX);
        let from = from_timestamp.unwrap_or_else(|| now.saturating_sub(lookback_ms));

        tracing::debug!(event_type, from_timestamp = from, "requesting replay");
        self.manager.send(OutboundMessage::ReplayRequest {
            event_type: event_type.to_string(),
            from_timestamp: from,
            timestamp: now,
        });
        from
    }

    /// Sends a `health_check` and waits for the gateway's answer.
    ///
    /// The temporary `health_response` subscription is removed whether the
    /// check succeeds, times out or the future is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::NotConnected`] when the connection is not
    /// open, and [`RealtimeError::HealthCheckTimeout`] when no answer
    /// arrives within the configured timeout.
    pub async fn health(&self) -> Result<HealthStatus, RealtimeError> {
        if !self.manager.is_connected() {
            return Err(RealtimeError::NotConnected);
        }

        let (tx, rx) = oneshot::channel::<RealtimeEvent>();
        let slot = Mutex::new(Some(tx));
        let callback: EventCallback = Arc::new(move |event: &RealtimeEvent| {
            if let Some(tx) = lock(&slot).take() {
                let _ = tx.send(event.clone());
            }
        });
        let subscription = self
            .manager
            .subscribe(HEALTH_RESPONSE_EVENT, callback, None);
        let _guard = SubscriptionGuard {
            manager: &self.manager,
            id: subscription.id(),
        };

        let sent_at = self.manager.now_ms();
        self.manager
            .send(OutboundMessage::HealthCheck { timestamp: sent_at });

        let timeout_ms = u64::try_from(self.health_timeout.as_millis()).unwrap_or(u64::MAX);
        let Ok(Ok(response)) = tokio::time::timeout(self.health_timeout, rx).await else {
            tracing::warn!(timeout_ms, "health check unanswered");
            return Err(RealtimeError::HealthCheckTimeout { timeout_ms });
        };

        let latency = u64::try_from(self.manager.now_ms().saturating_sub(sent_at)).unwrap_or(0);
        let data = response.data();
        Ok(HealthStatus {
            connected: true,
            latency,
            server_time: data.get("serverTime").and_then(serde_json::Value::as_i64),
            version: data
                .get("version")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ClientConfig;
    use crate::platform::{MemoryIdentityStore, TracingAlertSink};
    use crate::ws::connection::ManagerParts;
    use crate::ws::transport::{Connector, TransportLink};
    use futures_util::future::BoxFuture;

    #[derive(Debug)]
    struct Unreachable;

    impl Connector for Unreachable {
        fn connect(&self, url: &str) -> BoxFuture<'static, Result<TransportLink, RealtimeError>> {
            let url = url.to_string();
            Box::pin(async move { Err(RealtimeError::Transport(format!("{url} unreachable"))) })
        }
    }

    fn coordinator(clock: Arc<ManualClock>) -> (Arc<ConnectionManager>, ReplayCoordinator) {
        let parts = ManagerParts {
            connector: Arc::new(Unreachable),
            clock,
            identity_store: Arc::new(MemoryIdentityStore::new()),
            identity_provider: None,
            alerts: Arc::new(TracingAlertSink),
        };
        let manager = Arc::new(ConnectionManager::new(
            ClientConfig::new("ws://gateway.test", "issuer-1"),
            parts,
        ));
        let replay = ReplayCoordinator::new(Arc::clone(&manager));
        (manager, replay)
    }

    #[test]
    fn replay_defaults_to_one_hour_lookback() {
        let clock = Arc::new(ManualClock::new(10_000_000));
        let (manager, replay) = coordinator(clock);

        assert_eq!(replay.request_replay("credential_issued", None), 10_000_000 - 3_600_000);
        assert_eq!(manager.queued_len(), 1);
    }

    #[test]
    fn replay_honours_explicit_start() {
        let clock = Arc::new(ManualClock::new(5_000));
        let (_manager, replay) = coordinator(clock);
        assert_eq!(replay.request_replay("credential_revoked", Some(1_234)), 1_234);
    }

    #[tokio::test]
    async fn health_requires_open_connection() {
        let clock = Arc::new(ManualClock::new(0));
        let (manager, replay) = coordinator(clock);

        let Err(RealtimeError::NotConnected) = replay.health().await else {
            panic!("health must fail while closed");
        };
        assert!(manager.registry().is_empty());
        assert_eq!(manager.queued_len(), 0);
    }
}
