//! Connection counters and latency.
//!
//! [`StatsTracker`] is the single mutable holder of [`ConnectionStats`]. The
//! connection manager and heartbeat monitor write to it; consumers only ever
//! see an owned snapshot.

use std::sync::Mutex;

use serde::Serialize;

use crate::sync::lock;

/// Point-in-time copy of the connection counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    /// Whether the transport is currently open.
    pub connected: bool,
    /// Reconnects scheduled since the last successful open.
    pub reconnect_attempts: u32,
    /// Milliseconds since the Unix epoch of the last successful open.
    pub last_connected: Option<i64>,
    /// Last measured heartbeat round trip, in milliseconds.
    pub latency: Option<u64>,
    /// Inbound frames received, including malformed ones.
    pub messages_received: u64,
    /// Outbound frames transmitted.
    pub messages_sent: u64,
}

/// Thread-safe owner of the live [`ConnectionStats`].
#[derive(Debug, Default)]
pub struct StatsTracker {
    inner: Mutex<ConnectionStats>,
}

impl StatsTracker {
    /// Creates a tracker with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one inbound frame.
    pub fn record_received(&self) {
        let mut stats = lock(&self.inner);
        stats.messages_received = stats.messages_received.saturating_add(1);
    }

    /// Counts one outbound frame.
    pub fn record_sent(&self) {
        let mut stats = lock(&self.inner);
        stats.messages_sent = stats.messages_sent.saturating_add(1);
    }

    /// Counts one scheduled reconnect and returns the new total.
    pub fn record_reconnect_scheduled(&self) -> u32 {
        let mut stats = lock(&self.inner);
        stats.reconnect_attempts = stats.reconnect_attempts.saturating_add(1);
        stats.reconnect_attempts
    }

    /// Reconnects scheduled since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        lock(&self.inner).reconnect_attempts
    }

    /// Records a successful open at `now_ms`.
    ///
    /// Resets the reconnect counter and returns its previous value, so the
    /// caller can tell a first connect from a reconnect.
    pub fn mark_connected(&self, now_ms: i64) -> u32 {
        let mut stats = lock(&self.inner);
        stats.connected = true;
        stats.last_connected = Some(now_ms);
        std::mem::take(&mut stats.reconnect_attempts)
    }

    /// Zeroes the reconnect counter without marking a connection, returning
    /// the previous value.
    pub fn reset_reconnect_attempts(&self) -> u32 {
        std::mem::take(&mut lock(&self.inner).reconnect_attempts)
    }

    /// Records that the transport is no longer open.
    pub fn mark_disconnected(&self) {
        lock(&self.inner).connected = false;
    }

    /// Stores the latest heartbeat round trip.
    pub fn record_latency(&self, latency_ms: u64) {
        lock(&self.inner).latency = Some(latency_ms);
    }

    /// Returns an owned copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionStats {
        lock(&self.inner).clone()
    }
}
