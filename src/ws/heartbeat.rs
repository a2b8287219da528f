//! Periodic liveness ping and latency measurement.
//!
//! While the connection is open the monitor fires a tick every interval; the
//! connection manager turns each tick into a `ping{timestamp}`. A `pong`
//! echoing an outstanding ping timestamp yields the round-trip latency.
//!
//! A missing pong never forces a reconnect on its own. Liveness failures are
//! detected only through the transport's close/error signalling.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::sync::lock;

/// Pings remembered while waiting for their pong.
const MAX_OUTSTANDING_PINGS: usize = 16;

/// Heartbeat timer plus the set of unanswered ping timestamps.
#[derive(Debug, Default)]
pub struct HeartbeatMonitor {
    task: Mutex<Option<JoinHandle<()>>>,
    outstanding: Mutex<VecDeque<i64>>,
}

impl HeartbeatMonitor {
    /// Creates a stopped monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts calling `tick` every `interval`, first after one full interval.
    /// Restarts the timer if it was already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(&self, interval: Duration, tick: F)
    where
        F: Fn() + Send + 'static,
    {
        let period = interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                tick();
            }
        });
        if let Some(previous) = lock(&self.task).replace(handle) {
            previous.abort();
        }
    }

    /// Stops the timer and forgets unanswered pings.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
        lock(&self.outstanding).clear();
    }

    /// Returns `true` while the timer is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.task)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Remembers a ping sent at `timestamp`.
    pub fn record_ping(&self, timestamp: i64) {
        let mut outstanding = lock(&self.outstanding);
        if outstanding.len() >= MAX_OUTSTANDING_PINGS {
            let _ = outstanding.pop_front();
        }
        outstanding.push_back(timestamp);
    }

    /// Matches a pong against the outstanding pings.
    ///
    /// Returns the latency `now_ms - echoed` if `echoed` belongs to an
    /// unanswered ping. Older pings are discarded along with it since their
    /// pongs can no longer arrive in order.
    pub fn resolve_pong(&self, echoed: i64, now_ms: i64) -> Option<u64> {
        let mut outstanding = lock(&self.outstanding);
        let position = outstanding.iter().position(|&ts| ts == echoed)?;
        let _ = outstanding.drain(..=position);
        Some(u64::try_from(now_ms.saturating_sub(echoed)).unwrap_or(0))
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
    }
}
