//! Millisecond clocks used for wire timestamps and latency.
//!
//! The client never reads the system clock directly; it asks an injected
//! [`Clock`]. [`MonotonicClock`] is the default, [`ManualClock`] lets tests
//! pin exact timestamps.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use tokio::time::Instant;

/// Source of "now" in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// Wall clock anchored once at construction and advanced by the tokio clock.
///
/// Readings never go backwards, and under paused tokio time (tests) they
/// advance exactly as far as the runtime's virtual clock.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    origin_ms: i64,
}

impl MonotonicClock {
    /// Anchors a new clock at the current wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            origin_ms: Utc::now().timestamp_millis(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        let elapsed = i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.origin_ms.saturating_add(elapsed)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `now_ms`.
    #[must_use]
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
        }
    }

    /// Sets the current reading.
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Moves the reading forward by `delta_ms`.
    pub fn advance(&self, delta_ms: i64) {
        let _ = self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
