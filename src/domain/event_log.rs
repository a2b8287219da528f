//! What happened after dispatch: a recent-event window and a live stream.
//!
//! Every event that went through the subscription registry is recorded
//! here. The window answers `recent_events()` queries; the broadcast side
//! feeds `event_stream()` receivers for consumers that prefer `await` over
//! callbacks. Neither is persisted.

use std::sync::Mutex;

use tokio::sync::broadcast;

use super::{BoundedBuffer, RealtimeEvent};
use crate::sync::lock;

/// Dispatched events, kept in a drop-oldest window and mirrored to stream
/// receivers. A receiver that falls more than the stream capacity behind
/// gets `Lagged` and skips ahead.
#[derive(Debug)]
pub struct EventLog {
    window: Mutex<BoundedBuffer<RealtimeEvent>>,
    stream: broadcast::Sender<RealtimeEvent>,
}

impl EventLog {
    /// Creates a log keeping `window_capacity` events for queries and
    /// buffering up to `stream_capacity` per stream receiver.
    #[must_use]
    pub fn new(window_capacity: usize, stream_capacity: usize) -> Self {
        let (stream, _) = broadcast::channel(stream_capacity.max(1));
        Self {
            window: Mutex::new(BoundedBuffer::new(window_capacity)),
            stream,
        }
    }

    /// Records a dispatched event and forwards it to live receivers.
    /// Returns how many receivers got it.
    pub fn record(&self, event: RealtimeEvent) -> usize {
        let _ = lock(&self.window).push(event.clone());
        self.stream.send(event).unwrap_or(0)
    }

    /// Receiver for events recorded from now on.
    #[must_use]
    pub fn stream(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.stream.subscribe()
    }

    /// Returns up to `limit` of the newest events in arrival order,
    /// optionally restricted to one event type.
    #[must_use]
    pub fn recent(&self, event_type: Option<&str>, limit: usize) -> Vec<RealtimeEvent> {
        let window = lock(&self.window);
        let mut newest: Vec<RealtimeEvent> = window
            .iter()
            .rev()
            .filter(|event| event_type.is_none_or(|wanted| event.event_type() == wanted))
            .take(limit)
            .cloned()
            .collect();
        newest.reverse();
        newest
    }
}
