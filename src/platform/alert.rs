//! Local alert surface for urgent events.

use std::fmt;

use crate::domain::RealtimeEvent;

/// Surfaces an event to the local user (popup, notification, log line).
pub trait AlertSink: Send + Sync + fmt::Debug {
    /// Raises an alert for `event`. Must not block.
    fn alert(&self, event: &RealtimeEvent);
}

/// Alert sink that writes a warning through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, event: &RealtimeEvent) {
        tracing::warn!(
            event_id = event.id(),
            event_type = event.event_type(),
            priority = %event.priority(),
            data = %event.data(),
            "critical event received"
        );
    }
}
