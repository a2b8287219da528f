//! Real-time events delivered to subscribers.
//!
//! A [`RealtimeEvent`] is produced once by the inbound frame parser and then
//! shared read-only with every matching subscriber, the recent-event window
//! and the broadcast stream.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Delivery priority attached to an event.
///
/// Ordered from least to most urgent. Priority never reorders delivery; it is
/// metadata for consumers (and `Critical` events are also raised as alerts).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Informational.
    Low,
    /// Default priority when the sender does not specify one.
    #[default]
    Medium,
    /// Needs prompt attention.
    High,
    /// Needs immediate attention; surfaced through the alert sink.
    Critical,
}

impl Priority {
    /// Returns the wire representation as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable event received from the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    timestamp: i64,
    data: serde_json::Value,
    priority: Priority,
}

impl RealtimeEvent {
    /// Creates an event with a freshly generated id.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        data: serde_json::Value,
        priority: Priority,
        timestamp: i64,
    ) -> Self {
        Self::with_id(
            uuid::Uuid::new_v4().to_string(),
            event_type,
            data,
            priority,
            timestamp,
        )
    }

    /// Creates an event with an explicit id.
    #[must_use]
    pub fn with_id(
        id: impl Into<String>,
        event_type: impl Into<String>,
        data: serde_json::Value,
        priority: Priority,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            timestamp,
            data,
            priority,
        }
    }

    /// Unique event id (sender-provided or generated on receipt).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Event type used for subscription matching.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Milliseconds since the Unix epoch.
    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Opaque payload.
    #[must_use]
    pub const fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Delivery priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }
}
