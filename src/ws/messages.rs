//! Wire messages exchanged with the gateway.
//!
//! Every frame is a JSON object with a `type` discriminator. Both directions
//! are closed sum types, so an unknown `type` fails to parse instead of being
//! silently ignored.

use serde::{Deserialize, Serialize};

use crate::domain::{Priority, RealtimeEvent, SubscriptionId};
use crate::error::RealtimeError;

/// Messages the gateway sends to the client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Heartbeat reply echoing the ping timestamp.
    Pong {
        /// Timestamp copied from the matching `ping`.
        timestamp: i64,
    },
    /// A live or replayed event.
    Event {
        /// The event body.
        event: EventPayload,
    },
    /// Diagnostic error reported by the gateway.
    Error {
        /// Human-readable description.
        error: String,
    },
    /// The gateway wants the client to identify itself.
    AuthRequired,
}

impl InboundMessage {
    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Protocol`] for malformed JSON, an unknown
    /// `type`, or missing required fields.
    pub fn parse(text: &str) -> Result<Self, RealtimeError> {
        serde_json::from_str(text).map_err(|e| RealtimeError::Protocol(e.to_string()))
    }
}

/// Event body as it appears on the wire. Only `type` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Sender-assigned id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Opaque payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Delivery priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl EventPayload {
    /// Completes missing fields and freezes the event. A missing id is
    /// generated, a missing timestamp becomes `received_at_ms`.
    #[must_use]
    pub fn into_event(self, received_at_ms: i64) -> RealtimeEvent {
        let priority = self.priority.unwrap_or_default();
        let timestamp = self.timestamp.unwrap_or(received_at_ms);
        match self.id {
            Some(id) if !id.is_empty() => {
                RealtimeEvent::with_id(id, self.event_type, self.data, priority, timestamp)
            }
            _ => RealtimeEvent::new(self.event_type, self.data, priority, timestamp),
        }
    }
}

/// Commands the client sends to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    /// Heartbeat ping.
    Ping {
        /// Local send time, echoed back in the `pong`.
        timestamp: i64,
    },
    /// Identifies the caller after `auth_required`.
    Authenticate {
        /// Caller identity.
        principal: String,
        /// Local send time.
        timestamp: i64,
    },
    /// Announces a subscription for server-side filtering.
    Subscribe {
        /// Event type or wildcard.
        event_type: String,
        /// Client-side subscription id.
        subscription_id: SubscriptionId,
        /// Local send time.
        timestamp: i64,
    },
    /// Withdraws a subscription announcement.
    Unsubscribe {
        /// Client-side subscription id.
        subscription_id: SubscriptionId,
        /// Local send time.
        timestamp: i64,
    },
    /// Publishes an event through the gateway.
    Emit {
        /// Event type.
        event_type: String,
        /// Opaque payload.
        data: serde_json::Value,
        /// Delivery priority.
        priority: Priority,
        /// Local send time.
        timestamp: i64,
    },
    /// Asks for redelivery of past events.
    ReplayRequest {
        /// Event type to replay.
        event_type: String,
        /// Start of the replay window.
        from_timestamp: i64,
        /// Local send time.
        timestamp: i64,
    },
    /// Asks the gateway for a `health_response` event.
    HealthCheck {
        /// Local send time.
        timestamp: i64,
    },
    /// Changes the identity bound to this connection.
    SetPrincipal {
        /// New caller identity.
        principal: String,
        /// Local send time.
        timestamp: i64,
    },
}

impl OutboundMessage {
    /// Returns the `type` discriminator as a static string slice.
    #[must_use]
    pub const fn type_str(&self) -> &'static str {
        match self {
            Self::Ping { .. } => "ping",
            Self::Authenticate { .. } => "authenticate",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Emit { .. } => "emit",
            Self::ReplayRequest { .. } => "replay_request",
            Self::HealthCheck { .. } => "health_check",
            Self::SetPrincipal { .. } => "set_principal",
        }
    }

    /// Encodes the message as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Serialization`] if the payload cannot be
    /// encoded.
    pub fn to_json(&self) -> Result<String, RealtimeError> {
        Ok(serde_json::to_string(self)?)
    }
}
