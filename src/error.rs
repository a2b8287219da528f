//! Client error types.
//!
//! [`RealtimeError`] is the central error type for the client. Most variants
//! never reach a caller as a `Result`: transport failures are recovered by
//! reconnecting and surfaced through `on_error` hooks, while protocol and
//! server errors are logged and the offending frame dropped. Only the
//! request/response style calls (health checks, identity persistence,
//! configuration loading) return them directly.

use crate::domain::SubscriptionId;

/// Client-side error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category                 | Recovered automatically |
/// |-----------|--------------------------|-------------------------|
/// | 1000–1999 | Transport                | yes (reconnect)         |
/// | 2000–2999 | Protocol / Server        | yes (frame dropped)     |
/// | 3000–3999 | Client-side              | depends on variant      |
/// | 4000–4999 | Configuration / Identity | no                      |
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// Opening, reading or writing the transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound frame could not be parsed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The gateway sent an explicit `error` message.
    #[error("server error: {0}")]
    Server(String),

    /// A subscriber callback panicked while handling an event.
    #[error("subscriber {subscription_id} failed: {message}")]
    Subscriber {
        /// Subscription whose callback failed.
        subscription_id: SubscriptionId,
        /// Panic message captured from the callback.
        message: String,
    },

    /// Reconnection stopped after the configured number of attempts.
    #[error("reconnect attempts exhausted after {attempts} attempts")]
    Exhausted {
        /// Number of reconnect attempts that were scheduled.
        attempts: u32,
    },

    /// The operation needs an open connection.
    #[error("not connected to the gateway")]
    NotConnected,

    /// The gateway did not answer a health check in time.
    #[error("health check timed out after {timeout_ms} ms")]
    HealthCheckTimeout {
        /// Deadline that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing the persisted principal failed.
    #[error("identity store error: {0}")]
    Identity(String),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RealtimeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Transport(_) => 1001,
            Self::Protocol(_) => 2001,
            Self::Serialization(_) => 2002,
            Self::Server(_) => 2003,
            Self::Subscriber { .. } => 3001,
            Self::NotConnected => 3002,
            Self::HealthCheckTimeout { .. } => 3003,
            Self::Exhausted { .. } => 3004,
            Self::Config(_) => 4001,
            Self::Identity(_) => 4002,
        }
    }

    /// Returns `true` if the client recovers from this error on its own.
    ///
    /// Exhaustion is the only connection-level failure that is effectively
    /// fatal: a manual `connect()` is required afterwards.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(_)
            | Self::Protocol(_)
            | Self::Serialization(_)
            | Self::Server(_)
            | Self::Subscriber { .. }
            | Self::NotConnected
            | Self::HealthCheckTimeout { .. } => true,
            Self::Exhausted { .. } | Self::Config(_) | Self::Identity(_) => false,
        }
    }
}
