//! # credential-realtime
//!
//! Real-time event distribution client for the credential issuance gateway.
//!
//! The client keeps one WebSocket connection to the gateway alive, repairs it
//! with exponential backoff, fans inbound events out to in-process
//! subscribers and queues outbound commands while offline. Every call on the
//! consumer surface is fire-and-forget; connection trouble is reported
//! through lifecycle hooks and the stats snapshot, never as an error.
//!
//! ## Architecture
//!
//! ```text
//! Consumers (UI, services)
//!     │
//!     ├── RealtimeClient (client)
//!     │       ├── ReplayCoordinator (ws/replay)
//!     │       └── ConnectionManager (ws/connection)
//!     │               ├── OutboundQueue ── BoundedBuffer (domain)
//!     │               ├── HeartbeatMonitor
//!     │               ├── SubscriptionRegistry ── EventLog
//!     │               ├── StatsTracker (domain)
//!     │               └── LifecycleHooks
//!     │
//!     ├── Connector (ws/transport) ── tokio-tungstenite
//!     └── IdentityStore / IdentityProvider / AlertSink (platform)
//! ```

pub mod client;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod platform;
mod sync;
pub mod ws;

pub use client::{HookHandle, RealtimeClient, RealtimeClientBuilder, SubscriptionHandle};
pub use config::ClientConfig;
pub use domain::{ConnectionStats, Priority, RealtimeEvent, SubscriptionId};
pub use error::RealtimeError;
pub use ws::{ConnectionState, HealthStatus, WILDCARD};
