//! WebSocket layer: connection lifecycle, message routing, subscriptions.
//!
//! The client keeps one connection to
//! `{gateway_url}/{instance_id}/{protocol_version}` and multiplexes every
//! subscription and command over it.

pub mod backoff;
pub mod connection;
pub mod heartbeat;
pub mod hooks;
pub mod messages;
pub mod outbound_queue;
pub mod replay;
pub mod subscription;
pub mod transport;

pub use connection::{ConnectionManager, ConnectionState, ManagerParts};
pub use replay::{HEALTH_RESPONSE_EVENT, HealthStatus, ReplayCoordinator};
pub use subscription::{SubscriptionInfo, WILDCARD};
pub use transport::{Connector, TransportFrame, TransportLink, TungsteniteConnector};
