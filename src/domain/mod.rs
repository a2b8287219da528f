//! Domain layer: events, identifiers, counters and bounded buffers.
//!
//! These are the plain data holders of the client. None of them knows about
//! the transport; the `ws` layer wires them together.

pub mod bounded;
pub mod event;
pub mod event_log;
pub mod stats;
pub mod subscription_id;

pub use bounded::BoundedBuffer;
pub use event::{Priority, RealtimeEvent};
pub use event_log::EventLog;
pub use stats::{ConnectionStats, StatsTracker};
pub use subscription_id::SubscriptionId;
