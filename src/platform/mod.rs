//! Injected platform collaborators.
//!
//! The client has no direct dependency on local storage or UI; it talks to
//! these small traits, and applications (or tests) supply implementations.

pub mod alert;
pub mod identity;

pub use alert::{AlertSink, TracingAlertSink};
pub use identity::{
    FileIdentityStore, IdentityProvider, IdentityStore, MemoryIdentityStore,
    StaticIdentityProvider,
};
