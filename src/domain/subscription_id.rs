//! Type-safe subscription identifier.
//!
//! [`SubscriptionId`] is a newtype wrapper around [`uuid::Uuid`] (v4) so that
//! subscription identifiers cannot be confused with event ids or other UUIDs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a [`crate::ws::subscription::Subscription`].
///
/// Generated once by the registry at subscribe time and immutable
/// thereafter. Sent to the gateway in `subscribe`/`unsubscribe` announcements
/// so server-side filtering can be keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(uuid::Uuid);

impl SubscriptionId {
    /// Creates a new random `SubscriptionId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
