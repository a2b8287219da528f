//! Client-side subscription registry.
//!
//! Multiplexes the single inbound event stream to any number of independent
//! listeners. Subscriptions are keyed by event type; the reserved
//! [`WILDCARD`] key matches every type.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::domain::{RealtimeEvent, SubscriptionId};
use crate::error::RealtimeError;
use crate::sync::lock;

/// Event-type key that matches every event.
pub const WILDCARD: &str = "*";

/// Callback invoked for each matching event.
pub type EventCallback = Arc<dyn Fn(&RealtimeEvent) + Send + Sync>;

/// Optional predicate an event must satisfy to reach the callback.
pub type EventFilter = Arc<dyn Fn(&RealtimeEvent) -> bool + Send + Sync>;

/// One registered listener.
pub struct Subscription {
    id: SubscriptionId,
    event_type: String,
    sequence: u64,
    created_at: i64,
    callback: EventCallback,
    filter: Option<EventFilter>,
    active: AtomicBool,
}

impl Subscription {
    /// Subscription id.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Event type this subscription listens to (or [`WILDCARD`]).
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Returns `false` once the subscription has been removed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Read-only description of this subscription.
    #[must_use]
    pub fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            id: self.id,
            event_type: self.event_type.clone(),
            created_at: self.created_at,
            filtered: self.filter.is_some(),
        }
    }

    fn accepts(&self, event: &RealtimeEvent) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(event))
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("sequence", &self.sequence)
            .field("filtered", &self.filter.is_some())
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Snapshot of an active subscription, as exposed to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    /// Subscription id.
    pub id: SubscriptionId,
    /// Event type or [`WILDCARD`].
    pub event_type: String,
    /// Milliseconds since the Unix epoch at registration.
    pub created_at: i64,
    /// Whether a filter predicate is attached.
    pub filtered: bool,
}

/// Outcome of one [`SubscriptionRegistry::dispatch`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that ran to completion.
    pub delivered: usize,
    /// Subscriptions whose filter or callback panicked.
    pub failed: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    by_type: HashMap<String, Vec<Arc<Subscription>>>,
    next_sequence: u64,
}

/// Event-type to callback fan-out.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for `event_type` (or [`WILDCARD`]).
    pub fn subscribe(
        &self,
        event_type: &str,
        callback: EventCallback,
        filter: Option<EventFilter>,
        now_ms: i64,
    ) -> Arc<Subscription> {
        let mut state = lock(&self.state);
        let sequence = state.next_sequence;
        state.next_sequence = state.next_sequence.saturating_add(1);

        let subscription = Arc::new(Subscription {
            id: SubscriptionId::new(),
            event_type: event_type.to_string(),
            sequence,
            created_at: now_ms,
            callback,
            filter,
            active: AtomicBool::new(true),
        });
        state
            .by_type
            .entry(event_type.to_string())
            .or_default()
            .push(Arc::clone(&subscription));

        tracing::debug!(subscription_id = %subscription.id, event_type, "subscription added");
        subscription
    }

    /// Deactivates and removes a subscription. Returns it if it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        let mut state = lock(&self.state);
        let mut removed = None;
        state.by_type.retain(|_, subscriptions| {
            if let Some(index) = subscriptions.iter().position(|s| s.id == id) {
                let subscription = subscriptions.remove(index);
                subscription.deactivate();
                removed = Some(subscription);
            }
            !subscriptions.is_empty()
        });
        if removed.is_some() {
            tracing::debug!(subscription_id = %id, "subscription removed");
        }
        removed
    }

    /// Delivers `event` to every active subscription whose type matches
    /// (exactly or via wildcard) and whose filter accepts it.
    ///
    /// Callbacks run synchronously in registration order. The registry lock
    /// is released first, so callbacks may subscribe or unsubscribe; a
    /// subscription deactivated mid-pass is skipped if it has not run yet.
    /// A panicking filter or callback is logged as a failed delivery and
    /// does not affect the others.
    pub fn dispatch(&self, event: &RealtimeEvent) -> DispatchReport {
        let mut targets: Vec<Arc<Subscription>> = {
            let state = lock(&self.state);
            let exact = state.by_type.get(event.event_type());
            let wildcard = if event.event_type() == WILDCARD {
                None
            } else {
                state.by_type.get(WILDCARD)
            };
            exact
                .into_iter()
                .chain(wildcard)
                .flatten()
                .map(Arc::clone)
                .collect()
        };
        targets.sort_by_key(|s| s.sequence);

        let mut report = DispatchReport::default();
        for subscription in targets {
            if !subscription.is_active() {
                continue;
            }
            let delivery = catch_unwind(AssertUnwindSafe(|| {
                let accepted = subscription.accepts(event);
                if accepted {
                    (subscription.callback)(event);
                }
                accepted
            }));
            match delivery {
                Ok(true) => report.delivered += 1,
                Ok(false) => {}
                Err(panic) => {
                    report.failed += 1;
                    let error = RealtimeError::Subscriber {
                        subscription_id: subscription.id,
                        message: panic_message(panic.as_ref()),
                    };
                    tracing::warn!(
                        %error,
                        event_id = event.id(),
                        event_type = event.event_type(),
                        "subscriber callback failed"
                    );
                }
            }
        }
        report
    }

    /// Snapshots of all active subscriptions in registration order.
    #[must_use]
    pub fn active(&self) -> Vec<SubscriptionInfo> {
        let state = lock(&self.state);
        let mut subscriptions: Vec<&Arc<Subscription>> = state
            .by_type
            .values()
            .flatten()
            .filter(|s| s.is_active())
            .collect();
        subscriptions.sort_by_key(|s| s.sequence);
        subscriptions.into_iter().map(|s| s.info()).collect()
    }

    /// Deactivates and removes every subscription, returning how many there
    /// were.
    pub fn clear(&self) -> usize {
        let mut state = lock(&self.state);
        let mut cleared = 0;
        for subscription in state.by_type.drain().flat_map(|(_, subs)| subs) {
            subscription.deactivate();
            cleared += 1;
        }
        cleared
    }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.state).by_type.values().map(Vec::len).sum()
    }

    /// Returns `true` if there are no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::domain::Priority;

    fn event(event_type: &str, data: serde_json::Value) -> RealtimeEvent {
        RealtimeEvent::new(event_type, data, Priority::Medium, 0)
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> EventCallback {
        let log = Arc::clone(log);
        Arc::new(move |_: &RealtimeEvent| lock(&log).push(name))
    }

    fn counter() -> (Arc<AtomicUsize>, EventCallback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&hits);
        let callback: EventCallback = Arc::new(move |_: &RealtimeEvent| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (hits, callback)
    }

    #[test]
    fn exact_and_wildcard_matches_in_registration_order() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.subscribe(WILDCARD, recorder(&log, "all-1"), None, 0);
        registry.subscribe("credential_issued", recorder(&log, "issued"), None, 0);
        registry.subscribe("credential_revoked", recorder(&log, "revoked"), None, 0);
        registry.subscribe(WILDCARD, recorder(&log, "all-2"), None, 0);

        let report = registry.dispatch(&event("credential_issued", serde_json::Value::Null));
        assert_eq!(report.delivered, 3);
        assert_eq!(*lock(&log), ["all-1", "issued", "all-2"]);
    }

    #[test]
    fn filter_rejects_events() {
        let registry = SubscriptionRegistry::new();
        let (hits, callback) = counter();
        let filter: EventFilter = Arc::new(|e: &RealtimeEvent| e.data()["score"].as_u64().unwrap_or(0) > 80);
        registry.subscribe("fraud_alert", callback, Some(filter), 0);

        registry.dispatch(&event("fraud_alert", serde_json::json!({ "score": 20 })));
        registry.dispatch(&event("fraud_alert", serde_json::json!({ "score": 95 })));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn three_subscribers_one_unsubscribed_two_invoked() {
        let registry = SubscriptionRegistry::new();
        let (hits, callback) = counter();
        let first = registry.subscribe("fraud_alert", Arc::clone(&callback), None, 0);
        registry.subscribe("fraud_alert", Arc::clone(&callback), None, 0);
        registry.subscribe("fraud_alert", callback, None, 0);

        assert!(registry.unsubscribe(first.id()).is_some());
        assert!(!first.is_active());

        let report = registry.dispatch(&event("fraud_alert", serde_json::Value::Null));
        assert_eq!(report.delivered, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let registry = SubscriptionRegistry::new();
        let faulty: EventCallback = Arc::new(|event: &RealtimeEvent| {
            if event.event_type() == "fraud_alert" {
                panic!("consumer bug");
            }
        });
        registry.subscribe("fraud_alert", faulty, None, 0);
        let (hits, callback) = counter();
        registry.subscribe("fraud_alert", callback, None, 0);

        let report = registry.dispatch(&event("fraud_alert", serde_json::Value::Null));
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_filter_counts_as_failure() {
        let registry = SubscriptionRegistry::new();
        let (skipped, never) = counter();
        let faulty: EventFilter = Arc::new(|event: &RealtimeEvent| {
            if event.event_type() == "fraud_alert" {
                panic!("filter bug");
            }
            true
        });
        registry.subscribe("fraud_alert", never, Some(faulty), 0);
        let (hits, callback) = counter();
        registry.subscribe("fraud_alert", callback, None, 0);

        let report = registry.dispatch(&event("fraud_alert", serde_json::Value::Null));
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(skipped.load(Ordering::SeqCst), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_during_dispatch_skips_pending_callback() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (hits, callback) = counter();
        let victim = Arc::new(Mutex::new(None::<SubscriptionId>));

        let registry_ref = Arc::clone(&registry);
        let victim_ref = Arc::clone(&victim);
        registry.subscribe(
            "credential_issued",
            Arc::new(move |_: &RealtimeEvent| {
                if let Some(id) = lock(&victim_ref).take() {
                    let _ = registry_ref.unsubscribe(id);
                }
            }),
            None,
            0,
        );
        let second = registry.subscribe("credential_issued", callback, None, 0);
        *lock(&victim) = Some(second.id());

        registry.dispatch(&event("credential_issued", serde_json::Value::Null));
        registry.dispatch(&event("credential_issued", serde_json::Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn arbitrary_sequence_matches_model() {
        let registry = SubscriptionRegistry::new();
        let types = ["a", "b", WILDCARD];
        let mut live: Vec<(SubscriptionId, &str, Arc<AtomicUsize>)> = Vec::new();

        for round in 0..30_usize {
            let event_type = types.get(round % types.len()).copied().unwrap_or("a");
            let (hits, callback) = counter();
            let sub = registry.subscribe(event_type, callback, None, 0);
            live.push((sub.id(), event_type, hits));
            if round % 4 == 3 {
                let (id, _, _) = live.remove(round % live.len());
                assert!(registry.unsubscribe(id).is_some());
            }
        }

        let report = registry.dispatch(&event("a", serde_json::Value::Null));
        let expected = live
            .iter()
            .filter(|(_, t, _)| *t == "a" || *t == WILDCARD)
            .count();
        assert_eq!(report.delivered, expected);
        for (_, event_type, hits) in &live {
            let want = usize::from(*event_type == "a" || *event_type == WILDCARD);
            assert_eq!(hits.load(Ordering::SeqCst), want);
        }
        assert_eq!(registry.active().len(), live.len());
    }

    #[test]
    fn clear_deactivates_everything() {
        let registry = SubscriptionRegistry::new();
        let (hits, callback) = counter();
        let sub = registry.subscribe(WILDCARD, callback, None, 0);
        assert_eq!(registry.clear(), 1);
        assert!(!sub.is_active());
        assert!(registry.is_empty());
        registry.dispatch(&event("anything", serde_json::Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn active_lists_in_registration_order() {
        let registry = SubscriptionRegistry::new();
        let (_, callback) = counter();
        let a = registry.subscribe("b_type", Arc::clone(&callback), None, 5);
        let b = registry.subscribe("a_type", callback, Some(Arc::new(|_: &RealtimeEvent| true)), 6);
        let infos = registry.active();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos.first().map(|i| i.id), Some(a.id()));
        assert_eq!(infos.get(1).map(|i| i.id), Some(b.id()));
        assert_eq!(infos.get(1).map(|i| i.filtered), Some(true));
    }
}
