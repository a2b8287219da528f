//! Connection lifecycle callbacks.
//!
//! Consumers build their "reconnecting…" indicators from these hooks plus
//! `is_connected()` and the stats snapshot. Hooks run synchronously on the
//! connection path; a panicking hook is logged and skipped.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::RealtimeError;
use crate::sync::lock;

/// Hook for connect, disconnect and reconnect notifications.
pub type HookCallback = Arc<dyn Fn() + Send + Sync>;

/// Hook receiving transport-level errors.
pub type ErrorHookCallback = Arc<dyn Fn(&RealtimeError) + Send + Sync>;

/// Lifecycle transitions a hook can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The connection reached the open state.
    Connect,
    /// An open connection closed.
    Disconnect,
    /// The connection opened after at least one failed attempt.
    Reconnect,
    /// A transport-level error occurred.
    Error,
}

/// Registration id returned when a hook is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Registered lifecycle hooks, invoked in registration order.
#[derive(Default)]
pub struct LifecycleHooks {
    next_id: AtomicU64,
    connect: Mutex<Vec<(HookId, HookCallback)>>,
    disconnect: Mutex<Vec<(HookId, HookCallback)>>,
    reconnect: Mutex<Vec<(HookId, HookCallback)>>,
    error: Mutex<Vec<(HookId, ErrorHookCallback)>>,
}

impl LifecycleHooks {
    /// Creates an empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connect, disconnect or reconnect hook.
    ///
    /// Passing [`LifecycleEvent::Error`] registers `callback` as an error
    /// hook that ignores the error value.
    pub fn register(&self, event: LifecycleEvent, callback: HookCallback) -> HookId {
        let id = self.allocate_id();
        match event {
            LifecycleEvent::Connect => lock(&self.connect).push((id, callback)),
            LifecycleEvent::Disconnect => lock(&self.disconnect).push((id, callback)),
            LifecycleEvent::Reconnect => lock(&self.reconnect).push((id, callback)),
            LifecycleEvent::Error => {
                let wrapped: ErrorHookCallback = Arc::new(move |_: &RealtimeError| callback());
                lock(&self.error).push((id, wrapped));
            }
        }
        id
    }

    /// Adds an error hook.
    pub fn register_error(&self, callback: ErrorHookCallback) -> HookId {
        let id = self.allocate_id();
        lock(&self.error).push((id, callback));
        id
    }

    /// Removes a hook. Returns `true` if it was registered.
    pub fn remove(&self, event: LifecycleEvent, id: HookId) -> bool {
        match event {
            LifecycleEvent::Connect => remove_from(&self.connect, id),
            LifecycleEvent::Disconnect => remove_from(&self.disconnect, id),
            LifecycleEvent::Reconnect => remove_from(&self.reconnect, id),
            LifecycleEvent::Error => remove_from(&self.error, id),
        }
    }

    /// Invokes every hook registered for `event`.
    ///
    /// [`LifecycleEvent::Error`] hooks are skipped here since they need an
    /// error value; use [`LifecycleHooks::fire_error`].
    pub fn fire(&self, event: LifecycleEvent) {
        let hooks = match event {
            LifecycleEvent::Connect => snapshot(&self.connect),
            LifecycleEvent::Disconnect => snapshot(&self.disconnect),
            LifecycleEvent::Reconnect => snapshot(&self.reconnect),
            LifecycleEvent::Error => return,
        };
        for hook in hooks {
            if catch_unwind(AssertUnwindSafe(|| hook())).is_err() {
                tracing::warn!(?event, "lifecycle hook panicked");
            }
        }
    }

    /// Invokes every error hook with `error`.
    pub fn fire_error(&self, error: &RealtimeError) {
        for hook in snapshot(&self.error) {
            if catch_unwind(AssertUnwindSafe(|| hook(error))).is_err() {
                tracing::warn!(%error, "error hook panicked");
            }
        }
    }

    /// Number of hooks registered for `event`.
    #[must_use]
    pub fn count(&self, event: LifecycleEvent) -> usize {
        match event {
            LifecycleEvent::Connect => lock(&self.connect).len(),
            LifecycleEvent::Disconnect => lock(&self.disconnect).len(),
            LifecycleEvent::Reconnect => lock(&self.reconnect).len(),
            LifecycleEvent::Error => lock(&self.error).len(),
        }
    }

    fn allocate_id(&self) -> HookId {
        HookId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("connect", &self.count(LifecycleEvent::Connect))
            .field("disconnect", &self.count(LifecycleEvent::Disconnect))
            .field("reconnect", &self.count(LifecycleEvent::Reconnect))
            .field("error", &self.count(LifecycleEvent::Error))
            .finish()
    }
}

/// Clones the callbacks out so none run under the lock.
fn snapshot<T: ?Sized>(hooks: &Mutex<Vec<(HookId, Arc<T>)>>) -> Vec<Arc<T>> {
    lock(hooks)
        .iter()
        .map(|(_, callback)| Arc::clone(callback))
        .collect()
}

fn remove_from<T: ?Sized>(hooks: &Mutex<Vec<(HookId, Arc<T>)>>, id: HookId) -> bool {
    let mut hooks = lock(hooks);
    let before = hooks.len();
    hooks.retain(|(hook_id, _)| *hook_id != id);
    hooks.len() != before
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting() -> (Arc<AtomicUsize>, HookCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let callback: HookCallback = Arc::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[test]
    fn fires_only_matching_event() {
        let hooks = LifecycleHooks::new();
        let (connects, on_connect) = counting();
        let (disconnects, on_disconnect) = counting();
        hooks.register(LifecycleEvent::Connect, on_connect);
        hooks.register(LifecycleEvent::Disconnect, on_disconnect);

        hooks.fire(LifecycleEvent::Connect);
        hooks.fire(LifecycleEvent::Connect);
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(disconnects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn removed_hook_is_not_called() {
        let hooks = LifecycleHooks::new();
        let (count, callback) = counting();
        let id = hooks.register(LifecycleEvent::Reconnect, callback);
        assert!(hooks.remove(LifecycleEvent::Reconnect, id));
        assert!(!hooks.remove(LifecycleEvent::Reconnect, id));
        hooks.fire(LifecycleEvent::Reconnect);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn error_hooks_receive_error() {
        let hooks = LifecycleHooks::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        hooks.register_error(Arc::new(move |e: &RealtimeError| {
            lock(&sink).push(e.error_code());
        }));
        hooks.fire_error(&RealtimeError::Transport("reset".into()));
        assert_eq!(*lock(&seen), [1001]);
    }

    #[test]
    fn panicking_hook_does_not_stop_others() {
        let hooks = LifecycleHooks::new();
        hooks.register(
            LifecycleEvent::Connect,
            Arc::new(|| {
                if std::hint::black_box(true) {
                    panic!("hook bug");
                }
            }),
        );
        let (count, callback) = counting();
        hooks.register(LifecycleEvent::Connect, callback);
        hooks.fire(LifecycleEvent::Connect);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
