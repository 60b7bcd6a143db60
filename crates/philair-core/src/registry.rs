// ── Listener registry ──
//
// Insertion-ordered list of zero-argument callbacks. Fan-out never holds
// the registry lock while a callback runs, so callbacks may add or remove
// listeners (including themselves) without deadlocking.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

/// A registered change callback.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

impl ListenerRegistry {
    /// Register `listener`. Returns its id and whether the registry was empty.
    pub(crate) fn add(&self, listener: Listener) -> (ListenerId, bool) {
        let mut inner = self.lock();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        let was_empty = inner.listeners.is_empty();
        inner.listeners.push((id, listener));
        (id, was_empty)
    }

    /// Remove `id`. Returns `true` when this removal emptied the registry.
    ///
    /// Unknown or already removed ids leave the registry untouched.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut inner = self.lock();
        let Some(pos) = inner.listeners.iter().position(|(l, _)| *l == id) else {
            return false;
        };
        inner.listeners.remove(pos);
        inner.listeners.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().listeners.is_empty()
    }

    /// Invoke every listener in registration order.
    ///
    /// Each listener is looked up again right before it runs, so one removed
    /// by an earlier callback in the same round is skipped. A panicking
    /// listener is logged and the round continues.
    pub(crate) fn notify_all(&self) {
        let ids: Vec<ListenerId> = self.lock().listeners.iter().map(|(id, _)| *id).collect();

        for id in ids {
            let listener = {
                let inner = self.lock();
                inner
                    .listeners
                    .iter()
                    .find(|(l, _)| *l == id)
                    .map(|(_, f)| Arc::clone(f))
            };
            let Some(listener) = listener else { continue };

            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                warn!(listener = %id, "status listener panicked");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
