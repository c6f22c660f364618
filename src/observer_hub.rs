use std::collections::HashMap;
use std::fmt::Debug;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Thread-safe publish/subscribe hub.
///
/// Handlers are invoked outside of the lock, so a handler may subscribe or unsubscribe
/// (itself included) while being notified.
pub struct ObserverHub<E> {
    handlers: Mutex<HashMap<SubscriptionId, Handler<E>>>,
    next_id: AtomicU64,
}

impl<E> ObserverHub<E> {
    pub fn new() -> Self {
        ObserverHub {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, Arc::new(handler));
        id
    }

    /// Removes a handler. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn clear_all(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Notifies every handler subscribed at the time of the call and returns how many ran
    /// without panicking.
    pub fn publish(&self, event: &E) -> usize {
        let snapshot: Vec<(SubscriptionId, Handler<E>)> = self.lock().iter().map(|(id, handler)| (*id, handler.clone())).collect();
        trace!("Notifying {} observer(s)", snapshot.len());

        snapshot
            .into_iter()
            .filter(|(id, handler)| match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => true,
                Err(_) => {
                    warn!(subscription = id.0, "⚠️ Observer panicked while handling an event");
                    false
                }
            })
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Handler<E>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E> Default for ObserverHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Debug for ObserverHub<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHub").field("handlers", &self.len()).finish()
    }
}
