//! Ordered observer registration
//!
//! Provider sessions expose multi-subscriber callbacks for transcripts
//! and audio. Invocation order equals registration order, and one
//! panicking subscriber must not starve the rest.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Token returned on subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Registry of callbacks invoked in registration order.
pub struct CallbackRegistry<T> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(u64, Callback<T>)>>,
}

impl<T> CallbackRegistry<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback; it fires for every event until unsubscribed.
    pub fn subscribe(&self, callback: Box<dyn Fn(&T) + Send + Sync>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push((id, Arc::from(callback)));
        SubscriptionId(id)
    }

    /// Remove a callback. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.entries.write().retain(|(entry_id, _)| *entry_id != id.0);
    }

    /// Invoke every callback in registration order.
    ///
    /// The entry list is snapshotted first so callbacks may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self
            .entries
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                tracing::error!("subscriber panicked; continuing with remaining subscribers");
            }
        }
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T> Default for CallbackRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_fires_in_registration_order() {
        let registry: CallbackRegistry<u32> = CallbackRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            registry.subscribe(Box::new(move |_| order.lock().push(tag)));
        }

        registry.emit(&7);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let registry: CallbackRegistry<u32> = CallbackRegistry::new();
        let count = Arc::new(Mutex::new(0));

        let count_cb = Arc::clone(&count);
        let id = registry.subscribe(Box::new(move |_| *count_cb.lock() += 1));

        registry.emit(&1);
        registry.unsubscribe(id);
        registry.emit(&2);

        assert_eq!(*count.lock(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_panicking_subscriber_does_not_starve_rest() {
        let registry: CallbackRegistry<u32> = CallbackRegistry::new();
        let reached = Arc::new(Mutex::new(false));

        registry.subscribe(Box::new(|_| panic!("bad subscriber")));
        let reached_cb = Arc::clone(&reached);
        registry.subscribe(Box::new(move |_| *reached_cb.lock() = true));

        registry.emit(&1);
        assert!(*reached.lock());
    }
}
