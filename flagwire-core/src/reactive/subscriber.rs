//! Subscriber types for the reactive system.
//!
//! A Subscriber represents anything that wants to hear about a cell change.
//! Memos and effects are tracked by [`SubscriberId`] alone; raw write
//! listeners attached with [`Signal::subscribe`](super::Signal::subscribe)
//! carry a [`Subscriber`] with their callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a subscriber.
///
/// Each subscriber (memo, effect, or raw listener) gets a unique ID when
/// created. This ID is used to track dependency edges and avoid duplicate
/// subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A raw write listener.
///
/// The callback fires synchronously on every write to the cell it is
/// attached to, whether or not the value actually changed. Clones share the
/// callback.
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    notify: Arc<dyn Fn() + Send + Sync>,
}

impl Subscriber {
    /// Create a new subscriber with the given notification callback.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_id(SubscriberId::new(), notify)
    }

    /// Create a subscriber under an existing ID.
    pub fn with_id<F>(id: SubscriberId, notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id,
            notify: Arc::new(notify),
        }
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Notify the subscriber that the cell was written.
    pub fn notify(&self) {
        (self.notify)();
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscriber_notify_calls_callback() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let subscriber = Subscriber::new(move || {
            called_clone.store(true, Ordering::SeqCst);
        });

        assert!(!called.load(Ordering::SeqCst));
        subscriber.notify();
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn with_id_keeps_the_given_id() {
        let id = SubscriberId::new();
        let subscriber = Subscriber::with_id(id, || {});
        assert_eq!(subscriber.id(), id);
    }
}
