//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    signal registers that context as a dependent with the runtime.
//!
//! 2. When a signal is written, the runtime marks every dependent dirty and
//!    runs the affected effects.
//!
//! 3. Writes always notify. Callers that want "write only on change" compare
//!    against [`Signal::get_untracked`] first.
//!
//! # Memory Layout
//!
//! Each signal is one shared allocation holding:
//! - A unique source ID
//! - The value behind a RwLock
//! - A version counter bumped on every write
//! - Raw write listeners

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::runtime::{next_source_id, Runtime};
use super::subscriber::{Subscriber, SubscriberId};

struct SignalInner<T> {
    id: u64,
    value: RwLock<T>,
    version: AtomicU64,
    notifiers: RwLock<Vec<Subscriber>>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::forget_source(self.id);
    }
}

/// A reactive signal holding a value of type T.
///
/// Clones share the same cell.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: next_source_id(),
                value: RwLock::new(value),
                version: AtomicU64::new(0),
                notifiers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Number of writes since creation.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        if let Some(subscriber_id) = ReactiveContext::current_subscriber() {
            ReactiveContext::track_dependency(self.inner.id);
            Runtime::add_dependency(self.inner.id, subscriber_id);
        }

        self.get_untracked()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Read the value by reference without cloning or tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read())
    }

    /// Set a new value and notify subscribers.
    ///
    /// This will trigger re-execution of all dependent computations.
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value;
        self.inner.version.fetch_add(1, Ordering::AcqRel);

        self.notify_subscribers();
        Runtime::notify_signal_change(self.inner.id);
    }

    /// Update the value using a function.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.inner.value.read());
        self.set(new_value);
    }

    /// Register a notification callback for a subscriber.
    ///
    /// The callback will be invoked on every write.
    pub fn subscribe<F>(&self, subscriber_id: SubscriberId, notify: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner
            .notifiers
            .write()
            .push(Subscriber::with_id(subscriber_id, notify));
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.inner
            .notifiers
            .write()
            .retain(|subscriber| subscriber.id() != subscriber_id);
    }

    /// Listeners run without the lock held, so they may subscribe or
    /// unsubscribe. Changes apply from the next write.
    fn notify_subscribers(&self) {
        let notifiers: Vec<Subscriber> = self.inner.notifiers.read().clone();
        for subscriber in &notifiers {
            subscriber.notify();
        }
    }

    /// Get the number of subscribers: reactive dependents plus raw listeners.
    pub fn subscriber_count(&self) -> usize {
        Runtime::dependent_count(self.inner.id) + self.inner.notifiers.read().len()
    }

    /// A read-only view of this signal sharing the same cell.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal {
            signal: self.clone(),
        }
    }

    /// Whether both handles point at the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("version", &self.version())
            .finish()
    }
}

/// A read-only handle to a [`Signal`].
///
/// Reads track exactly like the underlying signal; there is no way to write.
pub struct ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    signal: Signal<T>,
}

impl<T> ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn id(&self) -> u64 {
        self.signal.id()
    }

    pub fn version(&self) -> u64 {
        self.signal.version()
    }

    pub fn get(&self) -> T {
        self.signal.get()
    }

    pub fn get_untracked(&self) -> T {
        self.signal.get_untracked()
    }

    pub fn subscribe<F>(&self, subscriber_id: SubscriberId, notify: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.signal.subscribe(subscriber_id, notify);
    }

    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.signal.unsubscribe(subscriber_id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.signal.subscriber_count()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.signal.ptr_eq(&other.signal)
    }
}

impl<T> Clone for ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T> Debug for ReadSignal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ReadSignal").field(&self.signal).finish()
    }
}

impl<T> From<Signal<T>> for ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from(signal: Signal<T>) -> Self {
        Self { signal }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
