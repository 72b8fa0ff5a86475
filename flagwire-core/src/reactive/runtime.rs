//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It manages the dependency graph and schedules updates when
//! signals change.
//!
//! # How It Works
//!
//! 1. When a memo or effect is created, it registers with the runtime.
//!
//! 2. When a memo or effect reads a signal or memo, the runtime records the
//!    edge `source -> subscriber`.
//!
//! 3. When a signal is written, the runtime:
//!    a. Walks every transitive dependent, passing through memos
//!    b. Marks them as "maybe dirty"
//!    c. Queues the effects it found
//!    d. Flushes the queue unless a batch is open or a flush is running
//!
//! Memos stay lazy: they recompute on their next read. Effects are eager and
//! pull fresh memo values when they re-run, so an effect never observes a
//! half-propagated graph. A queued effect that only reads the written signal
//! through memos first brings those memos up to date and skips its run when
//! none of them changed value.
//!
//! # Thread Safety
//!
//! The registry and the edge maps are global and lock-protected, so cells can
//! be shared across threads. The effect queue and batch depth are per
//! thread: all propagation triggered by a write runs to completion on the
//! writing thread.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use tracing::warn;

use super::context::ReactiveContext;
use super::subscriber::SubscriberId;

/// Upper bound on effect runs in a single flush before the queue is dropped.
const MAX_FLUSH_ITERATIONS: usize = 100_000;

static SOURCE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique source ID, shared by signals and memos.
pub(crate) fn next_source_id() -> u64 {
    SOURCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A trait for types that can be notified when dependencies change.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Mark this reactive value as potentially needing update.
    ///
    /// `direct` is true when the written signal is read by this node itself,
    /// false when the change arrives through a memo.
    ///
    /// Returns the node's own source ID when other computations can depend
    /// on it (memos), so the runtime can keep propagating.
    fn mark_maybe_dirty(&self, direct: bool) -> Option<u64>;

    /// Run this reactive value (effects only).
    ///
    /// An effect reached only through memos re-runs when one of those memos
    /// produced a new value.
    fn schedule(&self);

    /// Check if this reactive value is an effect (eager) or memo (lazy).
    fn is_eager(&self) -> bool;
}

/// Handle to a registered reactive value.
///
/// Dropping this handle unregisters the reactive value from the runtime.
pub struct ReactiveHandle {
    subscriber_id: SubscriberId,
    source_id: Option<u64>,
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id);
        if let Some(source_id) = self.source_id {
            Runtime::forget_source(source_id);
        }
    }
}

/// The global reactive runtime.
pub struct Runtime;

#[derive(Default)]
struct Edges {
    /// source -> subscribers reading it
    dependents: HashMap<u64, Vec<SubscriberId>>,
    /// subscriber -> sources it read (reverse index for cheap clearing)
    sources: HashMap<SubscriberId, Vec<u64>>,
}

static REGISTRY: OnceLock<RwLock<HashMap<SubscriberId, Weak<dyn Reactive>>>> = OnceLock::new();
static EDGES: OnceLock<RwLock<Edges>> = OnceLock::new();

fn get_registry() -> &'static RwLock<HashMap<SubscriberId, Weak<dyn Reactive>>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn get_edges() -> &'static RwLock<Edges> {
    EDGES.get_or_init(|| RwLock::new(Edges::default()))
}

#[derive(Default)]
struct Scheduler {
    batch_depth: usize,
    flushing: bool,
    queue: VecDeque<Arc<dyn Reactive>>,
    queued: HashSet<SubscriberId>,
}

thread_local! {
    static SCHEDULER: RefCell<Scheduler> = RefCell::new(Scheduler::default());
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        SCHEDULER.with(|s| s.borrow_mut().batch_depth -= 1);
    }
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        SCHEDULER.with(|s| s.borrow_mut().flushing = false);
    }
}

impl Runtime {
    /// Register a reactive value with the runtime.
    ///
    /// Returns a handle that unregisters the value when dropped.
    pub fn register(reactive: Arc<dyn Reactive>, source_id: Option<u64>) -> ReactiveHandle {
        let id = reactive.subscriber_id();

        get_registry().write().insert(id, Arc::downgrade(&reactive));

        ReactiveHandle {
            subscriber_id: id,
            source_id,
        }
    }

    /// Unregister a reactive value.
    fn unregister(id: SubscriberId) {
        get_registry().write().remove(&id);
        Self::clear_dependencies(id);
    }

    /// Drop every edge leaving a source that no longer exists.
    pub(crate) fn forget_source(source_id: u64) {
        let mut edges = get_edges().write();
        if let Some(subscribers) = edges.dependents.remove(&source_id) {
            for subscriber in subscribers {
                if let Some(sources) = edges.sources.get_mut(&subscriber) {
                    sources.retain(|s| *s != source_id);
                }
            }
        }
    }

    /// Record that a subscriber depends on a source.
    ///
    /// Called automatically when a cell is read within a reactive context.
    pub fn add_dependency(source_id: u64, subscriber_id: SubscriberId) {
        let mut edges = get_edges().write();

        let dependents = edges.dependents.entry(source_id).or_default();
        if dependents.contains(&subscriber_id) {
            return;
        }
        dependents.push(subscriber_id);
        edges.sources.entry(subscriber_id).or_default().push(source_id);
    }

    /// Remove all dependencies for a subscriber.
    ///
    /// Called before re-running a computation to clear stale dependencies.
    pub fn clear_dependencies(subscriber_id: SubscriberId) {
        let mut edges = get_edges().write();

        let Some(sources) = edges.sources.remove(&subscriber_id) else {
            return;
        };
        for source in sources {
            if let Some(dependents) = edges.dependents.get_mut(&source) {
                dependents.retain(|s| *s != subscriber_id);
                if dependents.is_empty() {
                    edges.dependents.remove(&source);
                }
            }
        }
    }

    /// Number of memos and effects currently reading `source_id`.
    pub fn dependent_count(source_id: u64) -> usize {
        get_edges()
            .read()
            .dependents
            .get(&source_id)
            .map_or(0, Vec::len)
    }

    fn dependents_of(source_id: u64) -> Vec<Arc<dyn Reactive>> {
        let subscriber_ids = get_edges()
            .read()
            .dependents
            .get(&source_id)
            .cloned()
            .unwrap_or_default();

        if subscriber_ids.is_empty() {
            return Vec::new();
        }

        let registry = get_registry().read();
        subscriber_ids
            .iter()
            .filter_map(|id| registry.get(id).and_then(Weak::upgrade))
            .collect()
    }

    /// Notify all subscribers that a source changed.
    ///
    /// This is the core update propagation mechanism.
    pub fn notify_signal_change(source_id: u64) {
        let mut pending = vec![source_id];
        let mut visited = HashSet::new();
        let mut effects = Vec::new();

        while let Some(source) = pending.pop() {
            if !visited.insert(source) {
                continue;
            }
            let direct = source == source_id;
            for reactive in Self::dependents_of(source) {
                if let Some(next) = reactive.mark_maybe_dirty(direct) {
                    pending.push(next);
                }
                if reactive.is_eager() {
                    effects.push(reactive);
                }
            }
        }

        if effects.is_empty() {
            return;
        }

        SCHEDULER.with(|s| {
            let mut s = s.borrow_mut();
            for effect in effects {
                if s.queued.insert(effect.subscriber_id()) {
                    s.queue.push_back(effect);
                }
            }
        });

        Self::flush();
    }

    /// Run queued effects until the queue is empty.
    ///
    /// Does nothing while a batch is open or when called from inside a
    /// running flush; the outer flush picks the new work up.
    pub fn flush() {
        let start = SCHEDULER.with(|s| {
            let mut s = s.borrow_mut();
            if s.flushing || s.batch_depth > 0 {
                return false;
            }
            s.flushing = true;
            true
        });
        if !start {
            return;
        }
        let _guard = FlushGuard;

        let mut iterations = 0;
        loop {
            let next = SCHEDULER.with(|s| {
                let mut s = s.borrow_mut();
                let next = s.queue.pop_front();
                if let Some(effect) = &next {
                    s.queued.remove(&effect.subscriber_id());
                }
                next
            });
            let Some(effect) = next else {
                break;
            };

            iterations += 1;
            if iterations > MAX_FLUSH_ITERATIONS {
                warn!(
                    iterations,
                    "effect queue did not settle, dropping remaining effects"
                );
                SCHEDULER.with(|s| {
                    let mut s = s.borrow_mut();
                    s.queue.clear();
                    s.queued.clear();
                });
                break;
            }

            effect.schedule();
        }
    }

    /// Run `f` with effect execution deferred until it returns.
    ///
    /// Writes made inside `f` still mark dependents dirty immediately, but no
    /// effect runs before the outermost batch closes.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        SCHEDULER.with(|s| s.borrow_mut().batch_depth += 1);
        let guard = BatchGuard;
        let result = f();
        drop(guard);
        Self::flush();
        result
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a reactive context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

    struct MockReactive {
        id: SubscriberId,
        source: Option<u64>,
        dirty: AtomicBool,
        direct: AtomicBool,
        scheduled: AtomicI32,
        eager: bool,
    }

    impl MockReactive {
        fn new(eager: bool, source: Option<u64>) -> Arc<Self> {
            Arc::new(Self {
                id: SubscriberId::new(),
                source,
                dirty: AtomicBool::new(false),
                direct: AtomicBool::new(false),
                scheduled: AtomicI32::new(0),
                eager,
            })
        }
    }

    impl Reactive for MockReactive {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }

        fn mark_maybe_dirty(&self, direct: bool) -> Option<u64> {
            self.dirty.store(true, Ordering::SeqCst);
            self.direct.store(direct, Ordering::SeqCst);
            self.source
        }

        fn schedule(&self) {
            self.scheduled.fetch_add(1, Ordering::SeqCst);
        }

        fn is_eager(&self) -> bool {
            self.eager
        }
    }

    #[test]
    fn runtime_registers_and_unregisters() {
        let reactive = MockReactive::new(false, None);
        let id = reactive.id;

        let handle = Runtime::register(reactive, None);
        assert!(get_registry().read().contains_key(&id));

        drop(handle);
        assert!(!get_registry().read().contains_key(&id));
    }

    #[test]
    fn runtime_notifies_subscribers() {
        let source = next_source_id();
        let memo = MockReactive::new(false, None);
        let effect = MockReactive::new(true, None);

        let _memo_handle = Runtime::register(memo.clone(), None);
        let _effect_handle = Runtime::register(effect.clone(), None);

        Runtime::add_dependency(source, memo.id);
        Runtime::add_dependency(source, effect.id);

        Runtime::notify_signal_change(source);

        // Both should be marked dirty
        assert!(memo.dirty.load(Ordering::SeqCst));
        assert!(effect.dirty.load(Ordering::SeqCst));

        // Only effect should be scheduled (it's eager)
        assert_eq!(memo.scheduled.load(Ordering::SeqCst), 0);
        assert_eq!(effect.scheduled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn notification_passes_through_derived_sources() {
        let signal = next_source_id();
        let memo_source = next_source_id();
        let memo = MockReactive::new(false, Some(memo_source));
        let effect = MockReactive::new(true, None);

        let _memo_handle = Runtime::register(memo.clone(), Some(memo_source));
        let _effect_handle = Runtime::register(effect.clone(), None);

        Runtime::add_dependency(signal, memo.id);
        Runtime::add_dependency(memo_source, effect.id);

        Runtime::notify_signal_change(signal);

        assert!(memo.dirty.load(Ordering::SeqCst));
        assert_eq!(effect.scheduled.load(Ordering::SeqCst), 1);

        // The memo read the signal; the effect only read the memo.
        assert!(memo.direct.load(Ordering::SeqCst));
        assert!(effect.dirty.load(Ordering::SeqCst));
        assert!(!effect.direct.load(Ordering::SeqCst));
    }

    #[test]
    fn runtime_clears_dependencies() {
        let source = next_source_id();
        let reactive = MockReactive::new(false, None);
        let id = reactive.id;

        let _handle = Runtime::register(reactive.clone(), None);

        Runtime::add_dependency(source, id);
        Runtime::add_dependency(source, id);
        assert_eq!(Runtime::dependent_count(source), 1);

        Runtime::clear_dependencies(id);
        assert_eq!(Runtime::dependent_count(source), 0);
    }

    #[test]
    fn batch_defers_effects_until_close() {
        let source = next_source_id();
        let effect = MockReactive::new(true, None);
        let _handle = Runtime::register(effect.clone(), None);
        Runtime::add_dependency(source, effect.id);

        Runtime::batch(|| {
            Runtime::notify_signal_change(source);
            Runtime::notify_signal_change(source);
            assert_eq!(effect.scheduled.load(Ordering::SeqCst), 0);
        });

        // Queued once, run once
        assert_eq!(effect.scheduled.load(Ordering::SeqCst), 1);
    }
}
