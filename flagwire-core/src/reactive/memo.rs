//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a signal it reads is written, the runtime marks the memo "dirty";
//!    a change further upstream marks it "maybe dirty". Either way the
//!    runtime keeps propagating to whatever reads the memo.
//!
//! 4. On next access, the memo recomputes. The version only moves when the
//!    new value differs from the cached one.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually accessed will recompute
//! - Memos that are never read stay dirty (no wasted work)
//!
//! # Lifetime
//!
//! A memo read inside another computation is kept alive by that computation
//! until it re-runs. A memo created on the fly inside an effect therefore
//! keeps delivering updates to the effect even after the creating code lets
//! go of it.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};

use super::context::{ReactiveContext, Retained, Upstream};
use super::runtime::{next_source_id, Reactive, ReactiveHandle, Runtime};
use super::subscriber::SubscriberId;

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency might have changed. Need to check.
    MaybeDirty,

    /// The memo definitely needs to recompute.
    Dirty,
}

struct MemoInner<T> {
    id: u64,
    subscriber_id: SubscriberId,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    value: RwLock<Option<T>>,
    state: Mutex<MemoState>,
    version: AtomicU64,
    dependencies: RwLock<HashSet<u64>>,
    /// Upstream memos read by the last computation.
    retained: Mutex<Vec<Retained>>,
    handle: OnceLock<ReactiveHandle>,
}

impl<T> Reactive for MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark_maybe_dirty(&self, direct: bool) -> Option<u64> {
        let mut state = self.state.lock();
        if direct {
            *state = MemoState::Dirty;
        } else if *state == MemoState::Clean {
            *state = MemoState::MaybeDirty;
        }
        Some(self.id)
    }

    fn schedule(&self) {}

    fn is_eager(&self) -> bool {
        false
    }
}

impl<T> Upstream for MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn source_id(&self) -> u64 {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn refresh(&self) -> u64 {
        if *self.state.lock() != MemoState::Clean {
            self.recompute();
        }
        self.version()
    }
}

impl<T> MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn get_untracked(&self) -> T {
        if *self.state.lock() == MemoState::Clean {
            if let Some(value) = self.value.read().clone() {
                return value;
            }
        }
        self.recompute()
    }

    /// Run the computation inside a reactive context, then store the value.
    ///
    /// The version moves only when the new value differs from the cached one.
    fn recompute(&self) -> T {
        Runtime::clear_dependencies(self.subscriber_id);

        let ctx = ReactiveContext::enter(self.subscriber_id);
        let new_value = (self.compute)();
        let frame = ctx.finish();

        *self.dependencies.write() = frame.dependencies.iter().copied().collect();
        *self.retained.lock() = frame.retained;

        let changed = {
            let mut value = self.value.write();
            let changed = value.as_ref() != Some(&new_value);
            *value = Some(new_value.clone());
            changed
        };
        if changed {
            self.version.fetch_add(1, Ordering::AcqRel);
        }

        *self.state.lock() = MemoState::Clean;

        new_value
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + Send + Sync + PartialEq.
///
/// The PartialEq bound is needed to detect when the computed value actually
/// changed (some memos return the same value even if inputs changed).
pub struct Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<MemoInner<T>>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(MemoInner {
            id: next_source_id(),
            subscriber_id: SubscriberId::new(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            state: Mutex::new(MemoState::Dirty),
            version: AtomicU64::new(0),
            dependencies: RwLock::new(HashSet::new()),
            retained: Mutex::new(Vec::new()),
            handle: OnceLock::new(),
        });

        let handle = Runtime::register(inner.clone(), Some(inner.id));
        // Freshly created, so the slot is always empty.
        let _ = inner.handle.set(handle);

        Self { inner }
    }

    /// Get the memo's unique source ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the subscriber ID for this memo.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a memo's value. Inside a
    /// reactive context the reader starts depending on this memo.
    pub fn get(&self) -> T {
        if let Some(current) = ReactiveContext::current_subscriber() {
            ReactiveContext::track_dependency(self.inner.id);
            Runtime::add_dependency(self.inner.id, current);
            ReactiveContext::retain(self.inner.clone());
        }

        self.get_untracked()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.get_untracked()
    }

    /// Mark the memo as potentially needing recomputation.
    pub fn mark_maybe_dirty(&self) {
        self.inner.mark_maybe_dirty(false);
    }

    /// Mark the memo as definitely needing recomputation.
    pub fn mark_dirty(&self) {
        *self.inner.state.lock() = MemoState::Dirty;
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        *self.inner.state.lock()
    }

    /// Number of recomputations that produced a different value.
    pub fn version(&self) -> u64 {
        Upstream::version(&*self.inner)
    }

    /// Get the number of dependents.
    pub fn dependent_count(&self) -> usize {
        Runtime::dependent_count(self.inner.id)
    }

    /// Get the number of sources read by the last computation.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.read().len()
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Whether both handles point at the same memo.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
