//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the runtime queues the effect and runs it
//!    once the current write (or batch) has finished propagating.
//!
//! 3. Before re-running, the effect clears its old dependencies and tracks
//!    new ones during execution.
//!
//! 4. An effect woken only through memos first brings those memos up to
//!    date. If none of them produced a new value, the run is skipped.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos cache results; effects just run their side effect.
//!
//! # Disposal
//!
//! An effect keeps running for as long as any clone of it is alive. Call
//! [`Effect::dispose`] to stop it explicitly, e.g. before tearing down the
//! thing it writes to.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};

use super::context::{ReactiveContext, Retained};
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use super::subscriber::SubscriberId;

struct EffectInner {
    subscriber_id: SubscriberId,
    run: Box<dyn Fn() + Send + Sync>,
    dependencies: RwLock<HashSet<u64>>,
    /// Memos read by the last run, with the version each one had then.
    observed: Mutex<Vec<(Retained, u64)>>,
    /// Set when a signal read by the last run was written.
    stale: AtomicBool,
    disposed: AtomicBool,
    run_count: AtomicUsize,
    handle: OnceLock<ReactiveHandle>,
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        self.stale.store(false, Ordering::SeqCst);
        Runtime::clear_dependencies(self.subscriber_id);

        let ctx = ReactiveContext::enter(self.subscriber_id);
        (self.run)();
        let frame = ctx.finish();

        *self.dependencies.write() = frame.dependencies.iter().copied().collect();
        *self.observed.lock() = frame
            .retained
            .into_iter()
            .map(|upstream| {
                let version = upstream.version();
                (upstream, version)
            })
            .collect();

        self.run_count.fetch_add(1, Ordering::SeqCst);

        // Disposed from inside its own run: drop the edges just recorded.
        if self.disposed.load(Ordering::SeqCst) {
            self.release();
        }
    }

    fn release(&self) {
        Runtime::clear_dependencies(self.subscriber_id);
        self.dependencies.write().clear();
        self.observed.lock().clear();
    }

    /// Whether a queued run would see anything new.
    fn needs_run(&self) -> bool {
        if self.disposed.load(Ordering::SeqCst) {
            return false;
        }
        if self.stale.load(Ordering::SeqCst) {
            return true;
        }
        let observed: Vec<(Retained, u64)> = self.observed.lock().clone();
        ReactiveContext::untracked(|| {
            observed
                .iter()
                .any(|(upstream, seen)| upstream.refresh() != *seen)
        })
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark_maybe_dirty(&self, direct: bool) -> Option<u64> {
        if direct {
            self.stale.store(true, Ordering::SeqCst);
        }
        None
    }

    fn schedule(&self) {
        if self.needs_run() {
            self.execute();
        }
    }

    fn is_eager(&self) -> bool {
        true
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new(move || {
///     println!("Count is: {}", count.get());
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    /// Writes it makes during that first run are propagated once it returns.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(run);
        Runtime::batch(|| effect.execute());
        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// It has no dependencies until [`Effect::execute`] is called.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner {
            subscriber_id: SubscriberId::new(),
            run: Box::new(run),
            dependencies: RwLock::new(HashSet::new()),
            observed: Mutex::new(Vec::new()),
            stale: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
            handle: OnceLock::new(),
        });

        let handle = Runtime::register(inner.clone(), None);
        let _ = inner.handle.set(handle);

        Self { inner }
    }

    /// Get the subscriber ID for this effect.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Execute the effect function.
    ///
    /// This runs the function within a reactive context to track dependencies.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again and holds no edges.
    pub fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::SeqCst) {
            self.inner.release();
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.read().len()
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("subscriber_id", &self.inner.subscriber_id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
