//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a cell is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., running a memo or effect), we push
//! the subscriber onto the stack. When the computation completes, we pop it
//! and hand back everything it read as a [`TrackedFrame`].
//!
//! This design supports nested reactive contexts (e.g., a memo that reads
//! from another memo) and untracked sections inside a tracked one.

use std::cell::RefCell;
use std::sync::Arc;

use smallvec::SmallVec;

use super::SubscriberId;

/// A derived cell read by a computation.
///
/// The reader holds these strongly, which keeps the cell alive, and compares
/// versions before re-running.
pub(crate) trait Upstream: Send + Sync {
    /// Source ID the reader depends on.
    fn source_id(&self) -> u64;

    /// Version of the cached value, without recomputing.
    fn version(&self) -> u64;

    /// Bring the cached value up to date and return its version.
    fn refresh(&self) -> u64;
}

/// A strong reference to an upstream cell, held by the computation that read it.
pub(crate) type Retained = Arc<dyn Upstream>;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// `None` marks an untracked section.
    subscriber_id: Option<SubscriberId>,
    /// Source IDs read during this computation.
    dependencies: SmallVec<[u64; 4]>,
    /// Derived cells read during this computation. Keeping them here keeps
    /// them alive for as long as the reader depends on them.
    retained: Vec<Retained>,
}

impl ContextEntry {
    fn new(subscriber_id: Option<SubscriberId>) -> Self {
        Self {
            subscriber_id,
            dependencies: SmallVec::new(),
            retained: Vec::new(),
        }
    }
}

/// Everything a computation read while its context was active.
#[derive(Default)]
pub struct TrackedFrame {
    /// Source IDs, deduplicated, in first-read order.
    pub dependencies: SmallVec<[u64; 4]>,
    pub(crate) retained: Vec<Retained>,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
    exited: bool,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any cells that are read will
    /// register the subscriber as a dependent.
    ///
    /// The context is automatically exited when the returned guard is dropped.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        Self::push(Some(subscriber_id))
    }

    fn push(subscriber_id: Option<SubscriberId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry::new(subscriber_id));
        });

        Self {
            subscriber_id,
            exited: false,
        }
    }

    /// Run `f` without tracking any reads, even inside a memo or effect.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _guard = Self::push(None);
        f()
    }

    /// Check if there is an active, tracking reactive context.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.subscriber_id))
    }

    /// Record a dependency on the given source.
    ///
    /// This is called by signals and memos when they are read.
    pub fn track_dependency(source_id: u64) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.subscriber_id.is_some() && !entry.dependencies.contains(&source_id) {
                    entry.dependencies.push(source_id);
                }
            }
        });
    }

    /// Keep `cell` alive for as long as the current computation depends on it.
    pub(crate) fn retain(cell: Retained) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                let seen = entry
                    .retained
                    .iter()
                    .any(|held| held.source_id() == cell.source_id());
                if entry.subscriber_id.is_some() && !seen {
                    entry.retained.push(cell);
                }
            }
        });
    }

    /// Get the dependencies collected in the current context.
    pub fn get_dependencies() -> Vec<u64> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.to_vec())
                .unwrap_or_default()
        })
    }

    /// Exit the context and return what it collected.
    pub fn finish(mut self) -> TrackedFrame {
        self.exited = true;
        match self.pop() {
            Some(entry) => TrackedFrame {
                dependencies: entry.dependencies,
                retained: entry.retained,
            },
            None => TrackedFrame::default(),
        }
    }

    fn pop(&self) -> Option<ContextEntry> {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Catch mismatched enter/exit pairs.
            if let Some(entry) = &popped {
                debug_assert_eq!(
                    entry.subscriber_id, self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id, entry.subscriber_id
                );
            }
            popped
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.exited {
            self.pop();
        }
    }
}
