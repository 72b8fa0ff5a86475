//! View abstractions the directive renders into.
//!
//! The host UI layer implements [`Template`] and [`ViewContainer`]. The
//! directive only ever asks a template for a new view and asks the container
//! to insert it or clear everything.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::ViewContext;

/// Opaque handle to a view inserted into a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle(u64);

impl ViewHandle {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ViewHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// An instantiated view.
pub trait EmbeddedView: Send {
    /// Tear the view down. Called once, when its container is cleared.
    fn destroy(self: Box<Self>);
}

/// Something that can produce views.
pub trait Template: Send + Sync {
    /// Instantiate a view bound to `context`.
    fn create(&self, context: &ViewContext) -> Box<dyn EmbeddedView>;
}

/// The place views are mounted.
pub trait ViewContainer: Send + Sync {
    fn insert(&self, view: Box<dyn EmbeddedView>) -> ViewHandle;

    /// Destroy every view in the container.
    fn clear(&self);
}

/// A plain in-memory [`ViewContainer`].
#[derive(Default)]
pub struct ViewSlot {
    views: Mutex<Vec<(ViewHandle, Box<dyn EmbeddedView>)>>,
}

impl ViewSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.views.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.lock().is_empty()
    }

    pub fn handles(&self) -> Vec<ViewHandle> {
        self.views.lock().iter().map(|(handle, _)| *handle).collect()
    }
}

impl ViewContainer for ViewSlot {
    fn insert(&self, view: Box<dyn EmbeddedView>) -> ViewHandle {
        let handle = ViewHandle::new();
        self.views.lock().push((handle, view));
        handle
    }

    fn clear(&self) {
        // Destroy outside the lock; a view may look at its container.
        let views = std::mem::take(&mut *self.views.lock());
        for (_, view) in views {
            view.destroy();
        }
    }
}

impl fmt::Debug for ViewSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewSlot")
            .field("views", &self.handles())
            .finish()
    }
}
