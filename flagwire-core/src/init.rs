//! Single-flight provider start.
//!
//! The first call to [`InitGate::get_or_start`] creates the start future and
//! caches it. Every later or concurrent call gets a clone of that same shared
//! future, so the provider's `start` runs at most once no matter how many
//! callers race, and they all settle together.
//!
//! `start` itself runs when the shared future is first polled, outside the
//! gate's lock, so a start routine may call back into the gate. A nested
//! call gets the start already in flight.
//!
//! A failed start stays failed. The gate never clears its future, so a
//! service whose provider failed to start reports that failure for the rest
//! of its life.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Shared handle to the one initialization of a service.
pub type InitFuture = Shared<BoxFuture<'static, Result<()>>>;

/// Where initialization stands, observed without polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitStatus {
    NotStarted,
    Pending,
    Ready,
    Failed(Error),
}

/// Caches the one start future of a service.
#[derive(Default)]
pub struct InitGate {
    started: Mutex<Option<InitFuture>>,
}

impl InitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached start future. On the first call it wraps `start`,
    /// which is called on the first poll.
    pub fn get_or_start<F>(&self, start: F) -> InitFuture
    where
        F: FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static,
    {
        let mut started = self.started.lock();
        if let Some(future) = started.as_ref() {
            return future.clone();
        }

        let future = async move { start().await }.boxed().shared();
        *started = Some(future.clone());
        future
    }

    pub fn status(&self) -> InitStatus {
        match self.started.lock().as_ref() {
            None => InitStatus::NotStarted,
            Some(future) => match future.peek() {
                None => InitStatus::Pending,
                Some(Ok(())) => InitStatus::Ready,
                Some(Err(err)) => InitStatus::Failed(err.clone()),
            },
        }
    }
}

impl std::fmt::Debug for InitGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitGate")
            .field("status", &self.status())
            .finish()
    }
}
