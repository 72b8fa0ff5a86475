//! Context adapter.
//!
//! A context factory may hand back its context in one of four shapes: a
//! plain value, a reactive cell, a stream, or a future. [`adapt`] turns any
//! of them into calls of a single `on_change` callback and returns the
//! subscription that stops further calls.
//!
//! `on_change` never sees "no context": a missing value becomes
//! [`FlagContext::default`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{BoxStream, Stream, StreamExt};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::error::{Error, Result};
use crate::provider::FlagContext;
use crate::reactive::{Effect, ReadCell};

/// The shapes a context factory can produce.
pub enum ContextSource {
    /// Delivered once, synchronously.
    Immediate(Option<FlagContext>),
    /// Delivered now and again on every change of the cell.
    Reactive(ReadCell<Option<FlagContext>>),
    /// Every item is delivered as it arrives.
    Stream(BoxStream<'static, Option<FlagContext>>),
    /// Delivered once when the future resolves. Cannot be cancelled.
    Deferred(BoxFuture<'static, Option<FlagContext>>),
}

impl ContextSource {
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Option<FlagContext>> + Send + 'static,
    {
        Self::Stream(stream.boxed())
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: std::future::Future<Output = Option<FlagContext>> + Send + 'static,
    {
        Self::Deferred(future.boxed())
    }

    pub fn reactive(cell: impl Into<ReadCell<Option<FlagContext>>>) -> Self {
        Self::Reactive(cell.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Immediate(_) => "immediate",
            Self::Reactive(_) => "reactive",
            Self::Stream(_) => "stream",
            Self::Deferred(_) => "deferred",
        }
    }
}

impl From<FlagContext> for ContextSource {
    fn from(context: FlagContext) -> Self {
        Self::Immediate(Some(context))
    }
}

impl From<Option<FlagContext>> for ContextSource {
    fn from(context: Option<FlagContext>) -> Self {
        Self::Immediate(context)
    }
}

impl fmt::Debug for ContextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextSource").field(&self.kind()).finish()
    }
}

/// Produces the context source for a service. Called once, at construction.
pub type ContextFactory = Arc<dyn Fn() -> Result<ContextSource> + Send + Sync>;

/// Wrap a closure as a [`ContextFactory`].
pub fn context_factory<F>(factory: F) -> ContextFactory
where
    F: Fn() -> Result<ContextSource> + Send + Sync + 'static,
{
    Arc::new(factory)
}

enum Teardown {
    Nothing,
    Effect(Effect),
    Task(AbortHandle),
}

/// Live connection between a context source and its callback.
pub struct ContextSubscription {
    teardown: Teardown,
    closed: AtomicBool,
}

impl ContextSubscription {
    fn new(teardown: Teardown) -> Self {
        Self {
            teardown,
            closed: AtomicBool::new(false),
        }
    }

    /// Stop delivering context changes. Idempotent.
    ///
    /// Disposes a reactive source's effect and aborts a stream's task. A
    /// deferred source that has not resolved yet still delivers its value.
    pub fn unsubscribe(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match &self.teardown {
            Teardown::Nothing => {}
            Teardown::Effect(effect) => effect.dispose(),
            Teardown::Task(task) => task.abort(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ContextSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for ContextSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSubscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Call `factory` once and forward whatever it produces to `on_change`.
///
/// Errors from the factory propagate unchanged. Stream and deferred sources
/// are driven on the current tokio runtime and fail with
/// [`Error::NoRuntime`] outside one.
pub fn adapt<F>(factory: &ContextFactory, on_change: F) -> Result<ContextSubscription>
where
    F: Fn(FlagContext) + Send + Sync + 'static,
{
    let source = factory()?;
    debug!(kind = source.kind(), "adapting context source");

    let on_change = Arc::new(on_change);
    let teardown = match source {
        ContextSource::Immediate(context) => {
            on_change(context.unwrap_or_default());
            Teardown::Nothing
        }
        ContextSource::Reactive(cell) => {
            let effect = Effect::new(move || on_change(cell.get().unwrap_or_default()));
            Teardown::Effect(effect)
        }
        ContextSource::Stream(mut stream) => {
            let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
            let task = runtime.spawn(async move {
                while let Some(context) = stream.next().await {
                    on_change(context.unwrap_or_default());
                }
            });
            Teardown::Task(task.abort_handle())
        }
        ContextSource::Deferred(future) => {
            let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
            runtime.spawn(async move {
                on_change(future.await.unwrap_or_default());
            });
            Teardown::Nothing
        }
    };

    Ok(ContextSubscription::new(teardown))
}
