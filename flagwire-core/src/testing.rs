//! In-memory provider used by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;

use crate::provider::{
    EventHandler, FlagContext, FlagProvider, HandlerId, ProviderError, ProviderEvent, VariantInfo,
};

#[derive(Default)]
pub(crate) struct MockProvider {
    enabled: Mutex<HashMap<String, bool>>,
    variants: Mutex<HashMap<String, VariantInfo>>,
    handlers: Mutex<Vec<(HandlerId, ProviderEvent, EventHandler)>>,
    contexts: Mutex<Vec<FlagContext>>,
    start_error: Mutex<Option<ProviderError>>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl MockProvider {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_enabled(&self, name: &str, enabled: bool) {
        self.enabled.lock().insert(name.to_string(), enabled);
    }

    pub(crate) fn set_variant(&self, name: &str, variant: &str, enabled: bool) {
        self.variants
            .lock()
            .insert(name.to_string(), VariantInfo::new(variant, enabled));
    }

    pub(crate) fn fail_start(&self, message: &str) {
        *self.start_error.lock() = Some(ProviderError::new(message));
    }

    /// Fire every handler registered for `event`.
    pub(crate) fn emit(&self, event: ProviderEvent) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .iter()
            .filter(|(_, e, _)| *e == event)
            .map(|(_, _, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler();
        }
    }

    pub(crate) fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    pub(crate) fn contexts(&self) -> Vec<FlagContext> {
        self.contexts.lock().clone()
    }

    pub(crate) fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl FlagProvider for MockProvider {
    fn is_enabled(&self, name: &str) -> bool {
        self.enabled.lock().get(name).copied().unwrap_or(false)
    }

    fn get_variant(&self, name: &str) -> Option<VariantInfo> {
        self.variants.lock().get(name).cloned()
    }

    fn start(&self) -> BoxFuture<'static, Result<(), ProviderError>> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let result = match self.start_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        };
        async move {
            tokio::task::yield_now().await;
            result
        }
        .boxed()
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn on(&self, event: ProviderEvent, handler: EventHandler) -> HandlerId {
        let id = HandlerId::new();
        self.handlers.lock().push((id, event, handler));
        id
    }

    fn off(&self, event: ProviderEvent, handler: HandlerId) {
        self.handlers
            .lock()
            .retain(|(id, e, _)| !(*id == handler && *e == event));
    }

    fn update_context(&self, context: FlagContext) {
        self.contexts.lock().push(context);
    }
}
