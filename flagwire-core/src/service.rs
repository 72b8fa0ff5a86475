//! The feature service.
//!
//! One `FeatureService` owns one provider client, one feature registry and
//! the start gate for that client. Everything that reads flag state
//! (directives, guards, typed façades) holds a reference to the same service
//! instead of reaching for a global.
//!
//! # Example
//!
//! ```rust,ignore
//! use flagwire_core::{FeatureService, ContextSource, FlagContext, context_factory};
//!
//! let factory = context_factory(|| Ok(FlagContext::new().with_user_id("42").into()));
//! let service = FeatureService::with_context_factory(provider, Some(&factory))?;
//!
//! service.init().await?;
//!
//! let beta = service.is_enabled("beta", None);
//! let beta_b = service.is_enabled("beta", Some("B"));
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::FutureExt;
use tracing::debug;

use crate::config::FeatureConfig;
use crate::context::{adapt, ContextFactory, ContextSubscription};
use crate::error::{Error, Result};
use crate::features::{FeatureKey, FeatureRegistry};
use crate::init::{InitFuture, InitGate, InitStatus};
use crate::provider::{FlagProvider, HandlerId, ProviderEvent};
use crate::reactive::{Memo, ReadCell, ReadSignal};
use crate::typed::{FeatureSet, TypedFeatures};

/// Reactive view over one flag provider.
pub struct FeatureService {
    registry: Arc<FeatureRegistry>,
    provider: Arc<dyn FlagProvider>,
    gate: InitGate,
    update_handler: HandlerId,
    context: Option<ContextSubscription>,
    shut_down: AtomicBool,
}

impl FeatureService {
    /// Wrap `provider` without a context source.
    pub fn new(provider: Arc<dyn FlagProvider>) -> Self {
        let registry = Arc::new(FeatureRegistry::new(provider.clone()));
        let update_handler = Self::listen_for_updates(&provider, &registry);

        debug!("feature service created");
        Self {
            registry,
            provider,
            gate: InitGate::new(),
            update_handler,
            context: None,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Wrap `provider` and feed it the context produced by `factory`.
    ///
    /// The factory runs once, here. An error it returns is handed back
    /// unchanged and nothing is registered with the provider.
    pub fn with_context_factory(
        provider: Arc<dyn FlagProvider>,
        factory: Option<&ContextFactory>,
    ) -> Result<Self> {
        let context = match factory {
            Some(factory) => {
                let target = provider.clone();
                Some(adapt(factory, move |ctx| target.update_context(ctx))?)
            }
            None => None,
        };

        let mut service = Self::new(provider);
        service.context = context;
        Ok(service)
    }

    /// Validate `config`, build the provider from it and wire the config's
    /// context factory.
    pub fn from_config<P, B>(config: FeatureConfig, build: B) -> Result<Self>
    where
        P: FlagProvider,
        B: FnOnce(&FeatureConfig) -> P,
    {
        config.validate()?;
        debug!(
            app = %config.app_name,
            url = %config.url,
            refresh_interval = ?config.refresh_interval,
            "building flag provider from config"
        );

        let provider: Arc<dyn FlagProvider> = Arc::new(build(&config));
        Self::with_context_factory(provider, config.context_factory.as_ref())
    }

    fn listen_for_updates(
        provider: &Arc<dyn FlagProvider>,
        registry: &Arc<FeatureRegistry>,
    ) -> HandlerId {
        let registry: Weak<FeatureRegistry> = Arc::downgrade(registry);
        provider.on(
            ProviderEvent::Update,
            Arc::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.sync();
                }
            }),
        )
    }

    /// Whether `key` is enabled, optionally only for the given variant.
    ///
    /// Without a variant this is the registry's own cell, so every call for
    /// the same key returns the same cell. With a variant it is a new derived
    /// cell that is true only while the flag is enabled and its effective
    /// variant equals `variant`. An empty variant counts as none.
    pub fn is_enabled(&self, key: impl Into<FeatureKey>, variant: Option<&str>) -> ReadCell<bool> {
        let store = self.registry.get_or_create(&key.into());

        match variant.filter(|v| !v.is_empty()) {
            None => ReadCell::Source(store.enabled()),
            Some(expected) => {
                let expected = expected.to_string();
                let enabled = store.enabled();
                let current = store.variant();
                ReadCell::Derived(Memo::new(move || {
                    enabled.get() && current.get().as_deref() == Some(expected.as_str())
                }))
            }
        }
    }

    /// The effective variant of `key`. `None` when the flag has no variant
    /// or its variant is disabled.
    pub fn get_variant(&self, key: impl Into<FeatureKey>) -> ReadSignal<Option<String>> {
        self.registry.get_or_create(&key.into()).variant()
    }

    /// Start the provider, once.
    ///
    /// Every call returns a handle to the same start. Concurrent callers
    /// share it and see the same outcome, failure included. The provider's
    /// `start` is called when the handle is first polled.
    pub fn init(&self) -> InitFuture {
        let provider = self.provider.clone();
        self.gate.get_or_start(move || {
            debug!("starting flag provider");
            let start = provider.start();
            async move {
                start.await.map_err(Error::from)?;
                debug!("flag provider ready");
                Ok(())
            }
            .boxed()
        })
    }

    pub fn init_status(&self) -> InitStatus {
        self.gate.status()
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn provider(&self) -> &Arc<dyn FlagProvider> {
        &self.provider
    }

    /// Typed access for a compile-time known set of flags.
    pub fn typed<F: FeatureSet>(self: &Arc<Self>) -> TypedFeatures<F> {
        TypedFeatures::new(self.clone())
    }

    /// Detach from the provider. Runs once; later calls do nothing.
    ///
    /// Removes the update handler, stops the provider and closes the context
    /// subscription. Cells already handed out keep their last value.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(features = self.registry.len(), "shutting down feature service");
        self.provider.off(ProviderEvent::Update, self.update_handler);
        self.provider.stop();
        if let Some(context) = &self.context {
            context.unsubscribe();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Drop for FeatureService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for FeatureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureService")
            .field("registry", &self.registry)
            .field("gate", &self.gate)
            .field("context", &self.context)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

// ---- Tests ----
