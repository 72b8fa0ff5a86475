//! Flagwire Core
//!
//! Reactive feature-flag state on top of a remote flag provider. It
//! implements:
//!
//! - A per-feature cache of reactive cells, created on first use
//! - An update loop that rewrites only the cells whose value changed
//! - Variant-gated enablement cells
//! - Context delivery from immediate, reactive, stream or deferred sources
//! - A single-flight provider start
//! - A directive that switches between a primary and a fallback view
//!
//! Flag evaluation, polling and transport belong to the provider behind the
//! [`FlagProvider`] trait.
//!
//! # Architecture
//!
//! - `reactive`: signals, memos, effects and the dependency runtime
//! - `provider`: the contract a remote flag client fulfils
//! - `features`: the feature cache and its update loop
//! - `service`: [`FeatureService`], the entry point tying it together
//! - `context`: context source adapter
//! - `init`: single-flight start
//! - `render`: the conditional render directive
//! - `guard`: navigation guard
//! - `typed`: typed façade over a known flag set
//! - `config`: registration config
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use flagwire_core::{FeatureConfig, FeatureService, Effect};
//!
//! let config = FeatureConfig::from_json(r#"{
//!     "appName": "shop",
//!     "clientKey": "default:production.abc",
//!     "url": "https://flags.example.com/api/frontend"
//! }"#)?;
//! let service = Arc::new(FeatureService::from_config(config, MyClient::new)?);
//! service.init().await?;
//!
//! let checkout = service.is_enabled("new-checkout", None);
//! Effect::new(move || {
//!     println!("new checkout: {}", checkout.get());
//! });
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod features;
pub mod guard;
pub mod init;
pub mod provider;
pub mod reactive;
pub mod render;
pub mod service;
pub mod typed;

#[cfg(test)]
mod testing;

pub use config::FeatureConfig;
pub use context::{adapt, context_factory, ContextFactory, ContextSource, ContextSubscription};
pub use error::{Error, Result};
pub use features::{FeatureKey, FeatureRegistry, SignalStore, SyncReport};
pub use guard::{can_activate, FeatureGuard};
pub use init::{InitFuture, InitGate, InitStatus};
pub use provider::{
    EventHandler, FlagContext, FlagProvider, HandlerId, ProviderError, ProviderEvent, VariantInfo,
};
pub use reactive::{Effect, Memo, ReadCell, ReadSignal, Runtime, Signal};
pub use render::{
    DirectiveInputs, EmbeddedView, FeatureDirective, Polarity, RenderContext, RenderState,
    Template, ViewContainer, ViewContext, ViewHandle, ViewSlot,
};
pub use service::FeatureService;
pub use typed::{FeatureSet, TypedFeatures};
