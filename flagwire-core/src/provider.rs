//! The remote flag provider contract.
//!
//! Flag evaluation, polling and network transport all live behind
//! [`FlagProvider`]. The service only asks for current answers and listens
//! for the provider's "update" event.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A variant as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantInfo {
    pub name: String,
    pub enabled: bool,
}

impl VariantInfo {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
        }
    }

    /// The effective variant name: a disabled variant counts as no variant.
    pub fn effective(variant: Option<Self>) -> Option<String> {
        variant.filter(|v| v.enabled).map(|v| v.name)
    }
}

/// Events a provider can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEvent {
    /// First successful fetch after start.
    Ready,
    /// Flag state may have changed. Carries no payload.
    Update,
    /// A fetch failed.
    Error,
}

/// Token returned by [`FlagProvider::on`], used to remove the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback registered for a [`ProviderEvent`].
pub type EventHandler = Arc<dyn Fn() + Send + Sync>;

/// Evaluation context pushed to the provider.
///
/// `FlagContext::default()` is the empty context; the provider never receives
/// "no context".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, String>,
}

impl FlagContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// True for the `{}` context.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Error reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A remote flag-provider client.
///
/// `start` is not required to be safe to call twice; the service guarantees
/// it calls it at most once per instance.
pub trait FlagProvider: Send + Sync + 'static {
    /// Current enablement of `name`. Unknown flags are `false`.
    fn is_enabled(&self, name: &str) -> bool;

    /// Current variant of `name`, if any.
    fn get_variant(&self, name: &str) -> Option<VariantInfo>;

    /// Start fetching. Resolves once the provider is ready.
    ///
    /// Called on the first poll of [`FeatureService::init`]'s future, not
    /// when `init` is called.
    ///
    /// [`FeatureService::init`]: crate::FeatureService::init
    fn start(&self) -> BoxFuture<'static, Result<(), ProviderError>>;

    /// Stop fetching.
    fn stop(&self);

    /// Register `handler` for `event`.
    fn on(&self, event: ProviderEvent, handler: EventHandler) -> HandlerId;

    /// Remove a handler registered with [`FlagProvider::on`].
    fn off(&self, event: ProviderEvent, handler: HandlerId);

    /// Replace the evaluation context.
    fn update_context(&self, context: FlagContext);
}

impl fmt::Debug for dyn FlagProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FlagProvider")
    }
}
