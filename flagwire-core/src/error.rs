//! Error types.
//!
//! A missing feature flag is never an error: it reads as disabled with no
//! variant. A missing fallback view is not one either.

use crate::provider::ProviderError;

/// Errors surfaced by the feature service and its collaborators.
///
/// `Clone` because a failed provider start is handed to every caller that
/// waited on the same initialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The registration config is unusable.
    #[error("invalid config field `{field}`: {reason}")]
    Config { field: &'static str, reason: String },

    /// The config could not be parsed.
    #[error("failed to parse config: {0}")]
    ConfigParse(String),

    /// The provider failed to start. Not retried.
    #[error("flag provider failed to start: {0}")]
    Start(#[from] ProviderError),

    /// A context factory failed while producing its source.
    #[error("context factory failed: {0}")]
    Context(String),

    /// A stream or deferred context source needs a running tokio runtime.
    #[error("asynchronous context source requires a running tokio runtime")]
    NoRuntime,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
