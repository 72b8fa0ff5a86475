//! Registration config.
//!
//! Mirrors what a frontend flag client needs to connect: application name,
//! client key and endpoint, plus optional polling cadence. Polling itself is
//! the provider's business; the service only carries the value through to
//! whoever builds the provider.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::ContextFactory;
use crate::error::{Error, Result};

/// Settings for one feature service.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureConfig {
    pub app_name: String,
    pub client_key: String,
    pub url: String,

    /// Provider polling cadence in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// Fetch once on start and never poll.
    #[serde(default)]
    pub disable_refresh: bool,

    /// Source of the evaluation context pushed to the provider.
    #[serde(skip)]
    pub context_factory: Option<ContextFactory>,
}

impl FeatureConfig {
    pub fn new(
        app_name: impl Into<String>,
        client_key: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            client_key: client_key.into(),
            url: url.into(),
            refresh_interval: None,
            environment: None,
            disable_refresh: false,
            context_factory: None,
        }
    }

    pub fn with_refresh_interval(mut self, seconds: u64) -> Self {
        self.refresh_interval = Some(seconds);
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_context_factory(mut self, factory: ContextFactory) -> Self {
        self.context_factory = Some(factory);
        self
    }

    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the connection settings are usable.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("appName", &self.app_name)?;
        require_non_empty("clientKey", &self.client_key)?;
        require_non_empty("url", &self.url)?;

        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::Config {
                field: "url",
                reason: format!("expected an http(s) URL, got `{}`", self.url),
            });
        }

        if self.refresh_interval == Some(0) {
            return Err(Error::Config {
                field: "refreshInterval",
                reason: "must be at least one second".to_string(),
            });
        }

        Ok(())
    }

    /// Polling cadence, if one was configured.
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval.map(Duration::from_secs)
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

impl fmt::Debug for FeatureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureConfig")
            .field("app_name", &self.app_name)
            .field("url", &self.url)
            .field("refresh_interval", &self.refresh_interval)
            .field("environment", &self.environment)
            .field("disable_refresh", &self.disable_refresh)
            .field("context_factory", &self.context_factory.is_some())
            .finish_non_exhaustive()
    }
}
