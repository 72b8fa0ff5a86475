//! Navigation guard.
//!
//! Lets a router ask "may this route open?" based on a flag. The answer is
//! read once, after the service has started; the guard does not keep
//! watching the flag.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::features::FeatureKey;
use crate::service::FeatureService;

/// Allows navigation only while a flag is enabled.
#[derive(Debug, Clone)]
pub struct FeatureGuard {
    service: Arc<FeatureService>,
    key: FeatureKey,
}

impl FeatureGuard {
    pub fn new(service: Arc<FeatureService>, key: impl Into<FeatureKey>) -> Self {
        Self {
            service,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &FeatureKey {
        &self.key
    }

    pub async fn can_activate(&self) -> bool {
        can_activate(&self.service, self.key.clone()).await
    }
}

/// Wait for the service to start, then report whether `key` is enabled.
///
/// A failed start denies navigation.
pub async fn can_activate(service: &FeatureService, key: impl Into<FeatureKey>) -> bool {
    let key = key.into();

    if let Err(err) = service.init().await {
        warn!(feature = %key, error = %err, "flag provider unavailable, denying navigation");
        return false;
    }

    let allowed = service.is_enabled(key.clone(), None).get_untracked();
    debug!(feature = %key, allowed, "route guard evaluated");
    allowed
}
