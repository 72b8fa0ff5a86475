//! Feature state cache and the update synchronization loop.
//!
//! Every feature name that has ever been queried owns exactly one pair of
//! signals for the lifetime of the registry. Lookups hand out those same
//! signals, so anything derived from them subscribes once and keeps
//! receiving updates. Nothing is ever evicted.
//!
//! Only two code paths write the signals: first-read seeding in
//! [`FeatureRegistry::get_or_create`] and [`FeatureRegistry::sync`].

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::provider::{FlagProvider, VariantInfo};
use crate::reactive::{ReadSignal, Runtime, Signal};

/// Name of a feature flag. Compared by exact string match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureKey(Arc<str>);

impl FeatureKey {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FeatureKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for FeatureKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FeatureKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for FeatureKey {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&String> for FeatureKey {
    fn from(name: &String) -> Self {
        Self::new(name)
    }
}

impl From<&FeatureKey> for FeatureKey {
    fn from(key: &FeatureKey) -> Self {
        key.clone()
    }
}

/// The cells backing one feature.
#[derive(Clone)]
pub struct SignalStore {
    enabled: Signal<bool>,
    variant: Signal<Option<String>>,
}

impl SignalStore {
    fn new(enabled: bool, variant: Option<String>) -> Self {
        Self {
            enabled: Signal::new(enabled),
            variant: Signal::new(variant),
        }
    }

    pub fn enabled(&self) -> ReadSignal<bool> {
        self.enabled.read_only()
    }

    pub fn variant(&self) -> ReadSignal<Option<String>> {
        self.variant.read_only()
    }

    /// Write the given state, skipping cells whose value is unchanged.
    ///
    /// Returns true if anything was written.
    fn apply(&self, key: &FeatureKey, enabled: bool, variant: Option<String>) -> bool {
        let mut written = false;

        if self.enabled.get_untracked() != enabled {
            trace!(feature = %key, enabled, "feature enablement changed");
            self.enabled.set(enabled);
            written = true;
        }

        if self.variant.with_untracked(|current| *current != variant) {
            trace!(feature = %key, variant = ?variant, "feature variant changed");
            self.variant.set(variant);
            written = true;
        }

        written
    }
}

impl fmt::Debug for SignalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalStore")
            .field("enabled", &self.enabled.get_untracked())
            .field("variant", &self.variant.get_untracked())
            .finish()
    }
}

/// Outcome of one pass of [`FeatureRegistry::sync`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Features visited.
    pub checked: usize,
    /// Features with at least one cell written.
    pub changed: usize,
}

/// Per-service cache of feature cells, seeded from the provider on first use.
pub struct FeatureRegistry {
    provider: Arc<dyn FlagProvider>,
    entries: DashMap<FeatureKey, SignalStore>,
}

impl FeatureRegistry {
    pub fn new(provider: Arc<dyn FlagProvider>) -> Self {
        Self {
            provider,
            entries: DashMap::new(),
        }
    }

    /// Return the cells for `key`, creating and seeding them on first use.
    ///
    /// A hit never re-reads the provider. Seeding happens outside the map
    /// lock; if two threads race, the first insert wins and both get its
    /// cells.
    pub fn get_or_create(&self, key: &FeatureKey) -> SignalStore {
        if let Some(store) = self.entries.get(key) {
            return store.value().clone();
        }

        let (enabled, variant) = self.read_provider(key);
        let seeded = SignalStore::new(enabled, variant);
        self.entries
            .entry(key.clone())
            .or_insert(seeded)
            .value()
            .clone()
    }

    /// Re-read every cached feature from the provider and write the cells
    /// whose value changed.
    ///
    /// Runs as one batch: effects depending on these cells run after the
    /// whole pass, never against a half-updated cache.
    pub fn sync(&self) -> SyncReport {
        let snapshot: Vec<(FeatureKey, SignalStore)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        Runtime::batch(|| {
            let mut report = SyncReport::default();
            for (key, store) in &snapshot {
                let (enabled, variant) = self.read_provider(key);
                report.checked += 1;
                if store.apply(key, enabled, variant) {
                    report.changed += 1;
                }
            }
            trace!(checked = report.checked, changed = report.changed, "feature sync pass");
            report
        })
    }

    fn read_provider(&self, key: &FeatureKey) -> (bool, Option<String>) {
        let enabled = self.provider.is_enabled(key.as_str());
        let variant = VariantInfo::effective(self.provider.get_variant(key.as_str()));
        (enabled, variant)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every feature queried so far, in no particular order.
    pub fn keys(&self) -> Vec<FeatureKey> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("features", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::SubscriberId;
    use crate::testing::MockProvider;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn registry() -> (Arc<MockProvider>, FeatureRegistry) {
        let provider = MockProvider::new();
        let registry = FeatureRegistry::new(provider.clone());
        (provider, registry)
    }

    #[test]
    fn seeds_from_provider_on_first_access() {
        let (provider, registry) = registry();
        provider.set_enabled("feature", true);
        provider.set_variant("feature", "A", true);

        let store = registry.get_or_create(&"feature".into());
        assert!(store.enabled().get());
        assert_eq!(store.variant().get(), Some("A".to_string()));
        assert!(registry.contains("feature"));
    }

    #[test]
    fn unknown_feature_is_disabled_without_variant() {
        let (_provider, registry) = registry();

        let store = registry.get_or_create(&"missing".into());
        assert!(!store.enabled().get());
        assert_eq!(store.variant().get(), None);
    }

    #[test]
    fn hit_returns_same_cells_without_rereading() {
        let (provider, registry) = registry();
        provider.set_enabled("feature", true);

        let first = registry.get_or_create(&"feature".into());
        provider.set_enabled("feature", false);
        let second = registry.get_or_create(&"feature".into());

        assert!(first.enabled().ptr_eq(&second.enabled()));
        assert!(second.enabled().get());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sync_writes_only_changed_cells() {
        let (provider, registry) = registry();
        provider.set_enabled("feature", true);
        let store = registry.get_or_create(&"feature".into());

        let writes = Arc::new(AtomicI32::new(0));
        let writes_clone = writes.clone();
        store.enabled().subscribe(SubscriberId::new(), move || {
            writes_clone.fetch_add(1, Ordering::SeqCst);
        });

        let report = registry.sync();
        assert_eq!(report, SyncReport { checked: 1, changed: 0 });
        assert_eq!(writes.load(Ordering::SeqCst), 0);

        provider.set_enabled("feature", false);
        let report = registry.sync();
        assert_eq!(report.changed, 1);
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert!(!store.enabled().get());
    }

    #[test]
    fn sync_normalizes_disabled_variants() {
        let (provider, registry) = registry();
        provider.set_variant("feature", "A", true);
        let store = registry.get_or_create(&"feature".into());

        provider.set_variant("feature", "A", false);
        registry.sync();
        assert_eq!(store.variant().get(), None);
    }

    #[test]
    fn sync_ignores_features_never_queried() {
        let (provider, registry) = registry();
        provider.set_enabled("never-read", true);

        assert_eq!(registry.sync().checked, 0);
        assert!(registry.is_empty());
    }
}
