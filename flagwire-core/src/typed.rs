//! Strongly typed access to a known set of flags.
//!
//! Declare the flags once with [`feature_set!`](crate::feature_set) and read
//! them through [`TypedFeatures`]. Every lookup still goes through the
//! service's name-based API; the enum only fixes the names at compile time.
//!
//! ```rust,ignore
//! flagwire_core::feature_set! {
//!     pub enum Flags {
//!         NewCheckout => "new-checkout",
//!         DarkMode => "dark-mode",
//!     }
//! }
//!
//! let flags = service.typed::<Flags>();
//! let checkout = flags.enabled(Flags::NewCheckout);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::features::FeatureKey;
use crate::reactive::{ReadCell, ReadSignal};
use crate::service::FeatureService;

/// A closed set of feature flags with fixed string keys.
pub trait FeatureSet: Copy + Send + Sync + 'static {
    /// Every member, in declaration order.
    const ALL: &'static [Self];

    /// The provider-side name of this flag.
    fn key(&self) -> &'static str;
}

/// Declare an enum of feature flags and implement [`FeatureSet`] for it.
///
/// Each variant maps to the flag name the provider knows it by.
#[macro_export]
macro_rules! feature_set {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $key:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant,
            )+
        }

        impl $crate::typed::FeatureSet for $name {
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn key(&self) -> &'static str {
                match self {
                    $(Self::$variant => $key,)+
                }
            }
        }
    };
}

/// Typed view over a shared [`FeatureService`].
pub struct TypedFeatures<F: FeatureSet> {
    service: Arc<FeatureService>,
    _flags: PhantomData<fn() -> F>,
}

impl<F: FeatureSet> TypedFeatures<F> {
    pub fn new(service: Arc<FeatureService>) -> Self {
        Self {
            service,
            _flags: PhantomData,
        }
    }

    pub fn enabled(&self, flag: F) -> ReadCell<bool> {
        self.service.is_enabled(flag.key(), None)
    }

    pub fn enabled_variant(&self, flag: F, variant: &str) -> ReadCell<bool> {
        self.service.is_enabled(flag.key(), Some(variant))
    }

    pub fn variant(&self, flag: F) -> ReadSignal<Option<String>> {
        self.service.get_variant(flag.key())
    }

    pub fn keys(&self) -> Vec<FeatureKey> {
        F::ALL.iter().map(|flag| FeatureKey::new(flag.key())).collect()
    }

    /// Create the cells of every flag in the set so that update events
    /// cover them before anyone reads them.
    pub fn preload(&self) {
        for flag in F::ALL {
            self.service.registry().get_or_create(&FeatureKey::new(flag.key()));
        }
    }

    /// Current enablement of every flag, untracked.
    pub fn snapshot(&self) -> Vec<(F, bool)> {
        F::ALL
            .iter()
            .map(|flag| (*flag, self.enabled(*flag).get_untracked()))
            .collect()
    }

    pub fn service(&self) -> &Arc<FeatureService> {
        &self.service
    }
}

impl<F: FeatureSet> Clone for TypedFeatures<F> {
    fn clone(&self) -> Self {
        Self::new(self.service.clone())
    }
}

impl<F: FeatureSet> fmt::Debug for TypedFeatures<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedFeatures")
            .field("keys", &F::ALL.iter().map(|flag| flag.key()).collect::<Vec<_>>())
            .finish()
    }
}
