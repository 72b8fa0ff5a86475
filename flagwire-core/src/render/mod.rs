//! Conditional rendering driven by a feature flag.
//!
//! A [`FeatureDirective`] watches one flag and keeps exactly one of two views
//! mounted in its container: the primary view while the flag condition
//! holds, otherwise the fallback view if there is one. A view is only
//! rebuilt when the branch actually changes; flag updates that leave the
//! branch alone reach the mounted view through its [`ViewContext`] cells.
//!
//! # States
//!
//! ```text
//!                 condition holds
//! Uninitialized ─────────────────────▶ ShowingPrimary
//!       │                                 ▲      │
//!       │ condition fails                 │      │ condition fails
//!       ▼                                 │      ▼
//!  ShowingFallback ◀── fallback set ── ShowingNone
//! ```

mod directive;
mod view;

pub use directive::{DirectiveInputs, FeatureDirective};
pub use view::{EmbeddedView, Template, ViewContainer, ViewHandle, ViewSlot};

use crate::features::FeatureKey;
use crate::reactive::Memo;

/// Which way round a directive reads its flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Primary view while the flag is enabled.
    Enabled,
    /// Primary view while the flag is not enabled, including when no flag is
    /// bound at all.
    Disabled,
}

impl Polarity {
    /// Whether the primary view should be mounted for `context`.
    ///
    /// `Disabled` is the exact negation of `Enabled`.
    pub fn should_render_primary(self, context: Option<&RenderContext>) -> bool {
        let enabled = context.is_some_and(|ctx| ctx.enabled);
        match self {
            Self::Enabled => enabled,
            Self::Disabled => !enabled,
        }
    }
}

/// Flag state handed to rendered views. Replaced, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    pub feature: FeatureKey,
    pub enabled: bool,
    pub variant: Option<String>,
}

/// What a directive currently has mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Uninitialized,
    ShowingPrimary(ViewHandle),
    ShowingFallback(ViewHandle),
    /// Fallback wanted but none was given.
    ShowingNone,
}

impl RenderState {
    pub fn handle(&self) -> Option<ViewHandle> {
        match self {
            Self::ShowingPrimary(handle) | Self::ShowingFallback(handle) => Some(*handle),
            Self::Uninitialized | Self::ShowingNone => None,
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, Self::ShowingPrimary(_))
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::ShowingFallback(_))
    }
}

/// Cells exposed to a rendered view.
///
/// Each accessor is its own derived cell, so a view can react to, say, a
/// variant change without the directive rebuilding it.
#[derive(Clone, Debug)]
pub struct ViewContext {
    pub context: Memo<Option<RenderContext>>,
    pub enabled: Memo<Option<bool>>,
    pub feature: Memo<Option<FeatureKey>>,
    pub variant: Memo<Option<String>>,
}

impl ViewContext {
    pub fn new(context: Memo<Option<RenderContext>>) -> Self {
        let source = context.clone();
        let enabled = Memo::new(move || source.get().map(|ctx| ctx.enabled));

        let source = context.clone();
        let feature = Memo::new(move || source.get().map(|ctx| ctx.feature));

        let source = context.clone();
        let variant = Memo::new(move || source.get().and_then(|ctx| ctx.variant));

        Self {
            context,
            enabled,
            feature,
            variant,
        }
    }
}
