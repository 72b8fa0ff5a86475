//! The feature directive: a flag-driven two-branch view switch.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{Polarity, RenderContext, RenderState, Template, ViewContainer, ViewContext};
use crate::features::FeatureKey;
use crate::reactive::{Effect, Memo, ReactiveContext, Signal};
use crate::service::FeatureService;

/// Bindable inputs of a directive.
///
/// The host writes these signals; the directive re-evaluates whenever one of
/// them changes.
#[derive(Clone)]
pub struct DirectiveInputs {
    /// The flag to watch. `None` and the empty key both mean "no flag".
    pub feature: Signal<Option<FeatureKey>>,
    /// Only count the flag as enabled for this variant.
    pub variant: Signal<Option<String>>,
    /// View to show when the primary one is not.
    pub fallback: Signal<Option<Arc<dyn Template>>>,
}

impl DirectiveInputs {
    pub fn new(feature: impl Into<FeatureKey>) -> Self {
        Self {
            feature: Signal::new(Some(feature.into())),
            variant: Signal::new(None),
            fallback: Signal::new(None),
        }
    }

    pub fn with_variant(self, variant: impl Into<String>) -> Self {
        self.variant.set(Some(variant.into()));
        self
    }

    pub fn with_fallback(self, fallback: Arc<dyn Template>) -> Self {
        self.fallback.set(Some(fallback));
        self
    }
}

impl Default for DirectiveInputs {
    fn default() -> Self {
        Self {
            feature: Signal::new(None),
            variant: Signal::new(None),
            fallback: Signal::new(None),
        }
    }
}

impl fmt::Debug for DirectiveInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveInputs")
            .field("feature", &self.feature.get_untracked())
            .field("variant", &self.variant.get_untracked())
            .field("has_fallback", &self.fallback.with_untracked(Option::is_some))
            .finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Branch {
    Primary,
    Fallback,
    Nothing,
}

impl Branch {
    fn of(state: &RenderState) -> Option<Self> {
        match state {
            RenderState::Uninitialized => None,
            RenderState::ShowingPrimary(_) => Some(Self::Primary),
            RenderState::ShowingFallback(_) => Some(Self::Fallback),
            RenderState::ShowingNone => Some(Self::Nothing),
        }
    }
}

/// Mounts a primary or fallback view depending on a flag.
pub struct FeatureDirective {
    polarity: Polarity,
    inputs: DirectiveInputs,
    view_context: ViewContext,
    state: Arc<Mutex<RenderState>>,
    effect: Effect,
}

impl FeatureDirective {
    /// Show `template` while the flag is enabled.
    pub fn enabled(
        service: Arc<FeatureService>,
        inputs: DirectiveInputs,
        template: Arc<dyn Template>,
        container: Arc<dyn ViewContainer>,
    ) -> Self {
        Self::new(Polarity::Enabled, service, inputs, template, container)
    }

    /// Show `template` while the flag is disabled or unbound.
    pub fn disabled(
        service: Arc<FeatureService>,
        inputs: DirectiveInputs,
        template: Arc<dyn Template>,
        container: Arc<dyn ViewContainer>,
    ) -> Self {
        Self::new(Polarity::Disabled, service, inputs, template, container)
    }

    /// Build the directive and render it once.
    pub fn new(
        polarity: Polarity,
        service: Arc<FeatureService>,
        inputs: DirectiveInputs,
        template: Arc<dyn Template>,
        container: Arc<dyn ViewContainer>,
    ) -> Self {
        let view_context = ViewContext::new(render_context(service, &inputs));
        let state = Arc::new(Mutex::new(RenderState::Uninitialized));

        let effect = {
            let context = view_context.context.clone();
            let fallback = inputs.fallback.clone();
            let view_context = view_context.clone();
            let state = state.clone();

            Effect::new(move || {
                let current = context.get();
                let fallback = fallback.get();
                let target = if polarity.should_render_primary(current.as_ref()) {
                    Branch::Primary
                } else if fallback.is_some() {
                    Branch::Fallback
                } else {
                    Branch::Nothing
                };

                let previous = *state.lock();
                if Branch::of(&previous) == Some(target) {
                    return;
                }

                debug!(
                    feature = ?current.as_ref().map(|ctx| &ctx.feature),
                    ?polarity,
                    from = ?previous,
                    to = ?target,
                    "feature directive switching branch"
                );

                // Views read cells while building; none of that belongs to
                // this effect.
                let next = ReactiveContext::untracked(|| {
                    container.clear();
                    match (target, fallback) {
                        (Branch::Primary, _) => {
                            RenderState::ShowingPrimary(container.insert(template.create(&view_context)))
                        }
                        (Branch::Fallback, Some(fallback)) => {
                            RenderState::ShowingFallback(container.insert(fallback.create(&view_context)))
                        }
                        _ => RenderState::ShowingNone,
                    }
                });
                *state.lock() = next;
            })
        };

        Self {
            polarity,
            inputs,
            view_context,
            state,
            effect,
        }
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn inputs(&self) -> &DirectiveInputs {
        &self.inputs
    }

    pub fn state(&self) -> RenderState {
        *self.state.lock()
    }

    /// The cells handed to every view this directive creates.
    pub fn view_context(&self) -> &ViewContext {
        &self.view_context
    }

    /// Stop reacting. Mounted views stay where they are.
    pub fn dispose(&self) {
        if !self.effect.is_disposed() {
            debug!(polarity = ?self.polarity, "feature directive disposed");
        }
        self.effect.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.effect.is_disposed()
    }
}

impl Drop for FeatureDirective {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for FeatureDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureDirective")
            .field("polarity", &self.polarity)
            .field("inputs", &self.inputs)
            .field("state", &self.state())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// The render context cell: `None` while no flag is bound.
fn render_context(
    service: Arc<FeatureService>,
    inputs: &DirectiveInputs,
) -> Memo<Option<RenderContext>> {
    let feature = inputs.feature.clone();
    let variant = inputs.variant.clone();

    Memo::new(move || {
        let feature = feature.get().filter(|key| !key.is_empty())?;
        let wanted = variant.get();
        let enabled = service.is_enabled(&feature, wanted.as_deref()).get();
        let variant = service.get_variant(&feature).get();
        Some(RenderContext {
            feature,
            enabled,
            variant,
        })
    })
}

// ---- Tests ----
