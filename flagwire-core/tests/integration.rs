//! Integration Tests for the Feature Service
//!
//! These tests drive the public API end to end: a provider double, the
//! service, directives, guards and the reactive runtime working together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use flagwire_core::reactive::{Effect, Memo, Runtime, Signal};
use flagwire_core::{
    can_activate, context_factory, ContextSource, DirectiveInputs, EmbeddedView, EventHandler,
    FeatureConfig, FeatureDirective, FeatureGuard, FeatureService, FeatureSet, FlagContext,
    FlagProvider, HandlerId, InitStatus, ProviderError, ProviderEvent, RenderState, Template,
    VariantInfo, ViewContext, ViewSlot,
};

// ---- Provider double ----

/// Flag client holding its toggles in memory. `publish` plays the role of a
/// completed poll: it swaps in new state and fires "update".
#[derive(Default)]
struct InMemoryProvider {
    toggles: Mutex<HashMap<String, (bool, Option<VariantInfo>)>>,
    handlers: Mutex<Vec<(HandlerId, ProviderEvent, EventHandler)>>,
    contexts: Mutex<Vec<FlagContext>>,
    context_watch: Mutex<Option<UnboundedSender<FlagContext>>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail: bool,
}

impl InMemoryProvider {
    fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    fn toggle(&self, name: &str, enabled: bool, variant: Option<(&str, bool)>) {
        self.toggles.lock().insert(
            name.to_string(),
            (enabled, variant.map(|(v, on)| VariantInfo::new(v, on))),
        );
    }

    fn publish(&self) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .iter()
            .filter(|(_, event, _)| *event == ProviderEvent::Update)
            .map(|(_, _, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler();
        }
    }

    fn contexts(&self) -> Vec<FlagContext> {
        self.contexts.lock().clone()
    }

    /// Receive every context the provider is handed from now on.
    fn watch_contexts(&self) -> UnboundedReceiver<FlagContext> {
        let (tx, rx) = unbounded_channel();
        *self.context_watch.lock() = Some(tx);
        rx
    }
}

impl FlagProvider for InMemoryProvider {
    fn is_enabled(&self, name: &str) -> bool {
        self.toggles.lock().get(name).map_or(false, |(on, _)| *on)
    }

    fn get_variant(&self, name: &str) -> Option<VariantInfo> {
        self.toggles.lock().get(name).and_then(|(_, v)| v.clone())
    }

    fn start(&self) -> BoxFuture<'static, Result<(), ProviderError>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail;
        async move {
            tokio::time::sleep(Duration::from_millis(2)).await;
            if fail {
                Err(ProviderError::new("401 unauthorized"))
            } else {
                Ok(())
            }
        }
        .boxed()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn on(&self, event: ProviderEvent, handler: EventHandler) -> HandlerId {
        let id = HandlerId::new();
        self.handlers.lock().push((id, event, handler));
        id
    }

    fn off(&self, event: ProviderEvent, handler: HandlerId) {
        self.handlers
            .lock()
            .retain(|(id, e, _)| !(*id == handler && *e == event));
    }

    fn update_context(&self, context: FlagContext) {
        if let Some(watch) = self.context_watch.lock().as_ref() {
            let _ = watch.send(context.clone());
        }
        self.contexts.lock().push(context);
    }
}

/// Template that labels its views and keeps a shared log of what happened.
struct LabelledTemplate {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

struct LabelledView {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Template for LabelledTemplate {
    fn create(&self, context: &ViewContext) -> Box<dyn EmbeddedView> {
        let variant = context.variant.get_untracked();
        self.log
            .lock()
            .push(format!("create {} {:?}", self.label, variant));
        Box::new(LabelledView {
            label: self.label,
            log: self.log.clone(),
        })
    }
}

impl EmbeddedView for LabelledView {
    fn destroy(self: Box<Self>) {
        self.log.lock().push(format!("destroy {}", self.label));
    }
}

fn template(label: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Template> {
    Arc::new(LabelledTemplate {
        label,
        log: log.clone(),
    })
}

// ---- Tests ----

/// Test the full path from config to rendered views and back to teardown.
#[tokio::test]
async fn config_to_directive_round_trip() {
    let provider = InMemoryProvider::shared();
    provider.toggle("checkout", true, Some(("A", true)));

    let config = FeatureConfig::from_json(
        r#"{ "appName": "shop", "clientKey": "key", "url": "https://flags.example.com/api" }"#,
    )
    .unwrap()
    .with_context_factory(context_factory(|| {
        Ok(FlagContext::new().with_user_id("1").into())
    }));

    let handle = provider.clone();
    let service = Arc::new(
        FeatureService::from_config(config, move |_| ForwardingProvider(handle)).unwrap(),
    );
    assert_eq!(provider.contexts(), vec![FlagContext::new().with_user_id("1")]);

    service.init().await.unwrap();
    assert_eq!(service.init_status(), InitStatus::Ready);

    let log = Arc::new(Mutex::new(Vec::new()));
    let slot = Arc::new(ViewSlot::new());
    let inputs = DirectiveInputs::new("checkout").with_fallback(template("fallback", &log));
    let directive = FeatureDirective::enabled(
        service.clone(),
        inputs,
        template("primary", &log),
        slot.clone(),
    );
    assert!(directive.state().is_primary());

    provider.toggle("checkout", true, Some(("B", true)));
    provider.publish();
    provider.toggle("checkout", false, None);
    provider.publish();

    assert!(directive.state().is_fallback());
    assert_eq!(
        *log.lock(),
        vec![
            "create primary Some(\"A\")".to_string(),
            "destroy primary".to_string(),
            "create fallback None".to_string(),
        ]
    );
    assert_eq!(slot.len(), 1);

    drop(directive);
    service.shutdown();
    assert_eq!(provider.stops.load(Ordering::SeqCst), 1);
    assert!(provider.handlers.lock().is_empty());
}

/// Provider wrapper so a test can keep a handle on the provider that
/// `from_config` builds.
struct ForwardingProvider(Arc<InMemoryProvider>);

impl FlagProvider for ForwardingProvider {
    fn is_enabled(&self, name: &str) -> bool {
        self.0.is_enabled(name)
    }

    fn get_variant(&self, name: &str) -> Option<VariantInfo> {
        self.0.get_variant(name)
    }

    fn start(&self) -> BoxFuture<'static, Result<(), ProviderError>> {
        self.0.start()
    }

    fn stop(&self) {
        self.0.stop()
    }

    fn on(&self, event: ProviderEvent, handler: EventHandler) -> HandlerId {
        self.0.on(event, handler)
    }

    fn off(&self, event: ProviderEvent, handler: HandlerId) {
        self.0.off(event, handler)
    }

    fn update_context(&self, context: FlagContext) {
        self.0.update_context(context)
    }
}

/// Test that many concurrent starters share one provider start.
#[tokio::test]
async fn concurrent_init_is_single_flight() {
    let provider = InMemoryProvider::shared();
    let service = Arc::new(FeatureService::new(provider.clone()));

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.init().await })
        })
        .collect();

    for result in join_all(tasks).await {
        assert!(result.unwrap().is_ok());
    }
    assert_eq!(provider.starts.load(Ordering::SeqCst), 1);
}

/// Test that a failing provider denies every guard and is started only once.
#[tokio::test]
async fn failed_start_denies_all_guards() {
    let provider = InMemoryProvider::failing();
    provider.toggle("admin", true, None);
    let service = Arc::new(FeatureService::new(provider.clone()));

    let guards = [
        FeatureGuard::new(service.clone(), "admin"),
        FeatureGuard::new(service.clone(), "admin"),
    ];
    for guard in &guards {
        assert!(!guard.can_activate().await);
    }

    assert!(matches!(service.init_status(), InitStatus::Failed(_)));
    assert_eq!(provider.starts.load(Ordering::SeqCst), 1);
}

/// Test that a reactive context source keeps the provider up to date.
#[test]
fn reactive_context_is_forwarded_on_every_change() {
    let provider = InMemoryProvider::shared();
    let session = Signal::new(None::<FlagContext>);
    let source = session.clone();
    let factory = context_factory(move || Ok(ContextSource::reactive(source.clone())));

    let service = FeatureService::with_context_factory(provider.clone(), Some(&factory)).unwrap();

    session.set(Some(FlagContext::new().with_user_id("7")));
    session.set(Some(
        FlagContext::new()
            .with_user_id("7")
            .with_property("plan", "pro"),
    ));

    let contexts = provider.contexts();
    assert_eq!(contexts.len(), 3);
    assert!(contexts[0].is_empty());
    assert_eq!(contexts[2].properties.get("plan"), Some(&"pro".to_string()));

    drop(service);
    session.set(None);
    assert_eq!(provider.contexts().len(), 3);
}

/// Test that a stream context source is forwarded until shutdown.
#[tokio::test]
async fn stream_context_is_forwarded_until_shutdown() {
    let provider = InMemoryProvider::shared();
    let (tx, rx) = unbounded_channel::<Option<FlagContext>>();
    let rx = Mutex::new(Some(rx));
    let factory = context_factory(move || {
        let rx = rx
            .lock()
            .take()
            .ok_or_else(|| flagwire_core::Error::Context("factory called twice".into()))?;
        Ok(ContextSource::stream(futures_util::stream::unfold(
            rx,
            |mut rx| async move { rx.recv().await.map(|item| (item, rx)) },
        )))
    });

    let mut forwarded = provider.watch_contexts();
    let service = FeatureService::with_context_factory(provider.clone(), Some(&factory)).unwrap();

    tx.send(Some(FlagContext::new().with_session_id("s1"))).unwrap();
    assert_eq!(
        forwarded.recv().await,
        Some(FlagContext::new().with_session_id("s1"))
    );

    // Shutdown aborts the forwarding task, which drops the stream.
    service.shutdown();
    tx.closed().await;
    assert!(tx.send(Some(FlagContext::new().with_session_id("s2"))).is_err());
    assert_eq!(provider.contexts().len(), 1);
    assert!(forwarded.try_recv().is_err());
}

flagwire_core::feature_set! {
    enum ShopFlags {
        Checkout => "checkout",
        Wishlist => "wishlist",
    }
}

/// Test the typed façade and the free guard function over one service.
#[tokio::test]
async fn typed_flags_and_guard_agree() {
    let provider = InMemoryProvider::shared();
    provider.toggle("wishlist", true, Some(("grid", true)));
    let service = Arc::new(FeatureService::new(provider.clone()));
    let flags = service.typed::<ShopFlags>();

    assert!(!flags.enabled(ShopFlags::Checkout).get());
    assert!(flags.enabled_variant(ShopFlags::Wishlist, "grid").get());
    assert!(can_activate(&service, ShopFlags::Wishlist.key()).await);
    assert!(!can_activate(&service, ShopFlags::Checkout.key()).await);

    provider.toggle("checkout", true, None);
    provider.publish();
    assert!(flags.enabled(ShopFlags::Checkout).get());
}

/// Test that an effect over a flag sees a whole update at once.
#[test]
fn effects_observe_complete_updates() {
    let provider = InMemoryProvider::shared();
    provider.toggle("a", true, None);
    provider.toggle("b", false, None);
    let service = FeatureService::new(provider.clone());

    let a = service.is_enabled("a", None);
    let b = service.is_enabled("b", None);
    let both = Memo::new(move || (a.get(), b.get()));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _effect = Effect::new(move || sink.lock().push(both.get()));

    provider.toggle("a", false, None);
    provider.toggle("b", true, None);
    provider.publish();

    assert_eq!(*seen.lock(), vec![(true, false), (false, true)]);
}

/// Test that batched writes run a dependent effect once.
#[test]
fn batch_defers_effects() {
    let left = Signal::new(1);
    let right = Signal::new(2);
    let runs = Arc::new(AtomicI32::new(0));

    let (l, r, counter) = (left.clone(), right.clone(), runs.clone());
    let _effect = Effect::new(move || {
        let _ = l.get() + r.get();
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    Runtime::batch(|| {
        left.set(10);
        right.set(20);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Test that the disabled directive mirrors the enabled one.
#[test]
fn enabled_and_disabled_directives_are_complementary() {
    let provider = InMemoryProvider::shared();
    let service = Arc::new(FeatureService::new(provider.clone()));
    let log = Arc::new(Mutex::new(Vec::new()));

    let inputs = DirectiveInputs::new("beta");
    let on = FeatureDirective::enabled(
        service.clone(),
        inputs.clone(),
        template("on", &log),
        Arc::new(ViewSlot::new()),
    );
    let off = FeatureDirective::disabled(
        service.clone(),
        inputs,
        template("off", &log),
        Arc::new(ViewSlot::new()),
    );

    assert_eq!(on.state(), RenderState::ShowingNone);
    assert!(off.state().is_primary());

    provider.toggle("beta", true, None);
    provider.publish();

    assert!(on.state().is_primary());
    assert_eq!(off.state(), RenderState::ShowingNone);
}
