//! Assembles an App: store, component tree, middlewares and listeners

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::info;

use super::{Applied, App, AppHandle, ErrorHandler, MainHook, Middleware, APP_EVENTS};
use crate::bus::{Bus, BusArg, Callback, ListenOpts, POST_INIT};
use crate::component::{Children, Component, ComponentNode, ComponentOpts, Node};
use crate::config::Config;
use crate::error::{Result, RxError};
use crate::state::Snapshot;
use crate::store::{SequenceClock, Store, StoreModel, StoreOpts};

type Factory<M> =
    Box<dyn FnOnce(ComponentOpts<M>) -> BoxFuture<'static, Result<Arc<dyn Node<M>>>> + Send>;

/// # Example
///
/// ```ignore
/// let app = AppBuilder::new(TodoModel)
///     .state(json!({ "filter": "all" }))
///     .component("list", TodoList::default())
///     .component("footer.count", Counter)
///     .on("postRender.log", |_| tracing::info!("rendered"))
///     .build()
///     .await?;
///
/// app.dispatch(Some(Action::new(TodoAction::Add { text: "milk".into() }))).await;
/// ```
pub struct AppBuilder<M: StoreModel> {
    model: M,
    store_opts: StoreOpts,
    clock: SequenceClock,
    bus_wait: Duration,
    factories: Vec<(String, Factory<M>)>,
    middlewares: Vec<Arc<dyn Middleware<M>>>,
    listeners: Vec<(String, Callback<AppHandle<M>>)>,
    main: Option<MainHook<M>>,
    print_error: Option<ErrorHandler>,
}

impl<M: StoreModel> AppBuilder<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            store_opts: StoreOpts::default(),
            clock: SequenceClock::new(),
            bus_wait: Duration::ZERO,
            factories: Vec::new(),
            middlewares: Vec::new(),
            listeners: Vec::new(),
            main: None,
            print_error: None,
        }
    }

    /// Partial state merged over the model's defaults
    pub fn state(mut self, overrides: Value) -> Self {
        self.store_opts.state = Some(overrides);
        self
    }

    pub fn debounce(mut self, interval: Duration) -> Self {
        self.store_opts.debounce_interval = Some(interval);
        self
    }

    /// Share sequence ids with other stores
    pub fn clock(mut self, clock: SequenceClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: &Config) -> Self {
        if let Some(interval) = config.store.debounce_interval() {
            self.store_opts.debounce_interval = Some(interval);
        }
        self.bus_wait = config.bus.default_wait();
        self
    }

    /// Mount a component at `path`; dots nest it inside named groups.
    pub fn component<C: Component<M>>(self, path: impl Into<String>, component: C) -> Self {
        self.component_with(path, move |opts| async move {
            let node = ComponentNode::init(component, opts).await?;
            Ok(node as Arc<dyn Node<M>>)
        })
    }

    /// Mount whatever `factory` builds from the options the App hands it.
    pub fn component_with<F, Fut>(mut self, path: impl Into<String>, factory: F) -> Self
    where
        F: FnOnce(ComponentOpts<M>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Arc<dyn Node<M>>>> + Send + 'static,
    {
        let factory: Factory<M> = Box::new(move |opts| factory(opts).boxed());
        self.factories.push((path.into(), factory));
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware<M>>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn on<F>(mut self, key: impl Into<String>, callback: F) -> Self
    where
        F: Fn(BusArg<AppHandle<M>>) + Send + Sync + 'static,
    {
        let callback: Callback<AppHandle<M>> = Arc::new(callback);
        self.listeners.push((key.into(), callback));
        self
    }

    /// Hook run after each write, before the tree is notified
    pub fn main<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Snapshot<M::State>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let hook: MainHook<M> = Arc::new(move |state| hook(state).boxed());
        self.main = Some(hook);
        self
    }

    /// Replace the default error log for reported dispatch errors
    pub fn print_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&RxError) + Send + Sync + 'static,
    {
        self.print_error = Some(Arc::new(handler));
        self
    }

    /// Create the store, initialize the tree, and run the initial render.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The model declares no actions, or declares one twice
    /// - The initial state override doesn't fit the model's state
    /// - A listener or middleware is rejected
    /// - A component fails to initialize
    pub async fn build(self) -> Result<Arc<App<M>>> {
        let Self {
            model,
            store_opts,
            clock,
            bus_wait,
            factories,
            middlewares,
            listeners,
            main,
            print_error,
        } = self;

        let store = Store::new(model, clock, store_opts)?;
        let snapshot = store.copy_state().await;

        let app = Arc::new_cyclic(|weak| {
            let handle = AppHandle { app: weak.clone() };
            App {
                bus: Bus::new("app", APP_EVENTS, handle.clone()).with_default_wait(bus_wait),
                handle,
                store,
                state: RwLock::new(Applied {
                    sequence_id: None,
                    snapshot,
                }),
                latest: Mutex::new(None),
                components: RwLock::new(Children::new()),
                registry: Mutex::default(),
                middlewares: Mutex::default(),
                main,
                print_error,
                destroyed: AtomicBool::new(false),
            }
        });

        if let Err(err) = wire(&app, listeners, middlewares, factories).await {
            app.destroy();
            return Err(err);
        }

        app.dispatch(None).await;
        info!(store = %app.store().model().name(), "app initialized");
        app.bus().emit(POST_INIT);
        Ok(app)
    }
}

async fn wire<M: StoreModel>(
    app: &Arc<App<M>>,
    listeners: Vec<(String, Callback<AppHandle<M>>)>,
    middlewares: Vec<Arc<dyn Middleware<M>>>,
    factories: Vec<(String, Factory<M>)>,
) -> Result<()> {
    for (key, callback) in listeners {
        app.bus().register(&key, Some(callback), ListenOpts::default())?;
    }
    for middleware in middlewares {
        app.middle(middleware)?;
    }
    for (path, factory) in factories {
        let opts = ComponentOpts::new().app(app.handle()).path(path.clone());
        let node = factory(opts).await?;
        app.attach(&path, node);
    }
    Ok(())
}
