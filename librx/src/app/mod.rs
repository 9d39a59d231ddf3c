//! App: root of the runtime and sole entry point for external triggers
//!
//! The App owns the Store, the component tree, and the dispatch pipeline:
//!
//! ```text
//! dispatch(action)
//!   -> preDispatch
//!   -> middlewares (in registration order)
//!   -> Store::write            (stamps sequence id, returns frozen snapshot)
//!   -> main hook               (optional)
//!   -> Node::update            (whole tree, or the action's notification root)
//!   -> postRender              (only if the action is still the latest)
//! ```
//!
//! Errors raised anywhere in the pipeline stop at the App boundary. An
//! error is reported (bus `error` event, then the `print_error` handler or
//! the log) only if its action is still the latest one; errors of
//! superseded actions are discarded.

pub mod builder;
pub mod middleware;

pub use builder::AppBuilder;
pub use middleware::{Middleware, MiddlewareOutcome};

use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::{debug, error, warn};

use self::middleware::same_middleware;
use crate::action::Action;
use crate::bus::{Bus, BusArg, FIRST_RENDER, ERROR, POST_INIT, POST_RENDER, PRE_DISPATCH};
use crate::component::{Child, Children, ComponentInfo, Current, Node};
use crate::error::{Result, RxError};
use crate::state::Snapshot;
use crate::store::{Store, StoreModel};
use crate::sync::{lock, read, write};

/// Event types the App bus accepts
pub const APP_EVENTS: &[&str] = &[POST_INIT, PRE_DISPATCH, POST_RENDER, FIRST_RENDER, ERROR];

/// Components registered under this kind receive `replace_last_state`
/// after every `App::save`
pub const RECOVER_KIND: &str = "recover";

pub type ErrorHandler = Arc<dyn Fn(&RxError) + Send + Sync>;

pub type MainHook<M> =
    Arc<dyn Fn(Snapshot<<M as StoreModel>::State>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

enum Flow {
    Completed,
    Cancelled,
}

struct Applied<S> {
    sequence_id: Option<u64>,
    snapshot: Snapshot<S>,
}

pub struct App<M: StoreModel> {
    handle: AppHandle<M>,
    store: Store<M>,
    state: RwLock<Applied<M::State>>,
    latest: Mutex<Option<u64>>,
    components: RwLock<Children<M>>,
    registry: Mutex<HashMap<String, HashMap<String, Arc<dyn Node<M>>>>>,
    middlewares: Mutex<Vec<Arc<dyn Middleware<M>>>>,
    bus: Bus<AppHandle<M>>,
    main: Option<MainHook<M>>,
    print_error: Option<ErrorHandler>,
    destroyed: AtomicBool,
}

impl<M: StoreModel> App<M> {
    pub fn handle(&self) -> AppHandle<M> {
        self.handle.clone()
    }

    pub fn store(&self) -> &Store<M> {
        &self.store
    }

    pub fn bus(&self) -> &Bus<AppHandle<M>> {
        &self.bus
    }

    /// Last snapshot produced by a write
    pub fn get_state(&self) -> Snapshot<M::State> {
        read(&self.state).snapshot.clone()
    }

    /// Sequence id of the latest dispatched action
    pub fn latest_sequence_id(&self) -> Option<u64> {
        *lock(&self.latest)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Run the full dispatch pipeline for `action`, or a plain re-render of
    /// the tree when `None`.
    ///
    /// Never fails at the call site; see the module docs for how errors are
    /// surfaced.
    pub async fn dispatch(&self, mut action: Option<Action<M::Action>>) {
        if self.is_destroyed() {
            return;
        }

        match self.run_dispatch(&mut action).await {
            Ok(Flow::Cancelled) => {
                debug!("dispatch cancelled by middleware");
            }
            Ok(Flow::Completed) => {
                if !self.is_destroyed() && self.is_current(action.as_ref()) {
                    self.bus.emit(POST_RENDER);
                }
            }
            Err(err) => self.report(err, action.as_ref()),
        }
    }

    /// Parse a wire-level `{type, ...payload}` action and dispatch it.
    ///
    /// # Errors
    ///
    /// Returns an error if the action is malformed or its type undeclared.
    pub async fn dispatch_json(&self, value: Value) -> Result<()> {
        let action = Action::from_json(value)?;
        self.dispatch(Some(action)).await;
        Ok(())
    }

    async fn run_dispatch(&self, action: &mut Option<Action<M::Action>>) -> Result<Flow> {
        self.bus.emit(PRE_DISPATCH);

        if let Flow::Cancelled = self.run_middlewares(action.as_ref()).await? {
            return Ok(Flow::Cancelled);
        }

        if let Some(action) = action.as_mut() {
            let snapshot = self.store.write(action).await?;
            self.apply_snapshot(action.sequence_id, snapshot);
            self.advance_latest(action.sequence_id);
        }

        if let Some(main) = &self.main {
            main(self.get_state()).await?;
        }

        let current = Current {
            action: action.clone(),
            app_state: self.get_state(),
        };
        let targets = match action.as_ref().and_then(|a| a.notification_root.as_ref()) {
            Some(paths) => self.resolve_roots(paths)?,
            None => read(&self.components).nodes(),
        };

        join_all(targets.iter().map(|node| node.update(&current)))
            .await
            .into_iter()
            .collect::<Result<Vec<()>>>()?;
        Ok(Flow::Completed)
    }

    async fn run_middlewares(&self, action: Option<&Action<M::Action>>) -> Result<Flow> {
        let chain = lock(&self.middlewares).clone();
        for middleware in chain {
            match middleware.handle(action).await {
                MiddlewareOutcome::Continue => {}
                MiddlewareOutcome::Cancel => return Ok(Flow::Cancelled),
                MiddlewareOutcome::Deactivate => {
                    lock(&self.middlewares).retain(|m| !same_middleware(m, &middleware));
                }
                MiddlewareOutcome::Error(err) => return Err(err),
            }
        }
        Ok(Flow::Completed)
    }

    fn resolve_roots(&self, paths: &[String]) -> Result<Vec<Arc<dyn Node<M>>>> {
        let components = read(&self.components).clone();
        let mut nodes = Vec::new();
        for path in paths {
            let child = components
                .lookup(path)
                .ok_or_else(|| RxError::InvalidAction(format!("unknown notification root '{}'", path)))?;
            nodes.extend(child.nodes());
        }
        Ok(nodes)
    }

    /// Keep the newest snapshot when overlapping writes resolve out of order.
    fn apply_snapshot(&self, sequence_id: Option<u64>, snapshot: Snapshot<M::State>) {
        let mut applied = write(&self.state);
        if let (Some(new), Some(current)) = (sequence_id, applied.sequence_id) {
            if new < current {
                return;
            }
        }
        applied.sequence_id = sequence_id.or(applied.sequence_id);
        applied.snapshot = snapshot;
    }

    fn advance_latest(&self, sequence_id: Option<u64>) {
        let mut latest = lock(&self.latest);
        if sequence_id > *latest {
            *latest = sequence_id;
        }
    }

    /// Whether no newer action has been accepted since `action`. A write
    /// that failed still carries its id and counts as current.
    fn is_current(&self, action: Option<&Action<M::Action>>) -> bool {
        match (action.and_then(|a| a.sequence_id), self.latest_sequence_id()) {
            (Some(id), Some(latest)) => id >= latest,
            _ => true,
        }
    }

    fn report(&self, err: RxError, action: Option<&Action<M::Action>>) {
        if self.is_destroyed() {
            return;
        }
        if err.is_stale() {
            debug!(error = %err, "dropping stale result");
            return;
        }
        if !self.is_current(action) {
            warn!(error = %err, "discarding error from superseded action");
            return;
        }

        let err = Arc::new(err);
        self.bus.emit_error(ERROR, Arc::clone(&err));
        match &self.print_error {
            Some(print_error) => print_error(err.as_ref()),
            None => error!(error = %err, "dispatch failed"),
        }
    }

    /// Write through the Store without notifying the component tree.
    ///
    /// Only components registered under [`RECOVER_KIND`] hear about it,
    /// through `replace_last_state`. Returns the sequence id the write was
    /// stamped with.
    pub async fn save(&self, action: impl Into<Action<M::Action>>) -> Result<Option<u64>> {
        if self.is_destroyed() {
            return Err(RxError::Destroyed);
        }
        let mut action = action.into();
        let snapshot = self.store.write(&mut action).await?;
        self.apply_snapshot(action.sequence_id, snapshot.clone());

        for node in self.components_by_type(RECOVER_KIND) {
            node.replace_last_state(&snapshot).await;
        }
        Ok(action.sequence_id)
    }

    /// Append a middleware to the chain.
    ///
    /// # Errors
    ///
    /// Returns `RxError::DuplicateMiddleware` if this exact middleware is
    /// already registered.
    pub fn middle(&self, middleware: Arc<dyn Middleware<M>>) -> Result<()> {
        let mut chain = lock(&self.middlewares);
        if chain.iter().any(|m| same_middleware(m, &middleware)) {
            return Err(RxError::DuplicateMiddleware);
        }
        chain.push(middleware);
        Ok(())
    }

    pub fn middleware_count(&self) -> usize {
        lock(&self.middlewares).len()
    }

    /// Listen on the App bus.
    pub fn on<F>(&self, key: &str, callback: F) -> Result<()>
    where
        F: Fn(BusArg<AppHandle<M>>) + Send + Sync + 'static,
    {
        self.bus.on(key, callback)
    }

    /// Resolve a dot-separated path in the component tree; an empty path
    /// returns every top-level entry.
    pub fn get_components(&self, path: &str) -> Option<Child<M>> {
        read(&self.components).lookup(path)
    }

    pub(crate) fn attach(&self, path: &str, node: Arc<dyn Node<M>>) {
        write(&self.components).insert_path(path, node);
    }

    pub fn register(&self, node: Arc<dyn Node<M>>) {
        let info = node.info().clone();
        let mut registry = lock(&self.registry);
        let by_id = registry.entry(info.kind.clone()).or_default();
        if by_id.insert(info.id.clone(), node).is_some() {
            warn!(kind = %info.kind, id = %info.id, "replaced a registered component with the same id");
        }
    }

    pub fn deregister(&self, info: &ComponentInfo) {
        let mut registry = lock(&self.registry);
        if let Some(by_id) = registry.get_mut(&info.kind) {
            by_id.remove(&info.id);
            if by_id.is_empty() {
                registry.remove(&info.kind);
            }
        }
    }

    pub fn components_by_type(&self, kind: &str) -> Vec<Arc<dyn Node<M>>> {
        lock(&self.registry)
            .get(kind)
            .map(|by_id| by_id.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Abort pending work across the whole tree.
    pub fn trigger_abort(&self, reason: Option<&str>) {
        let reason = reason.unwrap_or(crate::abort::DEFAULT_ABORT_REASON);
        for node in read(&self.components).nodes() {
            node.trigger_abort(reason);
        }
    }

    /// Tear down the tree and the bus. Safe to call more than once.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let components = std::mem::take(&mut *write(&self.components));
        for node in components.nodes() {
            node.destroy();
        }
        lock(&self.registry).clear();
        lock(&self.middlewares).clear();
        self.bus.destroy();
        debug!("app destroyed");
    }
}

/// Non-owning handle to an App, held by components and bus listeners
pub struct AppHandle<M: StoreModel> {
    app: Weak<App<M>>,
}

impl<M: StoreModel> Clone for AppHandle<M> {
    fn clone(&self) -> Self {
        Self {
            app: Weak::clone(&self.app),
        }
    }
}

impl<M: StoreModel> AppHandle<M> {
    pub fn upgrade(&self) -> Option<Arc<App<M>>> {
        self.app.upgrade()
    }

    /// Current app state, unless the App is gone
    pub fn get_state(&self) -> Option<Snapshot<M::State>> {
        self.upgrade().map(|app| app.get_state())
    }

    /// Dispatch through the App; a no-op once the App is gone.
    pub async fn dispatch(&self, action: Option<Action<M::Action>>) {
        if let Some(app) = self.upgrade() {
            app.dispatch(action).await;
        }
    }

    pub async fn save(&self, action: impl Into<Action<M::Action>>) -> Result<Option<u64>> {
        match self.upgrade() {
            Some(app) => app.save(action).await,
            None => Err(RxError::Destroyed),
        }
    }

    pub(crate) fn register(&self, node: Arc<dyn Node<M>>) {
        if let Some(app) = self.upgrade() {
            app.register(node);
        }
    }

    pub(crate) fn deregister(&self, info: &ComponentInfo) {
        if let Some(app) = self.upgrade() {
            app.deregister(info);
        }
    }
}
