//! Per-node runtime state shared with the component implementation

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tracing::debug;

use super::{Children, ComponentInfo, ComponentOpts, Node};
use crate::abort::{AbortController, AbortSignal};
use crate::app::AppHandle;
use crate::bus::Bus;
use crate::error::{Result, RxError};
use crate::store::StoreModel;
use crate::sync::{lock, read, write};

pub(crate) const SUPERSEDED: &str = "superseded";

/// Outcome of [`Context::detect_stale`] when the wrapped future completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness<T> {
    /// No newer action arrived while the future ran
    Fresh(T),
    /// The future finished, but a newer action had already been accepted
    Stale(T),
}

impl<T> Freshness<T> {
    pub fn is_stale(&self) -> bool {
        matches!(self, Freshness::Stale(_))
    }

    /// The result, regardless of freshness
    pub fn into_inner(self) -> T {
        match self {
            Freshness::Fresh(value) | Freshness::Stale(value) => value,
        }
    }

    /// The result only if it is still current
    pub fn fresh(self) -> Option<T> {
        match self {
            Freshness::Fresh(value) => Some(value),
            Freshness::Stale(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaleOpts {
    /// Aborted as soon as the call is superseded, e.g. to cancel a fetch
    pub abort: Option<AbortController>,
}

pub struct Context<M: StoreModel, T> {
    info: ComponentInfo,
    app: AppHandle<M>,
    bus: Bus<ComponentInfo>,
    state: RwLock<Option<T>>,
    latest: watch::Sender<Option<u64>>,
    own_abort: Mutex<Option<AbortController>>,
    registered: Mutex<Vec<AbortController>>,
    children: RwLock<Children<M>>,
    destroyed: AtomicBool,
}

impl<M: StoreModel, T: Clone + PartialEq + Send + Sync> Context<M, T> {
    pub(crate) fn new(info: ComponentInfo, app: AppHandle<M>, bus: Bus<ComponentInfo>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            info,
            app,
            bus,
            state: RwLock::new(None),
            latest,
            own_abort: Mutex::new(None),
            registered: Mutex::new(Vec::new()),
            children: RwLock::new(Children::new()),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn info(&self) -> &ComponentInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn app(&self) -> &AppHandle<M> {
        &self.app
    }

    pub fn bus(&self) -> &Bus<ComponentInfo> {
        &self.bus
    }

    /// Last accepted slice
    pub fn state(&self) -> Option<T> {
        read(&self.state).clone()
    }

    /// Whether a slice is stored and `same` holds for it
    pub(crate) fn state_matches(&self, same: impl FnOnce(&T) -> bool) -> bool {
        read(&self.state).as_ref().is_some_and(same)
    }

    pub(crate) fn set_state(&self, next: T) {
        *write(&self.state) = Some(next);
    }

    /// Sequence id of the latest action this component accepted
    pub fn latest_sequence_id(&self) -> Option<u64> {
        *self.latest.borrow()
    }

    pub(crate) fn record_latest(&self, sequence_id: u64) {
        self.latest.send_replace(Some(sequence_id));
    }

    /// Whether an action with `sequence_id` has been overtaken by a newer
    /// accepted one
    pub fn is_superseded(&self, sequence_id: Option<u64>) -> bool {
        match (sequence_id, self.latest_sequence_id()) {
            (Some(id), Some(latest)) => id < latest,
            _ => false,
        }
    }

    /// Signal of this component's own pending operation, created on first use.
    pub fn abort_signal(&self) -> AbortSignal {
        lock(&self.own_abort)
            .get_or_insert_with(AbortController::new)
            .signal()
    }

    /// Abort the outstanding own operation, if any; the next
    /// `abort_signal` call starts a fresh controller.
    pub(crate) fn abort_pending(&self, reason: &str) {
        if let Some(ctrl) = lock(&self.own_abort).take() {
            debug!(component = %self.info.id, reason, "aborting pending operation");
            ctrl.abort(reason);
        }
    }

    /// Forget the own controller after a completed operation.
    pub(crate) fn release_abort(&self) {
        lock(&self.own_abort).take();
    }

    /// Abort own and registered operations here and in every descendant.
    pub fn trigger_abort(&self, reason: &str) {
        self.abort_pending(reason);
        for ctrl in lock(&self.registered).drain(..) {
            ctrl.abort(reason);
        }
        for child in self.children().nodes() {
            child.trigger_abort(reason);
        }
    }

    /// Run `fut`, watching for a newer action to be accepted meanwhile.
    ///
    /// - If a newer action is accepted before `fut` completes, `fut` is
    ///   dropped, `opts.abort` is aborted, and `RxError::Superseded` is
    ///   returned.
    /// - If `fut` completes but the latest sequence id moved while it ran,
    ///   the result comes back as [`Freshness::Stale`]. This includes a
    ///   result that is ready at the moment the newer action lands.
    /// - Otherwise it comes back as [`Freshness::Fresh`].
    pub async fn detect_stale<F: Future>(&self, fut: F, opts: StaleOpts) -> Result<Freshness<F::Output>> {
        let mut latest = self.latest.subscribe();
        let started = *latest.borrow_and_update();

        let _registration = opts
            .abort
            .as_ref()
            .map(|ctrl| Registration::new(&self.registered, ctrl.clone()));

        // A ready result wins over a concurrent supersede
        tokio::select! {
            biased;
            output = fut => {
                if self.latest_sequence_id() == started {
                    Ok(Freshness::Fresh(output))
                } else {
                    Ok(Freshness::Stale(output))
                }
            }
            newer = changed_from(&mut latest, started) => {
                if let Some(ctrl) = &opts.abort {
                    ctrl.abort(SUPERSEDED);
                }
                Err(RxError::Superseded { latest: newer })
            }
        }
    }

    pub fn children(&self) -> Children<M> {
        read(&self.children).clone()
    }

    /// Attach a child at `name`, which may be a dot-separated group path.
    pub fn attach(&self, name: &str, node: Arc<dyn Node<M>>) {
        write(&self.children).insert_path(name, node);
    }

    /// Options for constructing a child that will sit at `name`
    pub fn child_opts(&self, name: &str) -> ComponentOpts<M> {
        ComponentOpts::new()
            .app(self.app.clone())
            .path(format!("{}.{}", self.info.path, name))
    }

    pub(crate) fn take_children(&self) -> Children<M> {
        std::mem::take(&mut *write(&self.children))
    }

    pub(crate) fn clear_state(&self) {
        write(&self.state).take();
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Mark destroyed; returns `false` if it already was.
    pub(crate) fn mark_destroyed(&self) -> bool {
        !self.destroyed.swap(true, Ordering::SeqCst)
    }
}

/// A caller's controller, reachable by `trigger_abort` until dropped. A
/// cancelled `detect_stale` call leaves nothing behind.
struct Registration<'a> {
    registered: &'a Mutex<Vec<AbortController>>,
    ctrl: AbortController,
}

impl<'a> Registration<'a> {
    fn new(registered: &'a Mutex<Vec<AbortController>>, ctrl: AbortController) -> Self {
        lock(registered).push(ctrl.clone());
        Self { registered, ctrl }
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        lock(self.registered).retain(|registered| !registered.same(&self.ctrl));
    }
}

/// Resolves with the new id once the watched sequence id differs from
/// `started`. Pends forever if the sender is gone.
async fn changed_from(latest: &mut watch::Receiver<Option<u64>>, started: Option<u64>) -> u64 {
    let newer = match latest.wait_for(|id| *id != started).await {
        Ok(id) => *id,
        Err(_) => None,
    };
    match newer {
        Some(id) => id,
        None => std::future::pending().await,
    }
}
