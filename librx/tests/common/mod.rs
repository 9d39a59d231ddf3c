//! Shared fixtures: a small dashboard store and a few recording components

#![allow(dead_code)]

use async_trait::async_trait;
use librx::component::{ComponentNode, Context};
use librx::{
    AbortController, Action, ActionKind, Component, Freshness, RxError, Snapshot, StaleOpts, StoreModel,
};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub app_wait: u64,
    pub part_wait: u64,
    pub filter: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashAction {
    SetWait { wait: u64 },
    SetFilter { filter: String },
    AddItem { text: String },
    Fail { message: String },
}

impl ActionKind for DashAction {
    const TYPES: &'static [&'static str] = &["set_wait", "set_filter", "add_item", "fail"];

    fn kind(&self) -> &'static str {
        match self {
            DashAction::SetWait { .. } => "set_wait",
            DashAction::SetFilter { .. } => "set_filter",
            DashAction::AddItem { .. } => "add_item",
            DashAction::Fail { .. } => "fail",
        }
    }
}

pub struct DashboardModel;

#[async_trait]
impl StoreModel for DashboardModel {
    type State = Dashboard;
    type Action = DashAction;

    fn name(&self) -> &str {
        "dashboard"
    }

    fn default_state(&self) -> Dashboard {
        Dashboard {
            app_wait: 3,
            part_wait: 0,
            filter: "all".to_string(),
            items: vec![],
        }
    }

    async fn apply(&self, state: &mut Dashboard, action: &Action<DashAction>) -> librx::Result<()> {
        match &action.payload {
            DashAction::SetWait { wait } => state.part_wait = *wait,
            DashAction::SetFilter { filter } => state.filter = filter.clone(),
            DashAction::AddItem { text } => state.items.push(text.clone()),
            DashAction::Fail { message } => return Err(RxError::Handler(message.clone())),
        }
        Ok(())
    }
}

pub fn action(payload: DashAction) -> Option<Action<DashAction>> {
    Some(Action::new(payload))
}

pub fn set_filter(filter: &str) -> Option<Action<DashAction>> {
    action(DashAction::SetFilter {
        filter: filter.to_string(),
    })
}

pub fn add_item(text: &str) -> Option<Action<DashAction>> {
    action(DashAction::AddItem { text: text.to_string() })
}

/// Let spawned bus deliveries run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub type FilterNode = ComponentNode<DashboardModel, Recorder<String>>;

/// Records every slice it renders
pub struct Recorder<T> {
    kind: &'static str,
    derive: fn(&Dashboard) -> Option<T>,
    only: Option<&'static str>,
    fail_on: Option<T>,
    error_target: Option<&'static str>,
    handle_errors: bool,
    pub renders: Arc<Mutex<Vec<T>>>,
    pub handled: Arc<Mutex<Vec<String>>>,
    pub destroyed: Arc<AtomicUsize>,
}

impl<T> Recorder<T> {
    pub fn new(kind: &'static str, derive: fn(&Dashboard) -> Option<T>) -> Self {
        Self {
            kind,
            derive,
            only: None,
            fail_on: None,
            error_target: None,
            handle_errors: false,
            renders: Arc::new(Mutex::new(Vec::new())),
            handled: Arc::new(Mutex::new(Vec::new())),
            destroyed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// React only to actions of this type
    pub fn only(mut self, kind: &'static str) -> Self {
        self.only = Some(kind);
        self
    }

    pub fn fail_on(mut self, value: T) -> Self {
        self.fail_on = Some(value);
        self
    }

    pub fn error_target(mut self, target: &'static str) -> Self {
        self.error_target = Some(target);
        self
    }

    /// Keep render errors instead of passing them up
    pub fn handle_errors(mut self) -> Self {
        self.handle_errors = true;
        self
    }
}

impl<T: Clone> Recorder<T> {
    pub fn renders(&self) -> Arc<Mutex<Vec<T>>> {
        Arc::clone(&self.renders)
    }
}

pub fn filter_recorder() -> Recorder<String> {
    Recorder::new("filter", |s| Some(s.filter.clone()))
}

pub fn items_recorder() -> Recorder<Vec<String>> {
    Recorder::new("items", |s| Some(s.items.clone()))
}

#[async_trait]
impl<T> Component<DashboardModel> for Recorder<T>
where
    T: Clone + PartialEq + Debug + Send + Sync + 'static,
{
    type State = T;

    fn kind(&self) -> &str {
        self.kind
    }

    fn get_state(&self, app_state: &Snapshot<Dashboard>) -> Option<T> {
        (self.derive)(app_state)
    }

    fn reacts_to(&self, action: &Action<DashAction>) -> bool {
        self.only.map_or(true, |kind| action.kind() == kind)
    }

    async fn main(&self, _cx: &Context<DashboardModel, T>, state: &T) -> librx::Result<()> {
        if self.fail_on.as_ref() == Some(state) {
            return Err(RxError::Handler(format!("cannot render {:?}", state)));
        }
        self.renders.lock().unwrap().push(state.clone());
        Ok(())
    }

    fn print_error(&self, err: &RxError) -> bool {
        if self.handle_errors {
            self.handled.lock().unwrap().push(err.to_string());
        }
        self.handle_errors
    }

    fn error_target(&self) -> Option<String> {
        self.error_target.map(str::to_string)
    }

    fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct WaitStats {
    pub num_stale: AtomicUsize,
    pub curr_wait: Mutex<Option<u64>>,
    pub signals: Mutex<Vec<librx::AbortSignal>>,
}

/// Sleeps `part_wait` milliseconds per render, tracking superseded runs
pub struct Waiter {
    pub stats: Arc<WaitStats>,
}

#[async_trait]
impl Component<DashboardModel> for Waiter {
    type State = u64;

    fn kind(&self) -> &str {
        "waiter"
    }

    fn get_state(&self, app_state: &Snapshot<Dashboard>) -> Option<u64> {
        Some(app_state.part_wait)
    }

    async fn main(&self, cx: &Context<DashboardModel, u64>, wait: &u64) -> librx::Result<()> {
        let ctrl = AbortController::new();
        self.stats.signals.lock().unwrap().push(ctrl.signal());

        let wait = *wait;
        let outcome = cx
            .detect_stale(
                async move {
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                    wait
                },
                StaleOpts { abort: Some(ctrl) },
            )
            .await;

        match outcome {
            Ok(Freshness::Fresh(wait)) => {
                *self.stats.curr_wait.lock().unwrap() = Some(wait);
                Ok(())
            }
            Ok(Freshness::Stale(_)) => {
                self.stats.num_stale.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => {
                self.stats.num_stale.fetch_add(1, Ordering::SeqCst);
                Err(err)
            }
        }
    }
}

/// Blocks its first non-zero render on a gate, reporting how it resolved
pub struct Gated {
    pub gate: Arc<Notify>,
    pub outcomes: Arc<Mutex<Vec<Freshness<u64>>>>,
}

#[async_trait]
impl Component<DashboardModel> for Gated {
    type State = u64;

    fn kind(&self) -> &str {
        "gated"
    }

    fn get_state(&self, app_state: &Snapshot<Dashboard>) -> Option<u64> {
        Some(app_state.part_wait)
    }

    async fn main(&self, cx: &Context<DashboardModel, u64>, wait: &u64) -> librx::Result<()> {
        let wait = *wait;
        let gate = Arc::clone(&self.gate);
        let outcome = cx
            .detect_stale(
                async move {
                    if wait == 1 {
                        gate.notified().await;
                    }
                    wait
                },
                StaleOpts::default(),
            )
            .await?;
        self.outcomes.lock().unwrap().push(outcome);
        Ok(())
    }
}

/// Mounts a filter recorder below itself as `child`
pub struct Parent {
    pub child_renders: Arc<Mutex<Vec<String>>>,
    pub child_destroyed: Arc<AtomicUsize>,
}

impl Parent {
    pub fn new() -> Self {
        Self {
            child_renders: Arc::new(Mutex::new(Vec::new())),
            child_destroyed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Component<DashboardModel> for Parent {
    type State = usize;

    fn kind(&self) -> &str {
        "parent"
    }

    fn get_state(&self, app_state: &Snapshot<Dashboard>) -> Option<usize> {
        Some(app_state.items.len())
    }

    async fn init(&self, cx: &Context<DashboardModel, usize>) -> librx::Result<()> {
        let mut child = filter_recorder();
        child.renders = Arc::clone(&self.child_renders);
        child.destroyed = Arc::clone(&self.child_destroyed);
        let node = ComponentNode::init(child, cx.child_opts("child")).await?;
        cx.attach("child", node);
        Ok(())
    }
}

/// Counts out-of-band saves
pub struct Recover {
    pub replaced: Arc<Mutex<Vec<Dashboard>>>,
}

#[async_trait]
impl Component<DashboardModel> for Recover {
    type State = ();

    fn kind(&self) -> &str {
        librx::app::RECOVER_KIND
    }

    fn get_state(&self, _app_state: &Snapshot<Dashboard>) -> Option<()> {
        None
    }

    async fn replace_last_state(&self, state: &Snapshot<Dashboard>) {
        self.replaced.lock().unwrap().push((**state).clone());
    }
}
