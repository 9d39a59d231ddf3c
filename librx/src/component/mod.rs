//! Components: nodes of the render tree
//!
//! A [`Component`] turns application state into its own slice of state and
//! renders from it. The runtime wraps each implementation in a
//! [`ComponentNode`], which keeps the bookkeeping the contract requires:
//! the last accepted slice, the latest action sequence id it acted on, its
//! abort tokens, its bus, and its children.
//!
//! # Lifecycle
//!
//! `constructed -> initializing -> idle/updating -> destroyed`
//!
//! [`ComponentNode::init`] constructs the node, registers it with the App,
//! runs `pre_api_freeze` and then `init`. From then on the parent drives it
//! with [`Node::update`] until [`Node::destroy`], which is terminal and
//! idempotent.
//!
//! # Optional capabilities
//!
//! Only `kind` and `get_state` are required. Every other hook has a no-op
//! default, so implementing one is how a component opts in.

pub mod children;
pub mod context;
pub mod node;

pub use children::{Child, Children};
pub use context::{Context, Freshness, StaleOpts};
pub use node::ComponentNode;

use async_trait::async_trait;
use serde::Serialize;
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use crate::action::Action;
use crate::app::AppHandle;
use crate::bus::{BusArg, Callback};
use crate::error::{Result, RxError};
use crate::state::Snapshot;
use crate::store::StoreModel;

/// How `main` relates to the node's stored slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MainArg {
    /// Store the new slice before `main` runs; `cx.state()` is the new slice
    #[default]
    Assign,
    /// Run `main` first; `cx.state()` still holds the previous slice, and
    /// the new one is stored once `main` succeeds
    State,
}

#[async_trait]
pub trait Component<M: StoreModel>: Send + Sync + 'static {
    /// Slice of application state this component renders from
    type State: Clone + PartialEq + Debug + Send + Sync + 'static;

    const MAIN_ARG: MainArg = MainArg::Assign;

    /// Component type, used for registration and error reports
    fn kind(&self) -> &str;

    /// Derive this component's slice; `None` declines the notification.
    fn get_state(&self, app_state: &Snapshot<M::State>) -> Option<Self::State>;

    /// Whether `next` renders the same as `previous`; a match skips `main`.
    ///
    /// JSON-shaped slices should compare with [`crate::state::deep_equal`].
    fn same_state(&self, previous: &Self::State, next: &Self::State) -> bool {
        previous == next
    }

    /// Whether `action` concerns this component at all
    fn reacts_to(&self, _action: &Action<M::Action>) -> bool {
        true
    }

    /// Extra bus event types beyond the lifecycle ones
    fn event_types(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called once, after registration and before `init`.
    fn pre_api_freeze(&self, _cx: &Context<M, Self::State>) {}

    /// Called once; may read the initial app state and attach children.
    async fn init(&self, _cx: &Context<M, Self::State>) -> Result<()> {
        Ok(())
    }

    /// One rendering step for an accepted slice
    async fn main(&self, _cx: &Context<M, Self::State>, _state: &Self::State) -> Result<()> {
        Ok(())
    }

    /// Out-of-band notification after `App::save`, for components
    /// registered under the `recover` kind.
    async fn replace_last_state(&self, _state: &Snapshot<M::State>) {}

    /// Handle a render error; return `true` if it was dealt with.
    fn print_error(&self, _err: &RxError) -> bool {
        false
    }

    /// Where the embedding application shows this component's errors
    fn error_target(&self) -> Option<String> {
        None
    }

    /// Release resources held by the implementation. Runs once.
    fn destroy(&self) {}
}

/// Identity of a node in the tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ComponentInfo {
    pub kind: String,
    pub id: String,
    /// Dot-separated position below the App
    pub path: String,
}

/// What a notification carries down the tree
pub struct Current<M: StoreModel> {
    pub action: Option<Action<M::Action>>,
    pub app_state: Snapshot<M::State>,
}

impl<M: StoreModel> Current<M> {
    pub fn sequence_id(&self) -> Option<u64> {
        self.action.as_ref().and_then(|action| action.sequence_id)
    }
}

impl<M: StoreModel> Clone for Current<M> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            app_state: self.app_state.clone(),
        }
    }
}

/// Object-safe face of a component node, as held by parents and the App
#[async_trait]
pub trait Node<M: StoreModel>: Send + Sync {
    fn info(&self) -> &ComponentInfo;

    /// Derive, conditionally render, then notify children.
    async fn update(&self, current: &Current<M>) -> Result<()>;

    fn children(&self) -> Children<M>;

    /// Listen on this node's bus.
    fn on(&self, key: &str, callback: Callback<ComponentInfo>) -> Result<()>;

    /// Abort this node's pending work and that of every descendant.
    fn trigger_abort(&self, reason: &str);

    async fn replace_last_state(&self, state: &Snapshot<M::State>);

    fn destroy(&self);

    fn is_destroyed(&self) -> bool;

    /// Downcast target for reaching the concrete [`ComponentNode`]
    fn as_any(&self) -> &dyn Any;
}

/// Construction options handed to a component node
pub struct ComponentOpts<M: StoreModel> {
    pub app: Option<AppHandle<M>>,
    /// Defaults to the path
    pub id: Option<String>,
    pub path: String,
    pub listeners: Vec<(String, Callback<ComponentInfo>)>,
}

impl<M: StoreModel> Default for ComponentOpts<M> {
    fn default() -> Self {
        Self {
            app: None,
            id: None,
            path: String::new(),
            listeners: Vec::new(),
        }
    }
}

impl<M: StoreModel> ComponentOpts<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app(mut self, app: AppHandle<M>) -> Self {
        self.app = Some(app);
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Listener to register on the node's bus as soon as it exists
    pub fn on<F>(mut self, key: impl Into<String>, callback: F) -> Self
    where
        F: Fn(BusArg<ComponentInfo>) + Send + Sync + 'static,
    {
        let callback: Callback<ComponentInfo> = Arc::new(callback);
        self.listeners.push((key.into(), callback));
        self
    }
}
