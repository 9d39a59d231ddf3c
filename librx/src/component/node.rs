//! Runtime wrapper around a component implementation

use async_trait::async_trait;
use futures::future::join_all;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

use super::context::SUPERSEDED;
use super::{Children, Component, ComponentInfo, ComponentOpts, Context, Current, MainArg, Node};
use crate::bus::{Bus, Callback, FIRST_RENDER, POST_INIT, POST_RENDER};
use crate::error::{Result, RxError};
use crate::state::Snapshot;
use crate::store::StoreModel;

/// Lifecycle events every component bus understands
pub const COMPONENT_EVENTS: &[&str] = &[POST_INIT, POST_RENDER, FIRST_RENDER];

pub struct ComponentNode<M: StoreModel, C: Component<M>> {
    component: C,
    cx: Context<M, C::State>,
}

impl<M: StoreModel, C: Component<M>> ComponentNode<M, C> {
    /// Construct, register, and initialize a node.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `opts.app` is missing
    /// - A listener in `opts` names an undeclared event
    /// - The component's `init` fails
    pub async fn init(component: C, opts: ComponentOpts<M>) -> Result<Arc<Self>> {
        let kind = component.kind().to_string();
        let app = opts.app.ok_or_else(|| RxError::MissingApp(kind.clone()))?;

        let path = if opts.path.is_empty() { kind.clone() } else { opts.path };
        let info = ComponentInfo {
            id: opts.id.unwrap_or_else(|| path.clone()),
            kind,
            path,
        };

        let mut event_types: Vec<String> = COMPONENT_EVENTS.iter().map(|t| t.to_string()).collect();
        event_types.extend(component.event_types());
        let bus = Bus::new(info.id.clone(), event_types.as_slice(), info.clone());
        for (key, callback) in opts.listeners {
            bus.register(&key, Some(callback), Default::default())?;
        }

        let node = Arc::new(Self {
            component,
            cx: Context::new(info, app, bus),
        });

        node.cx.app().register(Arc::clone(&node) as Arc<dyn Node<M>>);
        node.component.pre_api_freeze(&node.cx);
        if let Err(err) = node.component.init(&node.cx).await {
            node.destroy();
            return Err(err);
        }

        debug!(component = %node.cx.id(), "initialized");
        node.cx.bus().emit(POST_INIT);
        Ok(node)
    }

    pub fn component(&self) -> &C {
        &self.component
    }

    pub fn context(&self) -> &Context<M, C::State> {
        &self.cx
    }

    async fn run_update(&self, current: &Current<M>) -> Result<()> {
        if let Some(action) = &current.action {
            if !self.component.reacts_to(action) {
                return Ok(());
            }
        }

        let Some(next) = self.component.get_state(&current.app_state) else {
            return Ok(());
        };

        let sequence_id = current.sequence_id();
        let unchanged = self.cx.state_matches(|previous| self.component.same_state(previous, &next));
        if current.action.is_none() || !unchanged {
            if let Some(id) = sequence_id {
                self.cx.record_latest(id);
            }
            self.cx.abort_pending(SUPERSEDED);
            self.render(next, sequence_id).await?;
        }

        let children = self.cx.children().nodes();
        join_all(children.iter().map(|child| child.update(current)))
            .await
            .into_iter()
            .collect::<Result<Vec<()>>>()?;

        if !self.cx.is_destroyed() && !self.cx.is_superseded(sequence_id) {
            self.cx.bus().emit(POST_RENDER);
        }
        Ok(())
    }

    async fn render(&self, next: C::State, sequence_id: Option<u64>) -> Result<()> {
        match C::MAIN_ARG {
            MainArg::Assign => {
                self.cx.set_state(next.clone());
                self.component.main(&self.cx, &next).await?;
            }
            MainArg::State => {
                self.component.main(&self.cx, &next).await?;
                if !self.cx.is_superseded(sequence_id) {
                    self.cx.set_state(next);
                }
            }
        }

        if !self.cx.is_superseded(sequence_id) {
            self.cx.release_abort();
        }
        Ok(())
    }

    fn handle_error(&self, err: RxError) -> Result<()> {
        if self.component.print_error(&err) {
            return Ok(());
        }
        match (err, self.component.error_target()) {
            (err @ RxError::Render { .. }, _) => Err(err),
            (err, Some(target)) => Err(RxError::Render {
                component: self.cx.id().to_string(),
                message: err.to_string(),
                target: Some(target),
            }),
            (err, None) => Err(err),
        }
    }
}

#[async_trait]
impl<M: StoreModel, C: Component<M>> Node<M> for ComponentNode<M, C> {
    fn info(&self) -> &ComponentInfo {
        self.cx.info()
    }

    async fn update(&self, current: &Current<M>) -> Result<()> {
        if self.cx.is_destroyed() {
            return Ok(());
        }
        match self.run_update(current).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_stale() => {
                debug!(component = %self.cx.id(), error = %err, "dropping stale result");
                Ok(())
            }
            Err(err) => self.handle_error(err),
        }
    }

    fn children(&self) -> Children<M> {
        self.cx.children()
    }

    fn on(&self, key: &str, callback: Callback<ComponentInfo>) -> Result<()> {
        self.cx.bus().register(key, Some(callback), Default::default())
    }

    fn trigger_abort(&self, reason: &str) {
        self.cx.trigger_abort(reason);
    }

    async fn replace_last_state(&self, state: &Snapshot<M::State>) {
        if !self.cx.is_destroyed() {
            self.component.replace_last_state(state).await;
        }
    }

    fn destroy(&self) {
        if !self.cx.mark_destroyed() {
            return;
        }
        self.cx.trigger_abort("destroyed");
        self.cx.app().deregister(self.cx.info());
        for child in self.cx.take_children().nodes() {
            child.destroy();
        }
        self.component.destroy();
        self.cx.bus().destroy();
        self.cx.clear_state();
        debug!(component = %self.cx.id(), "destroyed");
    }

    fn is_destroyed(&self) -> bool {
        self.cx.is_destroyed()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
