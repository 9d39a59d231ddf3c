//! Event bus for lifecycle notifications
//!
//! Every App and Component owns one [`Bus`]. A bus only accepts listeners
//! for the event types its owner declared; keys may be namespaced as
//! `"base.name"` so several listeners can share one base event.
//!
//! # Delivery
//!
//! [`Bus::emit`] never runs callbacks inline. Delivery happens on a spawned
//! task after the requested wait (default 0), and the task handle is
//! returned so callers that care can await it. Emitting therefore requires
//! a running tokio runtime.
//!
//! # One-shot events
//!
//! - `postInit` listeners fire at most once and are then removed.
//! - `firstRender` listeners fire on the first `postRender` emission and are
//!   then removed.
//!
//! # Example
//!
//! ```
//! use librx::bus::{Bus, BusArg};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> librx::Result<()> {
//! let bus = Bus::new("plot", &["postInit", "postRender", "firstRender"], "plot".to_string());
//! let renders = Arc::new(AtomicUsize::new(0));
//!
//! let counter = Arc::clone(&renders);
//! bus.on("postRender.counter", move |_arg: BusArg<String>| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! })?;
//!
//! bus.emit("postRender").await.ok();
//! assert_eq!(renders.load(Ordering::SeqCst), 1);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{Result, RxError};
use crate::sync::lock;

pub const POST_INIT: &str = "postInit";
pub const PRE_DISPATCH: &str = "preDispatch";
pub const POST_RENDER: &str = "postRender";
pub const FIRST_RENDER: &str = "firstRender";
pub const ERROR: &str = "error";

/// Shared listener callback
pub type Callback<H> = Arc<dyn Fn(BusArg<H>) + Send + Sync>;

/// What a listener receives
pub enum BusArg<H> {
    /// The bus owner's public handle (the default argument)
    Owner(H),
    /// The error being reported on an `error` emission
    Error(Arc<RxError>),
}

impl<H: Clone> Clone for BusArg<H> {
    fn clone(&self) -> Self {
        match self {
            BusArg::Owner(handle) => BusArg::Owner(handle.clone()),
            BusArg::Error(err) => BusArg::Error(Arc::clone(err)),
        }
    }
}

impl<H> fmt::Debug for BusArg<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusArg::Owner(_) => f.write_str("Owner(..)"),
            BusArg::Error(err) => f.debug_tuple("Error").field(err).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListenOpts {
    /// Extra delay applied before this listener runs
    pub wait: Option<Duration>,
}

struct Listener<H> {
    key: String,
    callback: Callback<H>,
    wait: Option<Duration>,
}

pub struct Bus<H> {
    name: String,
    event_types: Vec<String>,
    owner: H,
    default_wait: Duration,
    listeners: Arc<Mutex<Vec<Listener<H>>>>,
}

impl<H: Clone + Send + Sync + 'static> Bus<H> {
    /// Create a bus restricted to `event_types`, passing `owner` to
    /// listeners unless an emission supplies its own argument.
    pub fn new<S: AsRef<str>>(name: impl Into<String>, event_types: &[S], owner: H) -> Self {
        Self {
            name: name.into(),
            event_types: event_types.iter().map(|t| t.as_ref().to_string()).collect(),
            owner,
            default_wait: Duration::ZERO,
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_default_wait(mut self, wait: Duration) -> Self {
        self.default_wait = wait;
        self
    }

    pub fn event_types(&self) -> &[String] {
        &self.event_types
    }

    /// Register `callback` under `key`, replacing any listener with the
    /// exact same key.
    ///
    /// # Errors
    ///
    /// Returns `RxError::UnknownEvent` if the base of `key` (text before the
    /// first `.`) is not one of the declared event types.
    pub fn on<F>(&self, key: &str, callback: F) -> Result<()>
    where
        F: Fn(BusArg<H>) + Send + Sync + 'static,
    {
        self.register(key, Some(Arc::new(callback)), ListenOpts::default())
    }

    pub fn on_with<F>(&self, key: &str, callback: F, opts: ListenOpts) -> Result<()>
    where
        F: Fn(BusArg<H>) + Send + Sync + 'static,
    {
        self.register(key, Some(Arc::new(callback)), opts)
    }

    /// Remove the listener registered under `key`.
    pub fn off(&self, key: &str) -> Result<()> {
        self.register(key, None, ListenOpts::default())
    }

    /// Add, replace, or (with no callback) delete the listener under `key`.
    pub fn register(&self, key: &str, callback: Option<Callback<H>>, opts: ListenOpts) -> Result<()> {
        let base = base_of(key);
        if !self.event_types.iter().any(|t| t == base) {
            return Err(RxError::UnknownEvent {
                event: key.to_string(),
                owner: self.name.clone(),
                known: self.event_types.join(", "),
            });
        }

        let mut listeners = lock(&self.listeners);
        let existing = listeners.iter().position(|l| l.key == key);
        match (callback, existing) {
            (Some(callback), Some(index)) => {
                if !key.contains('.') {
                    warn!(
                        bus = %self.name,
                        event = key,
                        "replacing an un-namespaced listener; use '{}.name' to keep both",
                        key
                    );
                }
                listeners[index] = Listener {
                    key: key.to_string(),
                    callback,
                    wait: opts.wait,
                };
            }
            (Some(callback), None) => listeners.push(Listener {
                key: key.to_string(),
                callback,
                wait: opts.wait,
            }),
            (None, Some(index)) => {
                listeners.remove(index);
            }
            (None, None) => {}
        }
        Ok(())
    }

    /// Emit `event_type` with the owner handle as argument.
    pub fn emit(&self, event_type: &str) -> JoinHandle<()> {
        self.emit_with(event_type, None, None)
    }

    /// Emit `event_type` carrying `err` to its listeners.
    pub fn emit_error(&self, event_type: &str, err: Arc<RxError>) -> JoinHandle<()> {
        self.emit_with(event_type, Some(BusArg::Error(err)), None)
    }

    /// Deliver `event_type` after `wait` to every listener whose key equals
    /// it or is namespaced under it.
    pub fn emit_with(&self, event_type: &str, arg: Option<BusArg<H>>, wait: Option<Duration>) -> JoinHandle<()> {
        let listeners = Arc::clone(&self.listeners);
        let arg = arg.unwrap_or_else(|| BusArg::Owner(self.owner.clone()));
        let wait = wait.unwrap_or(self.default_wait);
        let event_type = event_type.to_string();

        tokio::spawn(async move {
            if wait.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(wait).await;
            }

            for (callback, delay) in take_due(&listeners, &event_type) {
                match delay {
                    Some(delay) if !delay.is_zero() => {
                        let arg = arg.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            callback(arg);
                        });
                    }
                    _ => callback(arg.clone()),
                }
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Drop every listener; later emissions reach nobody.
    pub fn destroy(&self) {
        lock(&self.listeners).clear();
    }
}

/// Collect the callbacks an emission reaches, removing one-shot listeners.
///
/// Callbacks are cloned out so none run while the listener lock is held.
fn take_due<H>(listeners: &Mutex<Vec<Listener<H>>>, event_type: &str) -> Vec<(Callback<H>, Option<Duration>)> {
    let mut listeners = lock(listeners);
    let mut due = Vec::new();

    listeners.retain(|listener| {
        let matches = listener.key == event_type
            || listener
                .key
                .strip_prefix(event_type)
                .is_some_and(|rest| rest.starts_with('.'));
        let first_render = event_type == POST_RENDER && base_of(&listener.key) == FIRST_RENDER;

        if matches || first_render {
            due.push((Arc::clone(&listener.callback), listener.wait));
        }
        let one_shot = first_render || (matches && base_of(&listener.key) == POST_INIT);
        !one_shot
    });
    due
}

fn base_of(key: &str) -> &str {
    key.split('.').next().unwrap_or(key)
}
