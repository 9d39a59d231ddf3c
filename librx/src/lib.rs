//! librx - reactive application runtime
//!
//! An [`App`] owns a [`Store`] and a tree of components. Every external
//! trigger becomes an action dispatched through the App; the Store applies
//! it and stamps it with a sequence id, and every component in the tree
//! re-derives its slice of state and renders if the slice changed. Work
//! started for an action that has since been superseded is detected and
//! discarded.

pub mod abort;
pub mod action;
pub mod app;
pub mod bus;
pub mod component;
pub mod config;
pub mod error;
pub mod logging;
pub mod state;
pub mod store;

mod sync;

// Re-export commonly used types
pub use abort::{AbortController, AbortSignal};
pub use action::{Action, ActionKind, Scope};
pub use app::{App, AppBuilder, AppHandle, Middleware, MiddlewareOutcome};
pub use bus::{Bus, BusArg, ListenOpts};
pub use component::{Component, ComponentInfo, ComponentNode, Context, Freshness, MainArg, StaleOpts};
pub use config::Config;
pub use error::{ConfigError, Result, RxError};
pub use state::{copy_merge, deep_equal, Frozen, Snapshot};
pub use store::{SequenceClock, Store, StoreModel, StoreOpts};
