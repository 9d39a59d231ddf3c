//! Actions: typed messages describing an intended state change
//!
//! An [`Action`] wraps a payload enum with the bookkeeping the runtime adds
//! on the way through: the sequence id assigned by the Store, the history
//! scope, and an optional notification root. On the wire an action is a
//! flat JSON object `{"type": ..., ...payload}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;

use crate::error::{Result, RxError};

/// Closed set of action payloads accepted by one Store
///
/// Implementors are usually serde enums tagged by `type`:
///
/// ```
/// use librx::ActionKind;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// #[serde(tag = "type", rename_all = "snake_case")]
/// enum PlotAction {
///     SetColor { color: String },
///     Reset,
/// }
///
/// impl ActionKind for PlotAction {
///     const TYPES: &'static [&'static str] = &["set_color", "reset"];
///
///     fn kind(&self) -> &'static str {
///         match self {
///             PlotAction::SetColor { .. } => "set_color",
///             PlotAction::Reset => "reset",
///         }
///     }
/// }
/// ```
pub trait ActionKind: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Every action type name the Store declares a handler for
    const TYPES: &'static [&'static str];

    /// The `type` name of this payload
    fn kind(&self) -> &'static str;
}

/// History-tracking hint carried by an action onto the state root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    None,
    Local,
    Global,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action<A> {
    #[serde(flatten)]
    pub payload: A,

    /// Assigned exactly once, by the Store, at write time
    #[serde(rename = "sequenceId", default, skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<u64>,

    #[serde(rename = "_scope_", default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,

    /// Dot-separated component paths to notify instead of the whole tree
    #[serde(
        rename = "_notificationRoot_",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub notification_root: Option<Vec<String>>,
}

impl<A: ActionKind> Action<A> {
    pub fn new(payload: A) -> Self {
        Self {
            payload,
            sequence_id: None,
            scope: None,
            notification_root: None,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Restrict post-dispatch notification to the given component paths.
    ///
    /// Bypasses every other branch of the tree; use sparingly.
    pub fn notify<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.notification_root = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    /// Parse a wire-level action, rejecting types the Store never declared.
    pub fn from_json(value: Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RxError::InvalidAction("missing string field 'type'".to_string()))?;

        ensure_declared::<A>(kind)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl<A: ActionKind> From<A> for Action<A> {
    fn from(payload: A) -> Self {
        Action::new(payload)
    }
}

pub(crate) fn ensure_declared<A: ActionKind>(kind: &str) -> Result<()> {
    if A::TYPES.contains(&kind) {
        Ok(())
    } else {
        Err(RxError::UnknownAction {
            kind: kind.to_string(),
            declared: A::TYPES.join(", "),
        })
    }
}
