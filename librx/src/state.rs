//! State utilities: structural equality, merge, and frozen snapshots
//!
//! `copy_merge` and `deep_equal` work on JSON trees (`serde_json::Value`),
//! which is how option overrides and wire payloads reach the runtime.
//! Typed state is cloned structurally through `Clone` and handed out behind
//! [`Frozen`], which never exposes a mutable reference.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::action::Scope;

/// Marker key that makes an object replace, rather than extend, its target
pub const ATOMIC_KEY: &str = "isAtomic";

/// Structural equality for JSON trees.
///
/// Objects are equal when they have the same key set and equal values;
/// arrays compare element-wise. Numbers compare by value, so `1` and `1.0`
/// are equal even though serde keeps them in different representations.
pub fn deep_equal(x: &Value, y: &Value) -> bool {
    match (x, y) {
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, value)| b.get(key).is_some_and(|other| deep_equal(value, other)))
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(l, r)| deep_equal(l, r))
        }
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(l), Some(r)) = (a.as_i64(), b.as_i64()) {
                l == r
            } else if let (Some(l), Some(r)) = (a.as_u64(), b.as_u64()) {
                l == r
            } else {
                a.as_f64() == b.as_f64()
            }
        }
        _ => x == y,
    }
}

/// Merge `sources` into `target`, in order, and return the target.
///
/// For each source key the source value replaces the target value when the
/// target has no object there (missing, primitive or array), when either
/// side carries an `isAtomic` marker, or when the key is listed in
/// `atomic_keys`. Otherwise the merge recurses and extends the nested
/// object. Keys only present in `target` survive. `null` sources are
/// skipped; any other non-object source replaces the target outright.
///
/// ```
/// use librx::state::copy_merge;
/// use serde_json::json;
///
/// let mut target = json!({"setting": {"color": "red"}, "arr": ["x", "y", "z"], "keyNotInSource": "test"});
/// let source = json!({"name": "name", "setting": {"color": "blue", "height": 100}, "arr": ["a", "b"]});
/// copy_merge(&mut target, &[&source], &[]);
///
/// assert_eq!(target, json!({
///     "setting": {"color": "blue", "height": 100},
///     "arr": ["a", "b"],
///     "keyNotInSource": "test",
///     "name": "name"
/// }));
/// ```
pub fn copy_merge<'t>(target: &'t mut Value, sources: &[&Value], atomic_keys: &[&str]) -> &'t mut Value {
    for source in sources {
        merge_one(target, source, atomic_keys);
    }
    target
}

fn merge_one(target: &mut Value, source: &Value, atomic_keys: &[&str]) {
    let source_map = match source {
        Value::Null => return,
        Value::Object(map) => map,
        other => {
            *target = other.clone();
            return;
        }
    };

    if !target.is_object() || is_atomic(target) {
        *target = Value::Object(source_map.clone());
        return;
    }

    let source_atomic = is_atomic(source);
    if let Value::Object(target_map) = target {
        for (key, value) in source_map {
            let replace = source_atomic
                || atomic_keys.contains(&key.as_str())
                || is_atomic(value)
                || !value.is_object()
                || target_map.get(key).map_or(true, |current| !current.is_object() || is_atomic(current));

            if replace {
                target_map.insert(key.clone(), value.clone());
            } else if let Some(current) = target_map.get_mut(key) {
                merge_one(current, value, atomic_keys);
            }
        }
    }
}

fn is_atomic(value: &Value) -> bool {
    value
        .get(ATOMIC_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Build an object that [`copy_merge`] will substitute wholesale.
pub fn atomic(mut map: Map<String, Value>) -> Value {
    map.insert(ATOMIC_KEY.to_string(), Value::Bool(true));
    Value::Object(map)
}

/// Read-only shared handle to a value nobody may mutate again.
///
/// There is no `DerefMut` and no way to reach the inner `Arc` mutably, so
/// writing through a snapshot does not compile:
///
/// ```compile_fail
/// use librx::state::deep_freeze;
///
/// let frozen = deep_freeze(vec![1, 2, 3]);
/// frozen.push(4);
/// ```
pub struct Frozen<T>(Arc<T>);

/// Move an owned value behind a [`Frozen`] handle.
///
/// Does not clone: the caller gives up its private copy.
pub fn deep_freeze<T>(value: T) -> Frozen<T> {
    Frozen(Arc::new(value))
}

impl<T> Frozen<T> {
    /// Whether two handles share the same frozen allocation
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl<T: Clone> Frozen<T> {
    /// Private, mutable deep copy of the frozen value
    pub fn thaw(&self) -> T {
        T::clone(&self.0)
    }
}

impl<T> Clone for Frozen<T> {
    fn clone(&self) -> Self {
        Frozen(Arc::clone(&self.0))
    }
}

impl<T> Deref for Frozen<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: PartialEq> PartialEq for Frozen<T> {
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Frozen<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: Serialize> Serialize for Frozen<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Frozen application state as handed out by a Store
///
/// Dereferences to the state itself; `scope()` carries the `_scope_` of the
/// last write for history-tracking consumers.
pub struct Snapshot<S> {
    state: Frozen<S>,
    scope: Option<Scope>,
}

impl<S> Snapshot<S> {
    pub fn new(state: Frozen<S>, scope: Option<Scope>) -> Self {
        Self { state, scope }
    }

    pub fn scope(&self) -> Option<Scope> {
        self.scope
    }

    pub fn frozen(&self) -> &Frozen<S> {
        &self.state
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Frozen::ptr_eq(&a.state, &b.state)
    }
}

impl<S> Clone for Snapshot<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            scope: self.scope,
        }
    }
}

impl<S> Deref for Snapshot<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.state
    }
}

impl<S: fmt::Debug> fmt::Debug for Snapshot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("state", &self.state)
            .field("scope", &self.scope)
            .finish()
    }
}
