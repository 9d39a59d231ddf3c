//! Store model over an untyped JSON document

use async_trait::async_trait;
use librx::{copy_merge, Action, ActionKind, RxError, StoreModel};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonAction {
    /// Replace the value at a dot-separated path, creating objects on the way
    Set { path: String, value: Value },
    /// Deep-merge an object into the root
    Merge { value: Value },
    Delete { path: String },
    /// Append to the array at `path`, creating it if absent
    Push { path: String, value: Value },
    /// Back to the initial document
    Reset,
}

impl ActionKind for JsonAction {
    const TYPES: &'static [&'static str] = &["set", "merge", "delete", "push", "reset"];

    fn kind(&self) -> &'static str {
        match self {
            JsonAction::Set { .. } => "set",
            JsonAction::Merge { .. } => "merge",
            JsonAction::Delete { .. } => "delete",
            JsonAction::Push { .. } => "push",
            JsonAction::Reset => "reset",
        }
    }
}

pub struct JsonModel {
    initial: Value,
}

impl JsonModel {
    pub fn new(initial: Value) -> Self {
        Self { initial }
    }
}

#[async_trait]
impl StoreModel for JsonModel {
    type State = Value;
    type Action = JsonAction;

    fn name(&self) -> &str {
        "json"
    }

    fn default_state(&self) -> Value {
        self.initial.clone()
    }

    async fn apply(&self, state: &mut Value, action: &Action<JsonAction>) -> librx::Result<()> {
        match &action.payload {
            JsonAction::Set { path, value } => *slot(state, path)? = value.clone(),
            JsonAction::Merge { value } => {
                copy_merge(state, &[value], &[]);
            }
            JsonAction::Delete { path } => delete(state, path)?,
            JsonAction::Push { path, value } => {
                let target = slot(state, path)?;
                if target.is_null() {
                    *target = Value::Array(Vec::new());
                }
                match target {
                    Value::Array(items) => items.push(value.clone()),
                    _ => return Err(RxError::Handler(format!("'{}' is not an array", path))),
                }
            }
            JsonAction::Reset => *state = self.initial.clone(),
        }
        Ok(())
    }
}

/// Value at `path`, if every segment resolves
pub fn get<'a>(state: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(state);
    }
    path.split('.').try_fold(state, |value, segment| value.get(segment))
}

/// Mutable slot at `path`; missing objects along the way are created.
fn slot<'a>(state: &'a mut Value, path: &str) -> librx::Result<&'a mut Value> {
    if path.is_empty() {
        return Err(RxError::InvalidAction("empty path".to_string()));
    }
    let mut current = state;
    for segment in path.split('.') {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map.entry(segment).or_insert(Value::Null),
            _ => {
                return Err(RxError::Handler(format!(
                    "cannot descend into '{}' of '{}': not an object",
                    segment, path
                )))
            }
        };
    }
    Ok(current)
}

fn delete(state: &mut Value, path: &str) -> librx::Result<()> {
    let (parent, key) = match path.rsplit_once('.') {
        Some((parent, key)) => (parent, key),
        None => ("", path),
    };
    let parent = if parent.is_empty() {
        Some(state)
    } else {
        parent
            .split('.')
            .try_fold(state, |value, segment| value.get_mut(segment))
    };
    if let Some(Value::Object(map)) = parent {
        map.remove(key);
    }
    Ok(())
}
