//! Components mounted by the replay: path watchers and the save observer

use async_trait::async_trait;
use librx::app::RECOVER_KIND;
use librx::component::Context;
use librx::state::deep_equal;
use librx::{Component, Snapshot};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::model::{self, JsonModel};

/// Something observable that happened during the replay
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Record {
    Render {
        watch: String,
        sequence: Option<u64>,
        value: Value,
    },
    Save {
        line: usize,
        sequence: Option<u64>,
        recovered: usize,
    },
    Error {
        line: Option<usize>,
        message: String,
    },
}

/// Ordered log shared by every component of one replay
#[derive(Debug, Clone, Default)]
pub struct Journal {
    records: Arc<Mutex<Vec<Record>>>,
}

impl Journal {
    pub fn push(&self, record: Record) {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(record);
    }

    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn errors(&self) -> usize {
        self.records()
            .iter()
            .filter(|r| matches!(r, Record::Error { .. }))
            .count()
    }
}

/// Renders whenever the value at its path changes
pub struct Watch {
    path: String,
    journal: Journal,
}

impl Watch {
    pub fn new(path: impl Into<String>, journal: Journal) -> Self {
        Self {
            path: path.into(),
            journal,
        }
    }
}

#[async_trait]
impl Component<JsonModel> for Watch {
    type State = Value;

    fn kind(&self) -> &str {
        "watch"
    }

    fn get_state(&self, app_state: &Snapshot<Value>) -> Option<Value> {
        Some(model::get(app_state, &self.path).cloned().unwrap_or(Value::Null))
    }

    fn same_state(&self, previous: &Value, next: &Value) -> bool {
        deep_equal(previous, next)
    }

    async fn main(&self, cx: &Context<JsonModel, Value>, value: &Value) -> librx::Result<()> {
        self.journal.push(Record::Render {
            watch: self.path.clone(),
            sequence: cx.latest_sequence_id(),
            value: value.clone(),
        });
        Ok(())
    }
}

/// Counts out-of-band saves
#[derive(Default)]
pub struct Recover {
    replaced: Arc<AtomicUsize>,
}

impl Recover {
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.replaced)
    }
}

#[async_trait]
impl Component<JsonModel> for Recover {
    type State = ();

    fn kind(&self) -> &str {
        RECOVER_KIND
    }

    fn get_state(&self, _app_state: &Snapshot<Value>) -> Option<()> {
        None
    }

    async fn replace_last_state(&self, _state: &Snapshot<Value>) {
        self.replaced.fetch_add(1, Ordering::SeqCst);
    }
}
