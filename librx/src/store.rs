//! Store: the single writer of canonical application state
//!
//! A Store owns the live state of one [`StoreModel`]. The only way to change
//! that state is [`Store::write`], which stamps the action with the next
//! sequence id, runs the model's handler against the live state, and hands
//! back a frozen snapshot. Everything outside the handler only ever sees
//! snapshots.
//!
//! # Debouncing
//!
//! With a debounce interval, `write` still applies each action immediately
//! and in submission order, but only resolves once no further write has
//! landed for a whole interval. Every caller waiting on the same quiet
//! period receives the same snapshot, so per-call results are not
//! individually addressable while writes keep arriving.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::action::{ensure_declared, Action, ActionKind, Scope};
use crate::error::{Result, RxError};
use crate::state::{copy_merge, deep_freeze, Snapshot};
use crate::sync::lock;

/// Allocator of the total order over all writes
///
/// Every Store sharing one clock draws from the same strictly increasing
/// sequence. Clones share the counter.
#[derive(Debug, Clone)]
pub struct SequenceClock {
    next: Arc<AtomicU64>,
}

impl Default for SequenceClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceClock {
    /// A fresh clock; the first id drawn is 1.
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Draw the next sequence id; never returns the same id twice.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// The id the next write will receive
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

/// Declared state shape and action handlers for one kind of Store
///
/// `apply` is the action table: it must match every payload variant and
/// mutate `state` in place. It may await; the Store holds its write lock
/// for the duration, so handlers never interleave.
#[async_trait]
pub trait StoreModel: Send + Sync + 'static {
    type State: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Action: ActionKind;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn default_state(&self) -> Self::State;

    async fn apply(&self, state: &mut Self::State, action: &Action<Self::Action>) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct StoreOpts {
    /// Overrides merged into the default state with `copy_merge`
    pub state: Option<Value>,
    pub debounce_interval: Option<Duration>,
}

struct Live<S> {
    state: S,
    scope: Option<Scope>,
}

pub struct Store<M: StoreModel> {
    model: M,
    clock: SequenceClock,
    live: tokio::sync::Mutex<Live<M::State>>,
    debounce_interval: Option<Duration>,
    writes: AtomicU64,
    settled: Mutex<Option<(u64, Snapshot<M::State>)>>,
}

impl<M: StoreModel> Store<M> {
    /// Create a Store, validating the model's declared action set.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The model declares no actions
    /// - An action type is declared twice
    /// - The state overrides do not fit the model's state type
    pub fn new(model: M, clock: SequenceClock, opts: StoreOpts) -> Result<Self> {
        validate_declarations::<M::Action>(model.name())?;

        let mut state = model.default_state();
        if let Some(overrides) = &opts.state {
            let mut merged = serde_json::to_value(&state)?;
            copy_merge(&mut merged, &[overrides], &[]);
            state = serde_json::from_value(merged)?;
        }

        Ok(Self {
            model,
            clock,
            live: tokio::sync::Mutex::new(Live { state, scope: None }),
            debounce_interval: opts.debounce_interval.filter(|d| !d.is_zero()),
            writes: AtomicU64::new(0),
            settled: Mutex::new(None),
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn clock(&self) -> &SequenceClock {
        &self.clock
    }

    pub fn debounce_interval(&self) -> Option<Duration> {
        self.debounce_interval
    }

    /// Apply `action` to the live state and return a frozen snapshot.
    ///
    /// Stamps `action.sequence_id` with the next id from the clock and
    /// copies `action.scope` onto the state root.
    pub async fn write(&self, action: &mut Action<M::Action>) -> Result<Snapshot<M::State>> {
        ensure_declared::<M::Action>(action.kind())?;

        {
            let mut live = self.live.lock().await;
            let sequence_id = self.clock.next();
            action.sequence_id = Some(sequence_id);
            debug!(store = self.model.name(), action = action.kind(), sequence_id, "write");

            self.model.apply(&mut live.state, action).await?;
            live.scope = action.scope;
        }

        match self.debounce_interval {
            None => Ok(self.copy_state().await),
            Some(interval) => Ok(self.settle(interval).await),
        }
    }

    /// Structural clone of the live state, frozen.
    pub async fn copy_state(&self) -> Snapshot<M::State> {
        let live = self.live.lock().await;
        Snapshot::new(deep_freeze(live.state.clone()), live.scope)
    }

    async fn settle(&self, interval: Duration) -> Snapshot<M::State> {
        let mut seen = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        loop {
            tokio::time::sleep(interval).await;
            let now = self.writes.load(Ordering::SeqCst);
            if now == seen {
                break;
            }
            seen = now;
        }

        if let Some(snapshot) = self.settled_at(seen) {
            return snapshot;
        }
        let snapshot = self.copy_state().await;

        let mut settled = lock(&self.settled);
        match settled.as_ref() {
            Some((count, existing)) if *count == seen => existing.clone(),
            _ => {
                debug!(store = self.model.name(), writes = seen, "debounced writes settled");
                *settled = Some((seen, snapshot.clone()));
                snapshot
            }
        }
    }

    fn settled_at(&self, count: u64) -> Option<Snapshot<M::State>> {
        lock(&self.settled)
            .as_ref()
            .filter(|(settled, _)| *settled == count)
            .map(|(_, snapshot)| snapshot.clone())
    }
}

fn validate_declarations<A: ActionKind>(store: &str) -> Result<()> {
    if A::TYPES.is_empty() {
        return Err(RxError::NoActionsDeclared(store.to_string()));
    }
    let mut seen = HashSet::new();
    for kind in A::TYPES {
        if !seen.insert(*kind) {
            return Err(RxError::DuplicateAction(kind.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: i64,
        label: String,
        history: Vec<i64>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum CounterAction {
        Add { by: i64 },
        Relabel { label: String },
        Fail,
    }

    impl ActionKind for CounterAction {
        const TYPES: &'static [&'static str] = &["add", "relabel", "fail"];

        fn kind(&self) -> &'static str {
            match self {
                CounterAction::Add { .. } => "add",
                CounterAction::Relabel { .. } => "relabel",
                CounterAction::Fail => "fail",
            }
        }
    }

    struct CounterModel;

    #[async_trait]
    impl StoreModel for CounterModel {
        type State = Counter;
        type Action = CounterAction;

        fn default_state(&self) -> Counter {
            Counter {
                count: 0,
                label: "counter".to_string(),
                history: vec![],
            }
        }

        async fn apply(&self, state: &mut Counter, action: &Action<CounterAction>) -> Result<()> {
            match &action.payload {
                CounterAction::Add { by } => {
                    state.count += by;
                    state.history.push(*by);
                }
                CounterAction::Relabel { label } => {
                    tokio::task::yield_now().await;
                    state.label = label.clone();
                }
                CounterAction::Fail => return Err(RxError::Handler("refused".to_string())),
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    enum Undeclared {
        Noop,
    }

    impl ActionKind for Undeclared {
        const TYPES: &'static [&'static str] = &[];

        fn kind(&self) -> &'static str {
            "Noop"
        }
    }

    struct EmptyModel;

    #[async_trait]
    impl StoreModel for EmptyModel {
        type State = Counter;
        type Action = Undeclared;

        fn name(&self) -> &str {
            "empty"
        }

        fn default_state(&self) -> Counter {
            CounterModel.default_state()
        }

        async fn apply(&self, _state: &mut Counter, _action: &Action<Undeclared>) -> Result<()> {
            Ok(())
        }
    }

    fn add(by: i64) -> Action<CounterAction> {
        Action::new(CounterAction::Add { by })
    }

    #[tokio::test]
    async fn test_sequence_ids_increase_across_stores_sharing_a_clock() {
        let clock = SequenceClock::new();
        let first = Store::new(CounterModel, clock.clone(), StoreOpts::default()).unwrap();
        let second = Store::new(CounterModel, clock.clone(), StoreOpts::default()).unwrap();

        let mut ids = Vec::new();
        for i in 0..6 {
            let mut action = add(1);
            let store = if i % 2 == 0 { &first } else { &second };
            store.write(&mut action).await.unwrap();
            ids.push(action.sequence_id.unwrap());
        }

        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(clock.peek(), ids[5] + 1);
    }

    #[tokio::test]
    async fn test_write_returns_frozen_copy() {
        let store = Store::new(CounterModel, SequenceClock::new(), StoreOpts::default()).unwrap();

        let snapshot = store.write(&mut add(2)).await.unwrap();
        store.write(&mut add(3)).await.unwrap();

        // the earlier snapshot is unaffected by later writes
        assert_eq!(snapshot.count, 2);
        assert_eq!(store.copy_state().await.count, 5);
    }

    #[tokio::test]
    async fn test_scope_is_propagated_to_snapshot() {
        let store = Store::new(CounterModel, SequenceClock::new(), StoreOpts::default()).unwrap();

        let snapshot = store.write(&mut add(1).with_scope(Scope::None)).await.unwrap();
        assert_eq!(snapshot.scope(), Some(Scope::None));

        let snapshot = store.write(&mut add(1)).await.unwrap();
        assert_eq!(snapshot.scope(), None);
    }

    #[tokio::test]
    async fn test_state_overrides_are_merged_into_defaults() {
        let opts = StoreOpts {
            state: Some(json!({"label": "custom"})),
            ..StoreOpts::default()
        };
        let store = Store::new(CounterModel, SequenceClock::new(), opts).unwrap();
        let state = store.copy_state().await;

        assert_eq!(state.label, "custom");
        assert_eq!(state.count, 0);
    }

    #[test]
    fn test_overrides_with_wrong_shape_fail() {
        let opts = StoreOpts {
            state: Some(json!({"count": "many"})),
            ..StoreOpts::default()
        };
        let result = Store::new(CounterModel, SequenceClock::new(), opts);
        assert!(matches!(result, Err(RxError::Json(_))));
    }

    #[test]
    fn test_store_without_actions_fails() {
        let result = Store::new(EmptyModel, SequenceClock::new(), StoreOpts::default());
        match result {
            Err(RxError::NoActionsDeclared(name)) => assert_eq!(name, "empty"),
            _ => panic!("Expected NoActionsDeclared"),
        }
    }

    #[tokio::test]
    async fn test_handler_error_propagates_and_keeps_sequence() {
        let clock = SequenceClock::new();
        let store = Store::new(CounterModel, clock.clone(), StoreOpts::default()).unwrap();

        let mut failing = Action::new(CounterAction::Fail);
        let result = store.write(&mut failing).await;

        assert!(matches!(result, Err(RxError::Handler(_))));
        assert_eq!(failing.sequence_id, Some(1));
        assert_eq!(clock.peek(), 2);
    }

    #[tokio::test]
    async fn test_async_handler_is_awaited() {
        let store = Store::new(CounterModel, SequenceClock::new(), StoreOpts::default()).unwrap();
        let snapshot = store
            .write(&mut Action::new(CounterAction::Relabel {
                label: "renamed".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(snapshot.label, "renamed");
    }

    #[tokio::test]
    async fn test_debounced_writes_resolve_to_one_settled_snapshot() {
        let opts = StoreOpts {
            debounce_interval: Some(Duration::from_millis(20)),
            ..StoreOpts::default()
        };
        let store = Store::new(CounterModel, SequenceClock::new(), opts).unwrap();

        let (mut a, mut b, mut c) = (add(1), add(2), add(3));
        let (first, second, third) = tokio::join!(
            store.write(&mut a),
            store.write(&mut b),
            store.write(&mut c)
        );
        let (first, second, third) = (first.unwrap(), second.unwrap(), third.unwrap());

        // every caller gets the same settled state, not its own intermediate one
        assert!(Snapshot::ptr_eq(&first, &second));
        assert!(Snapshot::ptr_eq(&second, &third));
        assert_eq!(first.count, 6);
        assert_eq!(first.history, vec![1, 2, 3]);
        assert!(a.sequence_id < b.sequence_id && b.sequence_id < c.sequence_id);
    }

    #[tokio::test]
    async fn test_zero_debounce_is_disabled() {
        let opts = StoreOpts {
            debounce_interval: Some(Duration::ZERO),
            ..StoreOpts::default()
        };
        let store = Store::new(CounterModel, SequenceClock::new(), opts).unwrap();
        assert_eq!(store.debounce_interval(), None);
    }
}
