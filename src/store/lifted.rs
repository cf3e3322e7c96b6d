//! The lifted-state engine.
//!
//! Wraps a host reducer so every dispatch yields both the next app state and
//! a full history of evaluated states: an ordered action log, a computed
//! state per step, and a movable "current" pointer. Time-travel operations
//! (jump, toggle, import, commit, rollback) are applied on top of the same
//! structure.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::store::action::{
    ActionEntry, ActionId, LiftedAction, LiftedActionKind, Reducer, StoreAction,
};

/// The result of evaluating one staged action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedState<S> {
    pub state: S,
    /// Set iff the reducer failed on this step. The state carries the
    /// previous value through so sibling entries stay intact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full recorded history of a store plus its replay controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(
    serialize = "S: Serialize, A: Serialize",
    deserialize = "S: DeserializeOwned, A: DeserializeOwned"
))]
pub struct LiftedState<S, A> {
    pub actions_by_id: BTreeMap<ActionId, ActionEntry<A>>,
    pub next_action_id: ActionId,
    /// Replay order. Entry 0 is always the synthetic initial action.
    pub staged_action_ids: Vec<ActionId>,
    pub skipped_action_ids: BTreeSet<ActionId>,
    /// Base state replay starts from; eviction folds dropped prefix states
    /// into it, and the initial entry's computed state always equals it.
    pub committed_state: S,
    pub current_state_index: usize,
    pub computed_states: Vec<ComputedState<S>>,
    pub is_locked: bool,
    pub is_paused: bool,
}

impl<S, A> LiftedState<S, A> {
    /// The computed state the current pointer selects.
    pub fn current(&self) -> &ComputedState<S> {
        &self.computed_states[self.current_state_index]
    }

    /// The newest computed state.
    pub fn head(&self) -> &ComputedState<S> {
        self.computed_states
            .last()
            .expect("lifted state always holds the initial entry")
    }

    /// Number of staged actions excluding the initial entry.
    pub fn recorded_len(&self) -> usize {
        self.staged_action_ids.len().saturating_sub(1)
    }
}

/// Engine-level knobs, derived from the inspector configuration.
#[derive(Debug, Clone)]
pub struct InstrumentOptions {
    /// Upper bound on retained dispatched actions (the initial entry is
    /// extra). Oldest retained entries are evicted past it.
    pub max_age: usize,
    /// `false` starts the store paused.
    pub should_record_changes: bool,
    pub should_start_locked: bool,
    /// Recompute the log when the reducer is replaced; otherwise reset.
    pub should_hot_reload: bool,
    /// Action type consumed internally, never staged or relayed.
    pub pause_action_type: String,
    /// Capture a call stack per staged action.
    pub trace: bool,
    /// Stack frame cap when tracing.
    pub trace_limit: usize,
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        Self {
            max_age: 30,
            should_record_changes: true,
            should_start_locked: false,
            should_hot_reload: true,
            pause_action_type: "@@PAUSED".to_string(),
            trace: false,
            trace_limit: 10,
        }
    }
}

/// A host reducer lifted into a `(LiftedState, LiftedAction) -> LiftedState`
/// machine. All mutation of the lifted state goes through here.
pub struct Instrumented<S, A> {
    reducer: Arc<dyn Reducer<S, A>>,
    lifted: LiftedState<S, A>,
    options: InstrumentOptions,
}

impl<S, A> Instrumented<S, A>
where
    S: Clone,
    A: StoreAction,
{
    pub fn new(reducer: Arc<dyn Reducer<S, A>>, preloaded: S, options: InstrumentOptions) -> Self {
        let lifted = LiftedState {
            actions_by_id: BTreeMap::from([(0, ActionEntry::init(now_ms()))]),
            next_action_id: 1,
            staged_action_ids: vec![0],
            skipped_action_ids: BTreeSet::new(),
            committed_state: preloaded.clone(),
            current_state_index: 0,
            computed_states: vec![ComputedState {
                state: preloaded,
                error: None,
            }],
            is_locked: options.should_start_locked,
            is_paused: !options.should_record_changes,
        };
        Self {
            reducer,
            lifted,
            options,
        }
    }

    pub fn lifted_state(&self) -> &LiftedState<S, A> {
        &self.lifted
    }

    /// The app state the current pointer selects.
    pub fn state(&self) -> &S {
        &self.lifted.current().state
    }

    pub fn options(&self) -> &InstrumentOptions {
        &self.options
    }

    /// Record one host action.
    pub fn dispatch(&mut self, action: A) -> LiftedActionKind {
        self.dispatch_lifted(LiftedAction::PerformAction {
            action,
            timestamp: None,
        })
    }

    /// Apply a lifted operation and return its kind for change observers.
    pub fn dispatch_lifted(&mut self, action: LiftedAction<S, A>) -> LiftedActionKind {
        let kind = action.kind();
        match action {
            LiftedAction::PerformAction { action, timestamp } => {
                self.perform(action, timestamp);
            }
            LiftedAction::Reset | LiftedAction::Commit => {
                let current = self.state().clone();
                self.truncate_to(current);
            }
            LiftedAction::Rollback => {
                let base = self.lifted.committed_state.clone();
                self.truncate_to(base);
            }
            LiftedAction::Sweep => self.sweep(),
            LiftedAction::ToggleAction { id } => self.toggle(id),
            LiftedAction::JumpToState { index } => {
                self.lifted.current_state_index =
                    index.min(self.lifted.computed_states.len() - 1);
            }
            LiftedAction::JumpToAction { action_id } => {
                if let Some(position) = self
                    .lifted
                    .staged_action_ids
                    .iter()
                    .position(|&id| id == action_id)
                {
                    self.lifted.current_state_index = position;
                } else {
                    tracing::debug!(action_id, "jump target not staged, ignoring");
                }
            }
            LiftedAction::ImportState {
                next_lifted_state,
                preloaded_state,
            } => self.import(next_lifted_state, preloaded_state),
            LiftedAction::PauseRecording { status } => {
                self.lifted.is_paused = status;
            }
            LiftedAction::LockChanges { status } => {
                self.lifted.is_locked = status;
            }
        }
        kind
    }

    /// Swap the reducer, recomputing history when hot reload is on.
    pub fn replace_reducer(&mut self, reducer: Arc<dyn Reducer<S, A>>) {
        self.reducer = reducer;
        if self.options.should_hot_reload {
            self.recompute_from(1);
        } else {
            let base = self.lifted.committed_state.clone();
            self.truncate_to(base);
        }
    }

    fn perform(&mut self, action: A, timestamp: Option<i64>) {
        if self.lifted.is_locked {
            tracing::debug!(action = action.kind(), "dispatch refused while locked");
            return;
        }
        if action.kind() == self.options.pause_action_type {
            tracing::trace!(action = action.kind(), "pause marker consumed");
            return;
        }
        if self.lifted.is_paused {
            // Keep the app moving without growing the log: the head computed
            // state is replaced in place.
            let head = self.lifted.computed_states.len() - 1;
            let prev = self.lifted.computed_states[head].state.clone();
            self.lifted.computed_states[head] = self.apply(&prev, &action);
            return;
        }

        let id = self.lifted.next_action_id;
        self.lifted.next_action_id += 1;

        let entry = ActionEntry {
            action: Some(action),
            timestamp: timestamp.unwrap_or_else(now_ms),
            stack: self.capture_stack(),
        };
        let head_state = self.lifted.head().state.clone();
        let computed = match entry.action.as_ref() {
            Some(action) => self.apply(&head_state, action),
            None => ComputedState {
                state: head_state,
                error: None,
            },
        };

        let at_head = self.lifted.current_state_index == self.lifted.computed_states.len() - 1;
        self.lifted.actions_by_id.insert(id, entry);
        self.lifted.staged_action_ids.push(id);
        self.lifted.computed_states.push(computed);
        if at_head {
            self.lifted.current_state_index = self.lifted.computed_states.len() - 1;
        }
        self.evict_excess();
    }

    fn apply(&self, state: &S, action: &A) -> ComputedState<S> {
        match self.reducer.reduce(state, action) {
            Ok(next) => ComputedState {
                state: next,
                error: None,
            },
            Err(err) => ComputedState {
                state: state.clone(),
                error: Some(err.to_string()),
            },
        }
    }

    fn evict_excess(&mut self) {
        while self.lifted.recorded_len() > self.options.max_age {
            let evicted_id = self.lifted.staged_action_ids.remove(1);
            self.lifted.actions_by_id.remove(&evicted_id);
            self.lifted.skipped_action_ids.remove(&evicted_id);
            let folded = self.lifted.computed_states.remove(1);
            self.lifted.committed_state = folded.state;
            self.lifted.computed_states[0] = ComputedState {
                state: self.lifted.committed_state.clone(),
                error: None,
            };
            if self.lifted.current_state_index > 0 {
                self.lifted.current_state_index -= 1;
            }
        }
    }

    fn truncate_to(&mut self, base: S) {
        self.lifted.committed_state = base.clone();
        self.lifted.actions_by_id = BTreeMap::from([(0, ActionEntry::init(now_ms()))]);
        self.lifted.staged_action_ids = vec![0];
        self.lifted.skipped_action_ids.clear();
        self.lifted.computed_states = vec![ComputedState {
            state: base,
            error: None,
        }];
        self.lifted.current_state_index = 0;
        self.lifted.next_action_id = 1;
    }

    fn toggle(&mut self, id: ActionId) {
        if id == 0 {
            // The initial entry is not part of the replayable set.
            return;
        }
        let Some(position) = self
            .lifted
            .staged_action_ids
            .iter()
            .position(|&staged| staged == id)
        else {
            tracing::debug!(id, "toggle target not staged, ignoring");
            return;
        };
        if !self.lifted.skipped_action_ids.remove(&id) {
            self.lifted.skipped_action_ids.insert(id);
        }
        self.recompute_from(position);
    }

    fn sweep(&mut self) {
        let skipped = std::mem::take(&mut self.lifted.skipped_action_ids);
        if skipped.is_empty() {
            return;
        }
        let mut staged = Vec::with_capacity(self.lifted.staged_action_ids.len());
        let mut computed = Vec::with_capacity(self.lifted.computed_states.len());
        let mut current = 0;
        for (index, id) in self.lifted.staged_action_ids.iter().enumerate() {
            if index > 0 && skipped.contains(id) {
                self.lifted.actions_by_id.remove(id);
                continue;
            }
            // Skipped steps carried the previous state through, so the kept
            // computed states stay valid without recomputation.
            staged.push(*id);
            computed.push(self.lifted.computed_states[index].clone());
            if index <= self.lifted.current_state_index {
                current = staged.len() - 1;
            }
        }
        self.lifted.staged_action_ids = staged;
        self.lifted.computed_states = computed;
        self.lifted.current_state_index = current;
    }

    fn import(&mut self, next: LiftedState<S, A>, preloaded: Option<S>) {
        self.lifted = next;
        if let Some(base) = preloaded {
            self.lifted.committed_state = base;
        }
        self.normalize_imported();
        if self.lifted.current_state_index >= self.lifted.computed_states.len() {
            self.lifted.current_state_index = self.lifted.computed_states.len() - 1;
        }
    }

    /// Imported blobs come from the wire; rebuild computed states whenever
    /// they do not line up with the staged log.
    fn normalize_imported(&mut self) {
        if self.lifted.staged_action_ids.is_empty() {
            self.lifted.staged_action_ids = vec![0];
        }
        if self.lifted.staged_action_ids[0] != 0 {
            self.lifted.staged_action_ids.insert(0, 0);
        }
        self.lifted
            .actions_by_id
            .entry(0)
            .or_insert_with(|| ActionEntry::init(now_ms()));

        let staged = self.lifted.staged_action_ids.len();
        if self.lifted.computed_states.len() != staged {
            self.lifted.computed_states = vec![
                ComputedState {
                    state: self.lifted.committed_state.clone(),
                    error: None,
                };
                staged
            ];
        } else {
            self.lifted.computed_states[0] = ComputedState {
                state: self.lifted.committed_state.clone(),
                error: None,
            };
        }
        self.recompute_from(1);
    }

    /// Recompute computed states from `position` to the head, carrying the
    /// previous state through skipped and failing steps.
    fn recompute_from(&mut self, position: usize) {
        for index in position.max(1)..self.lifted.staged_action_ids.len() {
            let id = self.lifted.staged_action_ids[index];
            let prev = self.lifted.computed_states[index - 1].state.clone();
            let next = if self.lifted.skipped_action_ids.contains(&id) {
                ComputedState {
                    state: prev,
                    error: None,
                }
            } else {
                match self
                    .lifted
                    .actions_by_id
                    .get(&id)
                    .and_then(|entry| entry.action.as_ref())
                {
                    Some(action) => self.apply(&prev, action),
                    None => ComputedState {
                        state: prev,
                        error: None,
                    },
                }
            };
            self.lifted.computed_states[index] = next;
        }
    }

    fn capture_stack(&self) -> Option<String> {
        if !self.options.trace {
            return None;
        }
        let rendered = std::backtrace::Backtrace::force_capture().to_string();
        let limited: Vec<&str> = rendered.lines().take(self.options.trace_limit).collect();
        Some(limited.join("\n"))
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "payload")]
    enum CounterAction {
        #[serde(rename = "counter/increment")]
        Increment,
        #[serde(rename = "counter/decrement")]
        Decrement,
        #[serde(rename = "counter/add")]
        Add(i64),
        #[serde(rename = "counter/boom")]
        Boom,
        #[serde(rename = "@@PAUSED")]
        PauseMarker,
    }

    impl StoreAction for CounterAction {
        fn kind(&self) -> &str {
            match self {
                CounterAction::Increment => "counter/increment",
                CounterAction::Decrement => "counter/decrement",
                CounterAction::Add(_) => "counter/add",
                CounterAction::Boom => "counter/boom",
                CounterAction::PauseMarker => "@@PAUSED",
            }
        }
    }

    fn counter(state: &i64, action: &CounterAction) -> anyhow::Result<i64> {
        match action {
            CounterAction::Increment => Ok(state + 1),
            CounterAction::Decrement => Ok(state - 1),
            CounterAction::Add(amount) => Ok(state + amount),
            CounterAction::Boom => Err(anyhow!("boom")),
            CounterAction::PauseMarker => Ok(*state),
        }
    }

    fn store(options: InstrumentOptions) -> Instrumented<i64, CounterAction> {
        Instrumented::new(Arc::new(counter), 0, options)
    }

    fn assert_replay_determinism(instrumented: &Instrumented<i64, CounterAction>) {
        let lifted = instrumented.lifted_state();
        assert_eq!(lifted.computed_states.len(), lifted.staged_action_ids.len());
        assert!(lifted.current_state_index < lifted.computed_states.len());

        let mut state = lifted.committed_state;
        assert_eq!(lifted.computed_states[0].state, state);
        for (index, id) in lifted.staged_action_ids.iter().enumerate().skip(1) {
            if !lifted.skipped_action_ids.contains(id) {
                let action = lifted.actions_by_id[id].action.as_ref().unwrap();
                if let Ok(next) = counter(&state, action) {
                    state = next;
                }
            }
            assert_eq!(
                lifted.computed_states[index].state, state,
                "replay diverged at step {index}"
            );
        }
    }

    #[test]
    fn dispatch_appends_and_advances() {
        let mut s = store(InstrumentOptions::default());
        s.dispatch(CounterAction::Increment);
        s.dispatch(CounterAction::Add(4));

        let lifted = s.lifted_state();
        assert_eq!(lifted.staged_action_ids, vec![0, 1, 2]);
        assert_eq!(lifted.next_action_id, 3);
        assert_eq!(lifted.current_state_index, 2);
        assert_eq!(*s.state(), 5);
        assert_replay_determinism(&s);
    }

    #[test]
    fn eviction_keeps_init_and_folds_base() {
        let mut s = store(InstrumentOptions {
            max_age: 3,
            ..InstrumentOptions::default()
        });
        // A, B, C, D
        s.dispatch(CounterAction::Add(1));
        s.dispatch(CounterAction::Add(10));
        s.dispatch(CounterAction::Add(100));
        s.dispatch(CounterAction::Add(1000));

        let lifted = s.lifted_state();
        assert_eq!(lifted.staged_action_ids, vec![0, 2, 3, 4]);
        assert_eq!(lifted.computed_states.len(), 4);
        assert_eq!(lifted.committed_state, 1);
        assert_eq!(*s.state(), 1111);
        assert_replay_determinism(&s);
    }

    #[test]
    fn eviction_bound_holds_under_load() {
        let max_age = 5;
        let mut s = store(InstrumentOptions {
            max_age,
            ..InstrumentOptions::default()
        });
        for _ in 0..max_age + 7 {
            s.dispatch(CounterAction::Increment);
        }
        let lifted = s.lifted_state();
        assert_eq!(lifted.recorded_len(), max_age);
        assert_eq!(lifted.staged_action_ids[0], 0);
        assert_eq!(*s.state(), (max_age as i64) + 7);
        assert_replay_determinism(&s);
    }

    #[test]
    fn reducer_error_is_captured_locally() {
        let mut s = store(InstrumentOptions::default());
        s.dispatch(CounterAction::Increment);
        s.dispatch(CounterAction::Boom);

        let lifted = s.lifted_state();
        assert_eq!(lifted.head().error.as_deref(), Some("boom"));
        // The failing step carries the previous state through.
        assert_eq!(lifted.head().state, 1);

        s.dispatch(CounterAction::Increment);
        let lifted = s.lifted_state();
        assert_eq!(lifted.head().error, None);
        assert_eq!(lifted.head().state, 2);
        // The earlier failure is still recorded on its own entry.
        assert_eq!(lifted.computed_states[2].error.as_deref(), Some("boom"));
    }

    #[test]
    fn toggle_skips_and_retoggle_restores() {
        let mut s = store(InstrumentOptions::default());
        s.dispatch(CounterAction::Add(1));
        s.dispatch(CounterAction::Add(10));
        s.dispatch(CounterAction::Add(100));
        let original: Vec<i64> = s
            .lifted_state()
            .computed_states
            .iter()
            .map(|c| c.state)
            .collect();

        s.dispatch_lifted(LiftedAction::ToggleAction { id: 2 });
        assert_eq!(*s.state(), 101);
        assert!(s.lifted_state().skipped_action_ids.contains(&2));
        assert_replay_determinism(&s);

        s.dispatch_lifted(LiftedAction::ToggleAction { id: 2 });
        let restored: Vec<i64> = s
            .lifted_state()
            .computed_states
            .iter()
            .map(|c| c.state)
            .collect();
        assert_eq!(restored, original);
        assert!(s.lifted_state().skipped_action_ids.is_empty());
    }

    #[test]
    fn jumps_move_the_pointer_without_recompute() {
        let mut s = store(InstrumentOptions::default());
        s.dispatch(CounterAction::Add(1));
        s.dispatch(CounterAction::Add(10));
        let before: Vec<i64> = s
            .lifted_state()
            .computed_states
            .iter()
            .map(|c| c.state)
            .collect();

        s.dispatch_lifted(LiftedAction::JumpToState { index: 1 });
        assert_eq!(*s.state(), 1);
        s.dispatch_lifted(LiftedAction::JumpToAction { action_id: 2 });
        assert_eq!(*s.state(), 11);

        let after: Vec<i64> = s
            .lifted_state()
            .computed_states
            .iter()
            .map(|c| c.state)
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn dispatch_after_jump_back_appends_from_head() {
        let mut s = store(InstrumentOptions::default());
        s.dispatch(CounterAction::Add(1));
        s.dispatch(CounterAction::Add(10));
        s.dispatch_lifted(LiftedAction::JumpToState { index: 1 });

        s.dispatch(CounterAction::Add(100));
        let lifted = s.lifted_state();
        // New steps compute from the head, and the pointer stays jumped.
        assert_eq!(lifted.head().state, 111);
        assert_eq!(lifted.current_state_index, 1);
        assert_replay_determinism(&s);
    }

    #[test]
    fn paused_dispatch_replaces_head_without_growing_log() {
        let mut s = store(InstrumentOptions::default());
        s.dispatch(CounterAction::Add(1));
        s.dispatch_lifted(LiftedAction::PauseRecording { status: true });

        let staged_before = s.lifted_state().staged_action_ids.clone();
        s.dispatch(CounterAction::Add(10));
        s.dispatch(CounterAction::Add(100));

        let lifted = s.lifted_state();
        assert!(lifted.is_paused);
        assert_eq!(lifted.staged_action_ids, staged_before);
        assert_eq!(lifted.head().state, 111);
        assert_eq!(lifted.next_action_id, 2);
    }

    #[test]
    fn locked_dispatch_is_refused() {
        let mut s = store(InstrumentOptions::default());
        s.dispatch(CounterAction::Add(1));
        s.dispatch_lifted(LiftedAction::LockChanges { status: true });

        s.dispatch(CounterAction::Add(10));
        let lifted = s.lifted_state();
        assert!(lifted.is_locked);
        assert_eq!(lifted.staged_action_ids, vec![0, 1]);
        assert_eq!(*s.state(), 1);

        s.dispatch_lifted(LiftedAction::LockChanges { status: false });
        s.dispatch(CounterAction::Add(10));
        assert_eq!(*s.state(), 11);
    }

    #[test]
    fn pause_marker_action_is_consumed() {
        let mut s = store(InstrumentOptions::default());
        s.dispatch(CounterAction::PauseMarker);
        assert_eq!(s.lifted_state().staged_action_ids, vec![0]);
        assert_eq!(s.lifted_state().next_action_id, 1);
    }

    #[test]
    fn reset_truncates_to_current_state() {
        let mut s = store(InstrumentOptions::default());
        s.dispatch(CounterAction::Add(1));
        s.dispatch(CounterAction::Add(10));
        s.dispatch_lifted(LiftedAction::Reset);

        let lifted = s.lifted_state();
        assert_eq!(lifted.staged_action_ids, vec![0]);
        assert_eq!(lifted.computed_states.len(), 1);
        assert_eq!(lifted.committed_state, 11);
        assert_eq!(*s.state(), 11);
        assert_eq!(lifted.next_action_id, 1);
    }

    #[test]
    fn rollback_returns_to_committed_base() {
        let mut s = store(InstrumentOptions::default());
        s.dispatch(CounterAction::Add(1));
        s.dispatch_lifted(LiftedAction::Commit);
        s.dispatch(CounterAction::Add(10));
        s.dispatch_lifted(LiftedAction::Rollback);

        let lifted = s.lifted_state();
        assert_eq!(lifted.staged_action_ids, vec![0]);
        assert_eq!(*s.state(), 1);
    }

    #[test]
    fn sweep_drops_skipped_actions() {
        let mut s = store(InstrumentOptions::default());
        s.dispatch(CounterAction::Add(1));
        s.dispatch(CounterAction::Add(10));
        s.dispatch(CounterAction::Add(100));
        s.dispatch_lifted(LiftedAction::ToggleAction { id: 2 });
        s.dispatch_lifted(LiftedAction::Sweep);

        let lifted = s.lifted_state();
        assert_eq!(lifted.staged_action_ids, vec![0, 1, 3]);
        assert!(lifted.skipped_action_ids.is_empty());
        assert!(!lifted.actions_by_id.contains_key(&2));
        assert_eq!(*s.state(), 101);
        assert_replay_determinism(&s);
    }

    #[test]
    fn import_replaces_wholesale() {
        let mut source = store(InstrumentOptions::default());
        source.dispatch(CounterAction::Add(7));
        source.dispatch(CounterAction::Add(70));
        let exported = source.lifted_state().clone();

        let mut target = store(InstrumentOptions::default());
        target.dispatch(CounterAction::Decrement);
        target.dispatch_lifted(LiftedAction::ImportState {
            next_lifted_state: exported,
            preloaded_state: None,
        });

        assert_eq!(*target.state(), 77);
        assert_eq!(target.lifted_state().staged_action_ids, vec![0, 1, 2]);
        assert_replay_determinism(&target);
    }

    #[test]
    fn import_with_preloaded_state_reruns_the_log() {
        let mut source = store(InstrumentOptions::default());
        source.dispatch(CounterAction::Add(1));
        source.dispatch(CounterAction::Add(10));
        let exported = source.lifted_state().clone();

        let mut target = store(InstrumentOptions::default());
        target.dispatch_lifted(LiftedAction::ImportState {
            next_lifted_state: exported,
            preloaded_state: Some(1000),
        });

        assert_eq!(target.lifted_state().committed_state, 1000);
        assert_eq!(*target.state(), 1011);
        assert_replay_determinism(&target);
    }

    #[test]
    fn replace_reducer_hot_reload_recomputes() {
        let mut s = store(InstrumentOptions::default());
        s.dispatch(CounterAction::Add(1));
        s.dispatch(CounterAction::Add(10));

        let doubling = |state: &i64, action: &CounterAction| -> anyhow::Result<i64> {
            match action {
                CounterAction::Add(amount) => Ok(state + amount * 2),
                other => counter(state, other),
            }
        };
        s.replace_reducer(Arc::new(doubling));
        assert_eq!(*s.state(), 22);
        assert_eq!(s.lifted_state().staged_action_ids, vec![0, 1, 2]);
    }

    #[test]
    fn replace_reducer_without_hot_reload_resets() {
        let mut s = store(InstrumentOptions {
            should_hot_reload: false,
            ..InstrumentOptions::default()
        });
        s.dispatch(CounterAction::Add(1));
        s.replace_reducer(Arc::new(counter));
        assert_eq!(s.lifted_state().staged_action_ids, vec![0]);
        assert_eq!(*s.state(), 0);
    }

    #[test]
    fn starts_paused_when_recording_disabled_and_locked_when_configured() {
        let s = store(InstrumentOptions {
            should_record_changes: false,
            should_start_locked: true,
            ..InstrumentOptions::default()
        });
        assert!(s.lifted_state().is_paused);
        assert!(s.lifted_state().is_locked);
    }

    proptest! {
        #[test]
        fn replay_reproduces_computed_states(
            ops in proptest::collection::vec(0u8..4, 1..48),
            toggles in proptest::collection::vec(1u64..40, 0..6),
            max_age in 2usize..8,
        ) {
            let mut s = store(InstrumentOptions { max_age, ..InstrumentOptions::default() });
            for op in ops {
                let action = match op {
                    0 => CounterAction::Increment,
                    1 => CounterAction::Decrement,
                    2 => CounterAction::Add(3),
                    _ => CounterAction::Boom,
                };
                s.dispatch(action);
            }
            for id in toggles {
                s.dispatch_lifted(LiftedAction::ToggleAction { id });
            }
            assert_replay_determinism(&s);
        }
    }
}
