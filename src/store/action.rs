//! Action and reducer traits plus the lifted action vocabulary.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::store::lifted::LiftedState;

/// Type tag reported for the synthetic initial entry (action id 0).
pub const INIT_ACTION_KIND: &str = "@@INIT";

/// Monotonically increasing identifier assigned to recorded actions.
pub type ActionId = u64;

/// A host application action with a string type tag.
///
/// The tag drives filtering, lifecycle triggers and the inspector display;
/// the rest of the action is opaque payload.
pub trait StoreAction: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The action's type tag.
    fn kind(&self) -> &str;
}

/// A host reducer: a pure state transition that may fail per step.
///
/// A returned error is recorded on the affected computed state and never
/// propagates out of the store.
pub trait Reducer<S, A>: Send + Sync {
    fn reduce(&self, state: &S, action: &A) -> anyhow::Result<S>;
}

impl<S, A, F> Reducer<S, A> for F
where
    F: Fn(&S, &A) -> anyhow::Result<S> + Send + Sync,
{
    fn reduce(&self, state: &S, action: &A) -> anyhow::Result<S> {
        self(state, action)
    }
}

/// One recorded action with its capture metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEntry<A> {
    /// `None` marks the synthetic initial entry.
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub action: Option<A>,
    /// Millisecond epoch timestamp at staging time.
    pub timestamp: i64,
    /// Captured call stack when tracing is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl<A: StoreAction> ActionEntry<A> {
    pub(crate) fn init(timestamp: i64) -> Self {
        Self {
            action: None,
            timestamp,
            stack: None,
        }
    }

    /// The entry's action type tag; the initial entry reports
    /// [`INIT_ACTION_KIND`].
    pub fn kind(&self) -> &str {
        self.action
            .as_ref()
            .map(StoreAction::kind)
            .unwrap_or(INIT_ACTION_KIND)
    }
}

/// Operations understood by the lifted store, both locally dispatched and
/// arriving over the wire from the inspector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(bound(
    serialize = "S: Serialize, A: Serialize",
    deserialize = "S: DeserializeOwned, A: DeserializeOwned"
))]
pub enum LiftedAction<S, A> {
    /// Record one host action and compute its resulting state.
    PerformAction {
        action: A,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    /// Truncate the log to the current state.
    Reset,
    /// Truncate the log to the committed base state.
    Rollback,
    /// Fold the current state into the base and truncate.
    Commit,
    /// Drop skipped actions from the log.
    Sweep,
    /// Flip an action in or out of the replay, recomputing downstream states.
    ToggleAction { id: ActionId },
    /// Move the current pointer to a computed-state index. O(1).
    JumpToState { index: usize },
    /// Move the current pointer to a staged action. No recomputation.
    #[serde(rename_all = "camelCase")]
    JumpToAction { action_id: ActionId },
    /// Replace the whole lifted state, optionally re-running from a
    /// preloaded base state.
    #[serde(rename_all = "camelCase")]
    ImportState {
        next_lifted_state: LiftedState<S, A>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preloaded_state: Option<S>,
    },
    /// While paused, dispatches update the head state without growing the log.
    PauseRecording { status: bool },
    /// While locked, dispatches are refused outright.
    LockChanges { status: bool },
}

/// Discriminant of a [`LiftedAction`], used by the relay controller to decide
/// what a change notification means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiftedActionKind {
    PerformAction,
    Reset,
    Rollback,
    Commit,
    Sweep,
    ToggleAction,
    JumpToState,
    JumpToAction,
    ImportState,
    PauseRecording,
    LockChanges,
}

impl<S, A> LiftedAction<S, A> {
    pub fn kind(&self) -> LiftedActionKind {
        match self {
            LiftedAction::PerformAction { .. } => LiftedActionKind::PerformAction,
            LiftedAction::Reset => LiftedActionKind::Reset,
            LiftedAction::Rollback => LiftedActionKind::Rollback,
            LiftedAction::Commit => LiftedActionKind::Commit,
            LiftedAction::Sweep => LiftedActionKind::Sweep,
            LiftedAction::ToggleAction { .. } => LiftedActionKind::ToggleAction,
            LiftedAction::JumpToState { .. } => LiftedActionKind::JumpToState,
            LiftedAction::JumpToAction { .. } => LiftedActionKind::JumpToAction,
            LiftedAction::ImportState { .. } => LiftedActionKind::ImportState,
            LiftedAction::PauseRecording { .. } => LiftedActionKind::PauseRecording,
            LiftedAction::LockChanges { .. } => LiftedActionKind::LockChanges,
        }
    }
}
