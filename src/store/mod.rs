pub mod action;
pub mod lifted;

pub use action::{
    ActionEntry, ActionId, LiftedAction, LiftedActionKind, Reducer, StoreAction, INIT_ACTION_KIND,
};
pub use lifted::{ComputedState, InstrumentOptions, Instrumented, LiftedState};
