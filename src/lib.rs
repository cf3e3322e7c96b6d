//! Development-time state inspector for reducer-driven stores.
//!
//! Wraps a host reducer so every dispatch records the full action/state
//! history ("lifted state"), relays changes to an external inspector over an
//! injected message channel, and applies remote time-travel commands (jump,
//! toggle, import/export, lock, pause) back onto the live store. The host's
//! dispatch path is never blocked or crashed by relay or transport failures.

pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod inspector;
pub mod registry;
pub mod relay;
pub mod store;
pub mod transport;

pub use config::InspectorConfig;
pub use error::InspectorError;
pub use filter::{ActionFilter, ActionSanitizer, FilterOptions, StateSanitizer};
pub use inspector::{DevStore, Inspector};
pub use registry::{ActionCreatorRegistry, ActionRequest, CreatorDescriptor, EvalError};
pub use relay::{InspectorMessage, RelayKind, RelayMessage, LOG_CHANNEL, RESPOND_CHANNEL};
pub use store::{
    ActionEntry, ActionId, ComputedState, InstrumentOptions, Instrumented, LiftedAction,
    LiftedActionKind, LiftedState, Reducer, StoreAction, INIT_ACTION_KIND,
};
pub use transport::{MessageChannel, TransportError};
