pub(crate) mod controller;
pub mod message;

pub use message::{InspectorMessage, RelayKind, RelayMessage, LOG_CHANNEL, RESPOND_CHANNEL};
