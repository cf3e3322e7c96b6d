//! Wire messages exchanged with the inspector surface.
//!
//! Outbound relay events go on the `"log"` channel; remote commands arrive
//! on `"respond"`. Field names follow the inspector protocol (camelCase,
//! CAPS type tags).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::registry::ActionRequest;
use crate::store::{ActionId, LiftedAction};

/// Channel relay events are published on.
pub const LOG_CHANNEL: &str = "log";

/// Channel remote commands arrive on.
pub const RESPOND_CHANNEL: &str = "respond";

/// Kind of an outbound relay event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayKind {
    State,
    Action,
    Start,
    Stop,
    Error,
}

/// One outbound relay event. Constructed per relay call, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMessage {
    #[serde(rename = "type")]
    pub kind: RelayKind,
    /// Persistent instance id of this store.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Per-launch session id.
    pub instance_id: String,
    /// Codec-encoded payload: a lifted state for STATE, the app state for
    /// ACTION, an error message for ERROR.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Codec-encoded action entry (ACTION) or creator catalog (STATE on
    /// observer attach).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Set once the log has hit its retention bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_excess: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action_id: Option<ActionId>,
}

impl RelayMessage {
    pub(crate) fn new(kind: RelayKind, id: String, name: Option<String>, instance_id: String) -> Self {
        Self {
            kind,
            id,
            name,
            instance_id,
            payload: None,
            action: None,
            is_excess: None,
            next_action_id: None,
        }
    }
}

/// Remote commands delivered by the transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
#[serde(bound(deserialize = "S: DeserializeOwned, A: DeserializeOwned"))]
pub enum InspectorMessage<S, A> {
    /// Replace the lifted state with a codec-encoded blob.
    #[serde(rename = "IMPORT")]
    Import { state: String },

    /// Peer reconciliation: import unless the sender is this instance.
    #[serde(rename = "SYNC")]
    Sync {
        state: String,
        #[serde(default)]
        id: Option<serde_json::Value>,
    },

    /// Ask for a fresh STATE relay.
    #[serde(rename = "UPDATE")]
    Update,

    /// An observer attached.
    #[serde(rename = "START")]
    Start,

    /// The observer detached.
    #[serde(rename = "STOP")]
    Stop,

    /// The transport reported the far side gone.
    #[serde(rename = "DISCONNECTED")]
    Disconnected,

    /// Reconstruct and dispatch an app action.
    #[serde(rename = "ACTION")]
    Action { action: ActionRequest },

    /// Dispatch a lifted operation verbatim.
    #[serde(rename = "DISPATCH")]
    Dispatch { action: LiftedAction<S, A> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreAction;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    enum TestAction {
        #[serde(rename = "test/set")]
        Set { value: i64 },
    }

    impl StoreAction for TestAction {
        fn kind(&self) -> &str {
            "test/set"
        }
    }

    #[test]
    fn relay_message_wire_shape() {
        let mut message = RelayMessage::new(
            RelayKind::Action,
            "store-1".to_string(),
            Some("demo".to_string()),
            "session-1".to_string(),
        );
        message.next_action_id = Some(4);

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "ACTION");
        assert_eq!(json["id"], "store-1");
        assert_eq!(json["instanceId"], "session-1");
        assert_eq!(json["nextActionId"], 4);
        assert!(json.get("payload").is_none());
        assert!(json.get("isExcess").is_none());
    }

    #[test]
    fn inbound_dispatch_parses_lifted_action() {
        let raw = json!({
            "type": "DISPATCH",
            "action": {"type": "JUMP_TO_STATE", "index": 2}
        });
        let message: InspectorMessage<i64, TestAction> = serde_json::from_value(raw).unwrap();
        match message {
            InspectorMessage::Dispatch { action } => {
                assert!(matches!(action, LiftedAction::JumpToState { index: 2 }));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn inbound_action_parses_both_request_forms() {
        let raw = json!({"type": "ACTION", "action": "addTodo(\"x\")"});
        let message: InspectorMessage<i64, TestAction> = serde_json::from_value(raw).unwrap();
        assert!(matches!(message, InspectorMessage::Action { .. }));

        let raw = json!({
            "type": "ACTION",
            "action": {"args": [], "rest": "", "selected": 1}
        });
        let message: InspectorMessage<i64, TestAction> = serde_json::from_value(raw).unwrap();
        assert!(matches!(message, InspectorMessage::Action { .. }));
    }

    #[test]
    fn inbound_sync_tolerates_numeric_sender_id() {
        let raw = json!({"type": "SYNC", "state": "{}", "id": 42});
        let message: InspectorMessage<i64, TestAction> = serde_json::from_value(raw).unwrap();
        match message {
            InspectorMessage::Sync { id, .. } => assert_eq!(id, Some(json!(42))),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
