//! The relay controller: observes every lifted dispatch, decides what to
//! relay, drives the transport lifecycle, and applies remote commands.
//!
//! The controller runs as one task per installed store. Dispatches stay
//! synchronous and run to completion on the caller's thread; they only post
//! a change notice onto the controller's queue, so relay work (and command
//! handling that re-dispatches) never re-enters a dispatch in progress.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::codec;
use crate::config::InspectorConfig;
use crate::filter::{
    filter_staged_actions, sanitize_lifted, ActionFilter, ActionSanitizer, StateSanitizer,
};
use crate::registry::{ActionCreatorRegistry, ActionRequest};
use crate::relay::message::{
    InspectorMessage, RelayKind, RelayMessage, LOG_CHANNEL, RESPOND_CHANNEL,
};
use crate::store::{
    ActionId, Instrumented, LiftedAction, LiftedActionKind, LiftedState, StoreAction,
};
use crate::transport::{MessageChannel, TransportError};

/// Connection/observation state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Disconnected,
    Connecting,
    /// Transport up, no observer attached.
    Idle,
    /// An observer is watching; state changes are relayed.
    Monitored,
}

/// Notice posted from the dispatch path to the controller task.
#[derive(Debug)]
pub(crate) enum StoreEvent {
    Change {
        kind: LiftedActionKind,
        /// App action type for PERFORM_ACTION changes.
        action_kind: Option<String>,
        /// Id of the newly staged entry, when one was actually appended.
        staged_id: Option<ActionId>,
    },
    /// Host-reported error (the explicit `send_on_error = 1` hook).
    ErrorReported { message: String },
    Shutdown,
}

/// Dispatch a lifted action on the shared store and post the change notice.
///
/// This is the single write path both the host handle and the controller's
/// command application go through.
pub(crate) fn dispatch_on<S, A>(
    store: &Mutex<Instrumented<S, A>>,
    events: &mpsc::UnboundedSender<StoreEvent>,
    action: LiftedAction<S, A>,
) where
    S: Clone,
    A: StoreAction,
{
    let (kind, action_kind, staged_id) = {
        let mut store = store.lock();
        let action_kind = match &action {
            LiftedAction::PerformAction { action, .. } => Some(action.kind().to_string()),
            _ => None,
        };
        let before = store.lifted_state().next_action_id;
        let kind = store.dispatch_lifted(action);
        let after = store.lifted_state().next_action_id;
        (kind, action_kind, (after > before).then(|| after - 1))
    };
    // The receiver only closes on teardown; a dropped notice is fine then.
    let _ = events.send(StoreEvent::Change {
        kind,
        action_kind,
        staged_id,
    });
}

pub(crate) struct ControllerParts<S, A> {
    pub store: Arc<Mutex<Instrumented<S, A>>>,
    pub transport: Arc<dyn MessageChannel>,
    pub config: InspectorConfig,
    pub filter: Option<ActionFilter>,
    pub state_sanitizer: Option<StateSanitizer<S>>,
    pub action_sanitizer: Option<ActionSanitizer<A>>,
    pub registry: Arc<ActionCreatorRegistry<A>>,
    pub events: mpsc::UnboundedReceiver<StoreEvent>,
    pub loopback: mpsc::UnboundedSender<StoreEvent>,
}

pub(crate) struct RelayController<S, A> {
    store: Arc<Mutex<Instrumented<S, A>>>,
    transport: Arc<dyn MessageChannel>,
    config: InspectorConfig,
    filter: Option<ActionFilter>,
    state_sanitizer: Option<StateSanitizer<S>>,
    action_sanitizer: Option<ActionSanitizer<A>>,
    registry: Arc<ActionCreatorRegistry<A>>,
    events: mpsc::UnboundedReceiver<StoreEvent>,
    loopback: mpsc::UnboundedSender<StoreEvent>,
    inbound: Option<mpsc::UnboundedReceiver<String>>,
    phase: ControllerPhase,
    transport_open: bool,
    /// Persistent instance id, stable across reconnects.
    instance_id: String,
    /// Per-launch session id.
    app_instance_id: String,
    is_excess: bool,
    last_error: Option<String>,
    http: reqwest::Client,
}

impl<S, A> RelayController<S, A>
where
    S: Clone + Serialize + DeserializeOwned + Send + 'static,
    A: StoreAction,
{
    pub(crate) fn new(parts: ControllerParts<S, A>) -> Self {
        let instance_id = parts
            .config
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        Self {
            store: parts.store,
            transport: parts.transport,
            config: parts.config,
            filter: parts.filter,
            state_sanitizer: parts.state_sanitizer,
            action_sanitizer: parts.action_sanitizer,
            registry: parts.registry,
            events: parts.events,
            loopback: parts.loopback,
            inbound: None,
            phase: ControllerPhase::Disconnected,
            transport_open: false,
            instance_id,
            app_instance_id: uuid::Uuid::new_v4().simple().to_string(),
            is_excess: false,
            last_error: None,
            http: reqwest::Client::new(),
        }
    }

    pub(crate) fn phase(&self) -> ControllerPhase {
        self.phase
    }

    fn started(&self) -> bool {
        matches!(self.phase, ControllerPhase::Idle | ControllerPhase::Monitored)
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(StoreEvent::Shutdown) | None => {
                        if let Err(err) = self.stop().await {
                            tracing::warn!(error = %err, "transport close failed during shutdown");
                        }
                        break;
                    }
                    Some(StoreEvent::Change { kind, action_kind, staged_id }) => {
                        self.on_change(kind, action_kind, staged_id).await;
                    }
                    Some(StoreEvent::ErrorReported { message }) => {
                        self.on_error_reported(message).await;
                    }
                },
                inbound = recv_inbound(&mut self.inbound) => match inbound {
                    Some(raw) => self.on_inspector_payload(&raw).await,
                    None => self.on_transport_disconnected(),
                },
            }
        }
    }

    /// Connect the transport and announce this instance. No-op when already
    /// connected; a failure leaves the controller disconnected.
    pub(crate) async fn start(&mut self) -> Result<(), TransportError> {
        if self.started() {
            return Ok(());
        }
        self.phase = ControllerPhase::Connecting;
        match self.transport.connect().await {
            Ok(()) => {
                self.transport_open = true;
                self.inbound = Some(self.transport.add_message_listener(RESPOND_CHANNEL));
                self.phase = ControllerPhase::Idle;
                self.relay(self.message(RelayKind::Start)).await;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to connect inspector transport");
                if let Err(stop_err) = self.stop().await {
                    tracing::debug!(error = %stop_err, "cleanup after failed connect");
                }
                Err(err)
            }
        }
    }

    /// Tear the connection down. Safe to call at any time, any number of
    /// times; a later `start` begins from a clean slate.
    pub(crate) async fn stop(&mut self) -> Result<(), TransportError> {
        self.phase = ControllerPhase::Disconnected;
        self.inbound = None;
        if !self.transport_open {
            return Ok(());
        }
        self.transport_open = false;
        self.transport.close().await
    }

    async fn on_change(
        &mut self,
        kind: LiftedActionKind,
        action_kind: Option<String>,
        staged_id: Option<ActionId>,
    ) {
        if !self.started() && self.config.send_on_error == 2 {
            self.check_for_reducer_errors().await;
        } else if kind == LiftedActionKind::PerformAction {
            if let Some(action_kind) = action_kind.as_deref() {
                self.lifecycle_triggers(action_kind).await;
            }
        }

        if self.phase == ControllerPhase::Monitored {
            self.handle_change(kind, staged_id).await;
        }
    }

    async fn lifecycle_triggers(&mut self, action_kind: &str) {
        if !self.started() && self.config.start_on.iter().any(|k| k == action_kind) {
            if let Err(err) = self.start().await {
                tracing::warn!(error = %err, action = action_kind, "start trigger failed");
            }
        } else if self.started() && self.config.stop_on.iter().any(|k| k == action_kind) {
            if let Err(err) = self.stop().await {
                tracing::warn!(error = %err, action = action_kind, "stop trigger failed");
            }
        } else if !self.started() && self.config.send_on.iter().any(|k| k == action_kind) {
            self.send_snapshot();
        }
    }

    async fn handle_change(&mut self, kind: LiftedActionKind, staged_id: Option<ActionId>) {
        if self.check_for_reducer_errors().await {
            return;
        }
        match kind {
            LiftedActionKind::PerformAction => {
                let Some(id) = staged_id else {
                    // Nothing was appended: refused while locked, a consumed
                    // marker, or a paused in-place update. Only the paused
                    // case changed visible state.
                    let paused = self.store.lock().lifted_state().is_paused;
                    if paused {
                        self.relay_full_state(false).await;
                    }
                    return;
                };
                self.relay_newest_action(id).await;
            }
            // Pure pointer move; the observer already has every state.
            LiftedActionKind::JumpToState => {}
            _ => self.relay_full_state(false).await,
        }
    }

    /// Relay only the newest action+state pair, not the whole log.
    async fn relay_newest_action(&mut self, id: ActionId) {
        let prepared = {
            let store = self.store.lock();
            let lifted = store.lifted_state();
            let Some(entry) = lifted.actions_by_id.get(&id) else {
                return;
            };
            if let Some(filter) = &self.filter {
                if !filter.should_include(entry.kind()) {
                    return;
                }
            }

            let mut entry = entry.clone();
            if let Some(sanitize) = &self.action_sanitizer {
                if let Some(action) = entry.action.as_ref() {
                    entry.action = Some(sanitize(action, id));
                }
            }
            let head_index = lifted.computed_states.len() - 1;
            let state = match &self.state_sanitizer {
                Some(sanitize) => sanitize(&lifted.head().state, head_index),
                None => lifted.head().state.clone(),
            };

            match (serde_json::to_value(&state), serde_json::to_value(&entry)) {
                (Ok(state_json), Ok(entry_json)) => {
                    Some((state_json, entry_json, lifted.next_action_id, lifted.recorded_len()))
                }
                (Err(err), _) | (_, Err(err)) => {
                    tracing::warn!(error = %err, "failed to serialize action relay");
                    None
                }
            }
        };
        let Some((state_json, entry_json, next_action_id, recorded)) = prepared else {
            return;
        };

        let mut message = self.message(RelayKind::Action);
        message.payload = Some(codec::encode_json(&state_json));
        message.action = Some(codec::encode_json(&entry_json));
        message.is_excess = Some(self.is_excess);
        message.next_action_id = Some(next_action_id);
        self.relay(message).await;

        if !self.is_excess {
            self.is_excess = recorded >= self.config.max_age;
        }
    }

    /// Relay the whole filtered, sanitized lifted state.
    async fn relay_full_state(&mut self, with_catalog: bool) {
        let payload = {
            let store = self.store.lock();
            let mut view = filter_staged_actions(store.lifted_state(), self.filter.as_ref());
            sanitize_lifted(
                &mut view,
                self.state_sanitizer.as_ref(),
                self.action_sanitizer.as_ref(),
            );
            match serde_json::to_value(&view) {
                Ok(json) => Some(codec::encode_json(&json)),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to serialize lifted state");
                    None
                }
            }
        };
        let Some(payload) = payload else { return };

        let mut message = self.message(RelayKind::State);
        message.payload = Some(payload);
        if with_catalog && !self.registry.is_empty() {
            match serde_json::to_value(self.registry.catalog()) {
                Ok(json) => message.action = Some(codec::encode_json(&json)),
                Err(err) => tracing::warn!(error = %err, "failed to serialize creator catalog"),
            }
        }
        self.relay(message).await;
    }

    /// When the current computed state carries a reducer error, relay or
    /// push it (deduplicated) and report that the change is handled.
    async fn check_for_reducer_errors(&mut self) -> bool {
        let error = {
            let store = self.store.lock();
            store.lifted_state().current().error.clone()
        };
        let Some(message) = error else {
            self.last_error = None;
            return false;
        };
        if self.last_error.as_deref() == Some(message.as_str()) {
            return true;
        }
        self.last_error = Some(message);
        if self.started() {
            self.relay_full_state(false).await;
        } else {
            self.send_snapshot();
        }
        true
    }

    async fn on_error_reported(&mut self, message: String) {
        // The explicit hook is only live in mode 1.
        if self.config.send_on_error != 1 {
            return;
        }
        if self.last_error.as_deref() == Some(message.as_str()) {
            return;
        }
        self.last_error = Some(message.clone());
        if self.started() {
            let mut out = self.message(RelayKind::Error);
            out.payload = Some(message);
            self.relay(out).await;
        } else {
            self.send_snapshot();
        }
    }

    async fn on_inspector_payload(&mut self, raw: &str) {
        let message: InspectorMessage<S, A> = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "undecodable inspector message");
                self.relay_error(format!("malformed inspector message: {err}")).await;
                return;
            }
        };
        self.apply_command(message).await;
    }

    pub(crate) async fn apply_command(&mut self, message: InspectorMessage<S, A>) {
        match message {
            InspectorMessage::Import { state } => self.import_state(&state).await,
            InspectorMessage::Sync { state, id } => {
                let sender = id.as_ref().map(sender_id);
                if sender.as_deref() != Some(self.instance_id.as_str()) {
                    self.import_state(&state).await;
                }
            }
            InspectorMessage::Update => self.relay_full_state(false).await,
            InspectorMessage::Start => {
                self.phase = ControllerPhase::Monitored;
                self.relay_full_state(true).await;
            }
            InspectorMessage::Stop | InspectorMessage::Disconnected => {
                if self.phase == ControllerPhase::Monitored {
                    self.phase = ControllerPhase::Idle;
                }
                self.relay(self.message(RelayKind::Stop)).await;
            }
            InspectorMessage::Action { action } => self.dispatch_remotely(&action).await,
            InspectorMessage::Dispatch { action } => self.dispatch_local(action),
        }
    }

    async fn import_state(&mut self, encoded: &str) {
        let decoded = codec::decode_to_json(encoded)
            .map_err(|err| err.to_string())
            .and_then(|json| {
                serde_json::from_value::<LiftedState<S, A>>(json).map_err(|err| err.to_string())
            });
        match decoded {
            Ok(next_lifted_state) => self.dispatch_local(LiftedAction::ImportState {
                next_lifted_state,
                preloaded_state: None,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "failed to decode imported state");
                self.relay_error(format!("failed to import state: {err}")).await;
            }
        }
    }

    async fn dispatch_remotely(&mut self, request: &ActionRequest) {
        match self.registry.eval(request) {
            Ok(action) => self.dispatch_local(LiftedAction::PerformAction {
                action,
                timestamp: None,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "failed to reconstruct remote action");
                self.relay_error(err.to_string()).await;
            }
        }
    }

    /// Dispatch through the shared write path; the resulting change notice
    /// arrives on the queue and is relayed on a later loop turn.
    fn dispatch_local(&self, action: LiftedAction<S, A>) {
        dispatch_on(&self.store, &self.loopback, action);
    }

    async fn relay_error(&mut self, message: String) {
        if self.last_error.as_deref() == Some(message.as_str()) {
            return;
        }
        self.last_error = Some(message.clone());
        let mut out = self.message(RelayKind::Error);
        out.payload = Some(message);
        self.relay(out).await;
    }

    fn message(&self, kind: RelayKind) -> RelayMessage {
        RelayMessage::new(
            kind,
            self.instance_id.clone(),
            self.config.name.clone(),
            self.app_instance_id.clone(),
        )
    }

    async fn relay(&self, message: RelayMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize relay message");
                return;
            }
        };
        // At-most-once: a failed send is logged and the event dropped.
        if let Err(err) = self.transport.send_message(LOG_CHANNEL, json).await {
            tracing::warn!(error = %err, kind = ?message.kind, "relay send failed, dropping event");
        }
    }

    /// One-shot fire-and-forget state push to the configured endpoint.
    fn send_snapshot(&self) {
        let Some(url) = self.config.send_to.clone() else {
            tracing::warn!("cannot push snapshot: send_on/send_on_error need a send_to URL");
            return;
        };
        let payload = {
            let store = self.store.lock();
            let mut view = filter_staged_actions(store.lifted_state(), self.filter.as_ref());
            sanitize_lifted(
                &mut view,
                self.state_sanitizer.as_ref(),
                self.action_sanitizer.as_ref(),
            );
            match serde_json::to_value(&view) {
                Ok(json) => codec::encode_json(&json),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to serialize snapshot");
                    return;
                }
            }
        };
        let body = serde_json::json!({
            "type": "STATE",
            "id": self.instance_id,
            "name": self.config.name,
            "payload": payload,
        });
        let request = self.http.post(&url).json(&body);
        tokio::spawn(async move {
            if let Err(err) = request.send().await {
                tracing::warn!(error = %err, url, "one-shot state push failed");
            }
        });
    }

    fn on_transport_disconnected(&mut self) {
        tracing::debug!("inspector transport dropped its listener");
        self.inbound = None;
        if self.phase == ControllerPhase::Monitored {
            self.phase = ControllerPhase::Idle;
        }
    }
}

async fn recv_inbound(inbound: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn sender_id(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
