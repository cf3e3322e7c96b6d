//! Public wiring: wrap a reducer with history instrumentation and a relay
//! controller, and hand the host a dispatchable store handle.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::codec::{self, CodecError};
use crate::config::InspectorConfig;
use crate::error::InspectorError;
use crate::filter::{ActionFilter, ActionSanitizer, StateSanitizer};
use crate::registry::ActionCreatorRegistry;
use crate::relay::controller::{dispatch_on, ControllerParts, RelayController, StoreEvent};
use crate::store::{Instrumented, LiftedAction, LiftedState, Reducer, StoreAction};
use crate::transport::MessageChannel;

/// Builder for one inspected store.
///
/// Every installed store gets its own context — store, controller task,
/// transport listener — so several can coexist in one process without
/// shared state.
pub struct Inspector<S, A> {
    config: InspectorConfig,
    state_sanitizer: Option<StateSanitizer<S>>,
    action_sanitizer: Option<ActionSanitizer<A>>,
    registry: ActionCreatorRegistry<A>,
}

impl<S, A> Inspector<S, A>
where
    S: Clone + Serialize + DeserializeOwned + Send + 'static,
    A: StoreAction,
{
    pub fn new(config: InspectorConfig) -> Self {
        Self {
            config,
            state_sanitizer: None,
            action_sanitizer: None,
            registry: ActionCreatorRegistry::new(),
        }
    }

    /// Pure transform applied to states before they leave the process.
    pub fn with_state_sanitizer(
        mut self,
        sanitize: impl Fn(&S, usize) -> S + Send + Sync + 'static,
    ) -> Self {
        self.state_sanitizer = Some(Arc::new(sanitize));
        self
    }

    /// Pure transform applied to actions before they leave the process.
    pub fn with_action_sanitizer(
        mut self,
        sanitize: impl Fn(&A, crate::store::ActionId) -> A + Send + Sync + 'static,
    ) -> Self {
        self.action_sanitizer = Some(Arc::new(sanitize));
        self
    }

    /// Creator catalog for remotely issued actions.
    pub fn with_action_creators(mut self, registry: ActionCreatorRegistry<A>) -> Self {
        self.registry = registry;
        self
    }

    /// Validate the configuration, wrap the reducer, and spawn the relay
    /// controller. Must run inside a tokio runtime.
    ///
    /// With `realtime` (the default) the transport is connected here; a
    /// connect failure is logged and swallowed unless
    /// `suppress_connect_errors` is off, in which case it surfaces.
    pub async fn install(
        self,
        reducer: impl Reducer<S, A> + 'static,
        preloaded: S,
        transport: Arc<dyn MessageChannel>,
    ) -> Result<DevStore<S, A>, InspectorError> {
        self.config.validate()?;
        let filter = ActionFilter::from_options(&self.config.filters)?;
        let store = Arc::new(Mutex::new(Instrumented::new(
            Arc::new(reducer),
            preloaded,
            self.config.instrument_options(),
        )));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let realtime = self.config.realtime;
        let suppress_connect_errors = self.config.suppress_connect_errors;
        let mut controller = RelayController::new(ControllerParts {
            store: store.clone(),
            transport,
            config: self.config,
            filter,
            state_sanitizer: self.state_sanitizer,
            action_sanitizer: self.action_sanitizer,
            registry: Arc::new(self.registry),
            events: events_rx,
            loopback: events_tx.clone(),
        });

        if realtime {
            if let Err(err) = controller.start().await {
                if !suppress_connect_errors {
                    return Err(err.into());
                }
            }
        }
        tokio::spawn(controller.run());

        Ok(DevStore {
            store,
            events: events_tx,
        })
    }
}

/// Handle to an inspected store.
///
/// Dispatches are synchronous and run to completion on the calling thread;
/// relay work happens on the controller task afterwards. Clones share the
/// same store.
pub struct DevStore<S, A> {
    store: Arc<Mutex<Instrumented<S, A>>>,
    events: mpsc::UnboundedSender<StoreEvent>,
}

impl<S, A> Clone for DevStore<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            events: self.events.clone(),
        }
    }
}

impl<S, A> std::fmt::Debug for DevStore<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevStore").finish_non_exhaustive()
    }
}

impl<S, A> DevStore<S, A>
where
    S: Clone + Serialize + DeserializeOwned + Send + 'static,
    A: StoreAction,
{
    /// Dispatch a host action and return the resulting current state.
    pub fn dispatch(&self, action: A) -> S {
        dispatch_on(
            &self.store,
            &self.events,
            LiftedAction::PerformAction {
                action,
                timestamp: None,
            },
        );
        self.state()
    }

    /// Dispatch a lifted operation (jump, toggle, import, ...) directly.
    pub fn dispatch_lifted(&self, action: LiftedAction<S, A>) {
        dispatch_on(&self.store, &self.events, action);
    }

    /// The app state the current pointer selects.
    pub fn state(&self) -> S {
        self.store.lock().state().clone()
    }

    /// A snapshot of the full lifted state.
    pub fn lifted_state(&self) -> LiftedState<S, A> {
        self.store.lock().lifted_state().clone()
    }

    /// Serialize the full history into an opaque blob the host can stash
    /// wherever it likes.
    pub fn export(&self) -> Result<String, InspectorError> {
        let json = serde_json::to_value(self.store.lock().lifted_state())
            .map_err(|err| InspectorError::Codec(CodecError::Parse(err)))?;
        Ok(codec::encode_json(&json))
    }

    /// Replace the history from a blob produced by [`DevStore::export`] (or
    /// by a peer instance).
    pub fn import(&self, blob: &str) -> Result<(), InspectorError> {
        let json = codec::decode_to_json(blob)?;
        let next_lifted_state: LiftedState<S, A> = serde_json::from_value(json)
            .map_err(|err| InspectorError::Codec(CodecError::Parse(err)))?;
        self.dispatch_lifted(LiftedAction::ImportState {
            next_lifted_state,
            preloaded_state: None,
        });
        Ok(())
    }

    /// Report a host-side error to the inspector (the `send_on_error = 1`
    /// hook). Consecutive identical messages are relayed at most once.
    pub fn report_error(&self, message: impl Into<String>) {
        let _ = self.events.send(StoreEvent::ErrorReported {
            message: message.into(),
        });
    }

    /// Hot-swap the reducer. With `should_hot_reload` the history is
    /// recomputed under the new reducer; otherwise it resets.
    pub fn replace_reducer(&self, reducer: impl Reducer<S, A> + 'static) {
        self.store.lock().replace_reducer(Arc::new(reducer));
        // History changed wholesale; observers get a full state relay.
        let _ = self.events.send(StoreEvent::Change {
            kind: crate::store::LiftedActionKind::ImportState,
            action_kind: None,
            staged_id: None,
        });
    }

    /// Tear the relay down. Idempotent; the store handle keeps working
    /// locally afterwards.
    pub fn close(&self) {
        let _ = self.events.send(StoreEvent::Shutdown);
    }
}
