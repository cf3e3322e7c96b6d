//! Inspector configuration surface.

use crate::error::InspectorError;
use crate::filter::FilterOptions;
use crate::store::InstrumentOptions;

/// Everything the host can tune about an installed inspector.
///
/// Built with [`InspectorConfig::default`] plus `with_*` methods; validated
/// once at install time. Misconfiguration fails fast there — nothing later
/// on the relay path is allowed to crash the host.
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    /// Human-readable instance label shown by the inspector.
    pub name: Option<String>,
    /// Persistent instance id; generated when unset.
    pub id: Option<String>,
    /// Connect as soon as the store is installed.
    pub realtime: bool,
    /// Retained dispatched actions; oldest evicted past this. Minimum 2.
    pub max_age: usize,
    /// Capture a call stack per dispatched action.
    pub trace: bool,
    /// Stack frame cap when tracing.
    pub trace_limit: usize,
    /// `false` starts the store paused.
    pub should_record_changes: bool,
    pub should_start_locked: bool,
    /// Recompute history when the reducer is hot-swapped; otherwise reset.
    pub should_hot_reload: bool,
    /// Action type consumed internally, never recorded or relayed.
    pub pause_action_type: String,
    pub filters: FilterOptions,
    /// Action types that connect the relay when seen.
    pub start_on: Vec<String>,
    /// Action types that tear the relay down when seen.
    pub stop_on: Vec<String>,
    /// Action types that trigger a one-shot state push when not connected.
    pub send_on: Vec<String>,
    /// 0 = off, 1 = explicit error hook, 2 = check every dispatch.
    pub send_on_error: u8,
    /// Endpoint for one-shot pushes.
    pub send_to: Option<String>,
    /// Swallow connect failures (log a warning) instead of surfacing them.
    pub suppress_connect_errors: bool,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            name: None,
            id: None,
            realtime: true,
            max_age: 30,
            trace: false,
            trace_limit: 10,
            should_record_changes: true,
            should_start_locked: false,
            should_hot_reload: true,
            pause_action_type: "@@PAUSED".to_string(),
            filters: FilterOptions::default(),
            start_on: Vec::new(),
            stop_on: Vec::new(),
            send_on: Vec::new(),
            send_on_error: 0,
            send_to: None,
            suppress_connect_errors: true,
        }
    }
}

impl InspectorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_max_age(mut self, max_age: usize) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn with_filters(mut self, filters: FilterOptions) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_start_on<I, T>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.start_on = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stop_on<I, T>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.stop_on = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_send_on<I, T>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.send_on = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_send_on_error(mut self, mode: u8) -> Self {
        self.send_on_error = mode;
        self
    }

    pub fn with_send_to(mut self, url: impl Into<String>) -> Self {
        self.send_to = Some(url.into());
        self
    }

    pub fn with_suppress_connect_errors(mut self, suppress: bool) -> Self {
        self.suppress_connect_errors = suppress;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), InspectorError> {
        if self.max_age < 2 {
            return Err(InspectorError::Config(format!(
                "max_age must be at least 2, got {}",
                self.max_age
            )));
        }
        if self.send_on_error > 2 {
            return Err(InspectorError::Config(format!(
                "send_on_error must be 0, 1 or 2, got {}",
                self.send_on_error
            )));
        }
        if self.pause_action_type.is_empty() {
            return Err(InspectorError::Config(
                "pause_action_type must not be empty".to_string(),
            ));
        }
        if (self.send_on_error > 0 || !self.send_on.is_empty()) && self.send_to.is_none() {
            // Not fatal: the one-shot path logs and drops at send time.
            tracing::warn!("send_on/send_on_error configured without a send_to URL");
        }
        Ok(())
    }

    pub(crate) fn instrument_options(&self) -> InstrumentOptions {
        InstrumentOptions {
            max_age: self.max_age,
            should_record_changes: self.should_record_changes,
            should_start_locked: self.should_start_locked,
            should_hot_reload: self.should_hot_reload,
            pause_action_type: self.pause_action_type.clone(),
            trace: self.trace,
            trace_limit: self.trace_limit,
        }
    }
}
