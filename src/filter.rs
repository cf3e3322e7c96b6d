//! Action filtering and payload sanitization for relayed state.
//!
//! Allow/deny lists come from configuration (with deprecated alias keys) and
//! compile once into alternation regexes; the relay path consults the
//! compiled filter per action and strips denied branches from full-state
//! payloads before serialization.

use std::sync::Arc;

use regex::Regex;

use crate::store::{ActionId, ComputedState, LiftedState, StoreAction};

/// Filter lists as configured by the host.
///
/// `blacklist`/`whitelist` are deprecated aliases; they apply only where the
/// corresponding `denylist`/`allowlist` is unset.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub allowlist: Vec<String>,
    pub denylist: Vec<String>,
    /// Deprecated alias for `denylist`.
    pub blacklist: Vec<String>,
    /// Deprecated alias for `allowlist`.
    pub whitelist: Vec<String>,
}

impl FilterOptions {
    pub fn is_empty(&self) -> bool {
        self.allowlist.is_empty()
            && self.denylist.is_empty()
            && self.blacklist.is_empty()
            && self.whitelist.is_empty()
    }
}

/// Compiled include/exclude decision over action type tags.
///
/// Entries are regex patterns; a denylist hit always wins over an allowlist
/// hit.
#[derive(Debug, Clone)]
pub struct ActionFilter {
    allow: Option<Regex>,
    deny: Option<Regex>,
}

impl ActionFilter {
    /// Compile the configured lists. Returns `None` when no list is set, so
    /// the relay path can skip filtering entirely.
    pub fn from_options(options: &FilterOptions) -> Result<Option<Self>, regex::Error> {
        if options.is_empty() {
            return Ok(None);
        }
        if !options.blacklist.is_empty() || !options.whitelist.is_empty() {
            tracing::warn!(
                "filters.blacklist/whitelist are deprecated; use denylist/allowlist"
            );
        }
        let deny = effective(&options.denylist, &options.blacklist);
        let allow = effective(&options.allowlist, &options.whitelist);
        Ok(Some(Self {
            allow: compile(allow)?,
            deny: compile(deny)?,
        }))
    }

    /// Whether an action type belongs in relayed payloads.
    pub fn should_include(&self, action_kind: &str) -> bool {
        if let Some(deny) = &self.deny {
            if deny.is_match(action_kind) {
                return false;
            }
        }
        match &self.allow {
            Some(allow) => allow.is_match(action_kind),
            None => true,
        }
    }
}

fn effective<'a>(preferred: &'a [String], deprecated: &'a [String]) -> &'a [String] {
    if preferred.is_empty() {
        deprecated
    } else {
        preferred
    }
}

fn compile(patterns: &[String]) -> Result<Option<Regex>, regex::Error> {
    if patterns.is_empty() {
        return Ok(None);
    }
    Regex::new(&patterns.join("|")).map(Some)
}

/// Pure state transform applied before serialization; receives the computed
/// state index.
pub type StateSanitizer<S> = Arc<dyn Fn(&S, usize) -> S + Send + Sync>;

/// Pure action transform applied before serialization; receives the action
/// id.
pub type ActionSanitizer<A> = Arc<dyn Fn(&A, ActionId) -> A + Send + Sync>;

/// A lifted-state view containing only staged actions passing the filter.
///
/// The initial entry (id 0) is always kept and the current pointer is
/// remapped to the nearest retained index.
pub fn filter_staged_actions<S, A>(
    lifted: &LiftedState<S, A>,
    filter: Option<&ActionFilter>,
) -> LiftedState<S, A>
where
    S: Clone,
    A: StoreAction,
{
    let Some(filter) = filter else {
        return lifted.clone();
    };

    let mut out = LiftedState {
        actions_by_id: Default::default(),
        next_action_id: lifted.next_action_id,
        staged_action_ids: Vec::new(),
        skipped_action_ids: Default::default(),
        committed_state: lifted.committed_state.clone(),
        current_state_index: 0,
        computed_states: Vec::new(),
        is_locked: lifted.is_locked,
        is_paused: lifted.is_paused,
    };

    for (index, id) in lifted.staged_action_ids.iter().enumerate() {
        let Some(entry) = lifted.actions_by_id.get(id) else {
            continue;
        };
        if index > 0 && !filter.should_include(entry.kind()) {
            continue;
        }
        out.actions_by_id.insert(*id, entry.clone());
        out.staged_action_ids.push(*id);
        out.computed_states.push(lifted.computed_states[index].clone());
        if lifted.skipped_action_ids.contains(id) {
            out.skipped_action_ids.insert(*id);
        }
        if index <= lifted.current_state_index {
            out.current_state_index = out.staged_action_ids.len() - 1;
        }
    }
    out
}

/// Apply sanitizers across a lifted-state view in place. Inputs are never
/// mutated; each step receives a fresh copy.
pub fn sanitize_lifted<S, A>(
    lifted: &mut LiftedState<S, A>,
    state_sanitizer: Option<&StateSanitizer<S>>,
    action_sanitizer: Option<&ActionSanitizer<A>>,
) where
    S: Clone,
    A: StoreAction,
{
    if let Some(sanitize) = state_sanitizer {
        for (index, computed) in lifted.computed_states.iter_mut().enumerate() {
            computed.state = sanitize(&computed.state, index);
        }
        lifted.committed_state = sanitize(&lifted.committed_state, 0);
    }
    if let Some(sanitize) = action_sanitizer {
        for (id, entry) in lifted.actions_by_id.iter_mut() {
            if let Some(action) = entry.action.as_ref() {
                entry.action = Some(sanitize(action, *id));
            }
        }
    }
}

/// Trim a full-state payload down to the current computed state only, for
/// exports that should not carry the whole log.
pub fn only_current_state<S, A>(lifted: &LiftedState<S, A>) -> ComputedState<S>
where
    S: Clone,
{
    lifted.current().clone()
}
