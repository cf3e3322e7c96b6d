//! Explicit action-creator registry for remotely issued actions.
//!
//! The inspector can ask the store to dispatch an action it does not have a
//! concrete value for, either as a `"name(arg, …)"` expression or as a
//! structured form selecting a creator by index. Creators are registered by
//! name at configuration time and looked up explicitly; every failure path
//! (unknown creator, malformed arguments, arity mismatch) is a recoverable
//! error the relay surfaces as an ERROR event.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

/// Constructor from positional JSON arguments to a concrete action.
pub type CreatorFn<A> = Arc<dyn Fn(Vec<Json>) -> Result<A, EvalError> + Send + Sync>;

/// Errors from reconstructing a remote action request.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("unknown action creator: {0}")]
    UnknownCreator(String),

    #[error("no action creator at index {0}")]
    UnknownIndex(usize),

    #[error("{creator} expects {expected} argument(s), got {got}")]
    Arity {
        creator: String,
        expected: usize,
        got: usize,
    },

    #[error("malformed action expression: {0}")]
    Expression(String),

    #[error("invalid argument: {0}")]
    Argument(String),
}

/// The inbound ACTION request payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ActionRequest {
    /// `"name(arg, …)"` expression form.
    Expression(String),
    /// Structured form: per-parameter argument strings, an optional rest
    /// list, and the selected creator index.
    Structured {
        args: Vec<String>,
        #[serde(default)]
        rest: String,
        selected: usize,
    },
}

/// Serializable catalog entry relayed to the inspector when an observer
/// attaches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatorDescriptor {
    pub name: String,
    pub args: Vec<String>,
}

struct RegisteredCreator<A> {
    name: String,
    params: Vec<String>,
    build: CreatorFn<A>,
}

/// Name-indexed catalog of action creators.
pub struct ActionCreatorRegistry<A> {
    creators: Vec<RegisteredCreator<A>>,
    by_name: HashMap<String, usize>,
}

impl<A> Default for ActionCreatorRegistry<A> {
    fn default() -> Self {
        Self {
            creators: Vec::new(),
            by_name: HashMap::new(),
        }
    }
}

impl<A> ActionCreatorRegistry<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.creators.is_empty()
    }

    /// Register a creator under a name with its declared parameter names.
    /// Re-registering a name replaces the earlier creator.
    pub fn register(
        mut self,
        name: impl Into<String>,
        params: &[&str],
        build: impl Fn(Vec<Json>) -> Result<A, EvalError> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let creator = RegisteredCreator {
            name: name.clone(),
            params: params.iter().map(|p| p.to_string()).collect(),
            build: Arc::new(build),
        };
        if let Some(&index) = self.by_name.get(&name) {
            self.creators[index] = creator;
        } else {
            self.by_name.insert(name, self.creators.len());
            self.creators.push(creator);
        }
        self
    }

    /// The catalog relayed to the inspector.
    pub fn catalog(&self) -> Vec<CreatorDescriptor> {
        self.creators
            .iter()
            .map(|creator| CreatorDescriptor {
                name: creator.name.clone(),
                args: creator.params.clone(),
            })
            .collect()
    }

    /// Reconstruct a concrete action from an inbound request.
    pub fn eval(&self, request: &ActionRequest) -> Result<A, EvalError> {
        match request {
            ActionRequest::Expression(expr) => {
                let (name, args) = parse_expression(expr)?;
                let index = *self
                    .by_name
                    .get(name)
                    .ok_or_else(|| EvalError::UnknownCreator(name.to_string()))?;
                self.invoke(index, args)
            }
            ActionRequest::Structured {
                args,
                rest,
                selected,
            } => {
                if *selected >= self.creators.len() {
                    return Err(EvalError::UnknownIndex(*selected));
                }
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(parse_argument(arg)?);
                }
                if !rest.trim().is_empty() {
                    values.extend(parse_argument_list(rest)?);
                }
                self.invoke(*selected, values)
            }
        }
    }

    fn invoke(&self, index: usize, args: Vec<Json>) -> Result<A, EvalError> {
        let creator = &self.creators[index];
        if args.len() != creator.params.len() {
            return Err(EvalError::Arity {
                creator: creator.name.clone(),
                expected: creator.params.len(),
                got: args.len(),
            });
        }
        (creator.build)(args)
    }
}

fn parse_expression(expr: &str) -> Result<(&str, Vec<Json>), EvalError> {
    let expr = expr.trim();
    let Some(open) = expr.find('(') else {
        // Bare name is a zero-argument call.
        if expr.is_empty() {
            return Err(EvalError::Expression("empty expression".to_string()));
        }
        return Ok((expr, Vec::new()));
    };
    if !expr.ends_with(')') {
        return Err(EvalError::Expression(format!(
            "missing closing parenthesis in {expr:?}"
        )));
    }
    let name = expr[..open].trim();
    if name.is_empty() {
        return Err(EvalError::Expression(format!("missing creator name in {expr:?}")));
    }
    let inside = &expr[open + 1..expr.len() - 1];
    if inside.trim().is_empty() {
        return Ok((name, Vec::new()));
    }
    Ok((name, parse_argument_list(inside)?))
}

fn parse_argument(arg: &str) -> Result<Json, EvalError> {
    serde_json::from_str(arg.trim()).map_err(|err| EvalError::Argument(format!("{arg:?}: {err}")))
}

fn parse_argument_list(list: &str) -> Result<Vec<Json>, EvalError> {
    serde_json::from_str(&format!("[{list}]"))
        .map_err(|err| EvalError::Argument(format!("{list:?}: {err}")))
}
