//! Error types for the paramflow crate.
//!
//! Every failure in the definition pipeline is a local, recoverable condition that is
//! handed back to the caller as data. The main error types are:
//!
//! - `EngineError`: parse, validation and domain failures of single expressions
//! - `NameCollision`: a name is already taken by a parameter or a function
//! - `CallError`: a call site with the wrong argument count or an unknown callee
//! - `CycleError`: a definition would close a dependency cycle
//! - `FunctionError`: failures while creating or updating function definitions
//! - `WorkspaceError`: high-level errors surfaced by the `Workspace`
//!
//! Each error type implements the standard Error trait and provides detailed error messages.

use std::fmt;

use evalexpr::{DefaultNumericTypes, EvalexprError};
use thiserror::Error;

use crate::types::{FunctionId, ParameterId};

/// Errors produced while normalizing, validating, compiling or evaluating an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Malformed syntax: wrong `=` count, unmatched brackets, or a parser fault
    #[error("parse error: {0}")]
    Parse(String),
    /// One or more validation rules were violated; all violations are reported together
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    /// The expression evaluated to NaN, a non-number, or left a declared domain
    #[error("domain error: {0}")]
    Domain(String),
}

impl EngineError {
    pub fn parse(msg: impl Into<String>) -> Self {
        EngineError::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(vec![msg.into()])
    }

    pub fn domain(msg: impl Into<String>) -> Self {
        EngineError::Domain(msg.into())
    }

    /// Messages carried by this error, one per violation.
    pub fn messages(&self) -> Vec<String> {
        match self {
            EngineError::Validation(messages) => messages.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl From<EvalexprError<DefaultNumericTypes>> for EngineError {
    fn from(err: EvalexprError<DefaultNumericTypes>) -> Self {
        EngineError::Parse(err.to_string())
    }
}

/// What already owns a colliding name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameOwner {
    Parameter,
    Function,
}

impl fmt::Display for NameOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameOwner::Parameter => write!(f, "parameter"),
            NameOwner::Function => write!(f, "function"),
        }
    }
}

/// A new name is already used by a parameter or a function.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("name '{name}' is already used by a {owner}{}", suggestion_suffix(.suggestions))]
pub struct NameCollision {
    pub name: String,
    pub owner: NameOwner,
    /// Up to three free alternatives, in preference order
    pub suggestions: Vec<String>,
}

fn suggestion_suffix(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (try {})", suggestions.join(", "))
    }
}

/// A problem with a single call site of a non-builtin function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The callee exists but was called with the wrong number of arguments
    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
    /// The callee is neither builtin nor a declared function
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },
}

/// A definition would introduce a dependency cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("circular dependency: {}", .path.join(" -> "))]
pub struct CycleError {
    /// The offending cycle; the first name is repeated at the end
    pub path: Vec<String>,
}

/// A free symbol could not be turned into a parameter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot create parameter '{symbol}': {reason}")]
pub struct BindError {
    pub symbol: String,
    pub reason: String,
}

/// Errors that can occur while creating, updating or sampling function definitions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FunctionError {
    /// The definition text could not be parsed or validated
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// The function name is already in use
    #[error(transparent)]
    Collision(#[from] NameCollision),
    /// One or more free symbols could not be auto-created
    #[error("could not bind free symbols: {}", format_list(.0))]
    Binding(Vec<BindError>),
    /// One or more call sites are invalid
    #[error("invalid function calls: {}", format_list(.0))]
    Calls(Vec<CallError>),
    /// The definition would close a dependency cycle
    #[error(transparent)]
    Cycle(#[from] CycleError),
    /// The left-hand side does not describe a function
    #[error("'{0}' is not a function definition")]
    NotAFunction(String),
    /// No domain-bearing independent variable is available
    #[error("no independent variable is defined")]
    NoIndependentVariable,
    /// The referenced parameter cannot act as an independent variable
    #[error("parameter {0} has no domain and cannot be an independent variable")]
    NotAnIndependentVariable(ParameterId),
    /// No function with the given id exists
    #[error("function {0} not found")]
    NotFound(FunctionId),
    /// Sampling produced no finite value
    #[error("no valid samples")]
    NoValidSamples,
}

/// High-level errors returned by the `Workspace`.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Function(#[from] FunctionError),
    #[error(transparent)]
    Collision(#[from] NameCollision),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("could not bind free symbols: {}", format_list(.0))]
    Binding(Vec<BindError>),
    #[error("invalid function calls: {}", format_list(.0))]
    Calls(Vec<CallError>),
    /// No parameter with the given name exists
    #[error("parameter '{0}' not found")]
    ParameterNotFound(String),
    /// The parameter value is fixed by an expression and cannot be edited directly
    #[error("parameter '{0}' is defined by an expression")]
    DerivedParameter(String),
    /// The snapshot could not be (de)serialized
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
    /// The snapshot is structurally inconsistent
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Errors while loading an `EngineConfig`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid forbidden pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors while loading an external symbol table.
#[derive(Error, Debug)]
pub enum SymbolTableError {
    #[error("failed to parse symbol table: {0}")]
    Json(#[from] serde_json::Error),
    #[error("symbol table is empty")]
    Empty,
    #[error("symbol table entry '{0}' is invalid: {1}")]
    InvalidEntry(String, String),
}

fn format_list<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_message_lists_suggestions() {
        let err = NameCollision {
            name: "k".to_string(),
            owner: NameOwner::Function,
            suggestions: vec!["k_{1}".to_string(), "k'".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "name 'k' is already used by a function (try k_{1}, k')"
        );
    }

    #[test]
    fn test_cycle_message_shows_path() {
        let err = CycleError {
            path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "circular dependency: a -> b -> a");
    }

    #[test]
    fn test_validation_messages_are_joined() {
        let err = EngineError::Validation(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(err.to_string(), "validation failed: first; second");
        assert_eq!(err.messages().len(), 2);
    }

    #[test]
    fn test_call_errors_are_distinguishable() {
        let arity = CallError::Arity {
            name: "f".to_string(),
            expected: 1,
            got: 2,
        };
        let unknown = CallError::UnknownFunction {
            name: "g".to_string(),
        };
        assert_ne!(arity, unknown);
        assert!(unknown.to_string().contains("unknown function"));
    }
}
