//! Expression and dependency core for animated parameters and functions.
//!
//! Users type definitions such as `k = 5`, `a = 2k`, `f(x) = sin(kx)` or `y = x^2`.
//! This crate classifies and validates them, creates parameters for free symbols, keeps a
//! dependency graph between parameters and functions, recomputes derived values in
//! topological order and samples functions for statistics. Numeric evaluation is delegated
//! to [evalexpr](https://github.com/ISibboI/evalexpr).
//!
//! # Features
//!
//! - Symbol normalization (`pi` → `π`, `\alpha` → `α`, `√` → `sqrt`)
//! - Implicit multiplication (`2kx` → `2*k*x`) that leaves builtin calls intact
//! - Coordinate tuples with lists and ranges (`([0..2], [1, 2])`)
//! - Auto-parameterization of free symbols with configurable defaults
//! - Cycle detection with the offending path, checked before anything is committed
//! - Lossless JSON snapshots
//!
//! # Example
//!
//! ```rust
//! use paramflow::prelude::*;
//!
//! let mut ws = Workspace::default();
//! ws.submit("f(x) = sin(kx)").unwrap();
//!
//! // `k` was created with the default value and domain
//! assert_eq!(ws.parameter("k").unwrap().value, Some(1.0));
//!
//! // a self-reference is rejected and leaves the workspace untouched
//! assert!(ws.submit("k = k + 1").is_err());
//! ```

pub use engine::ExpressionEngine;
pub use workspace::{Submission, Workspace};

pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::easing::EasingFormula;
    pub use crate::engine::{CompiledExpression, ExpressionEngine, Scope};
    pub use crate::errors::{EngineError, FunctionError, WorkspaceError};
    pub use crate::snapshot::Snapshot;
    pub use crate::symbols::SymbolRegistry;
    pub use crate::types::{Domain, FunctionDefinition, Parameter, ParsedLhs, ParsedName, Point};
    pub use crate::workspace::{Submission, Workspace};
}

/// Free-symbol binding and call-site validation
pub mod binder;
/// Name collision detection with suggestions
pub mod collision;
/// Engine configuration loaded from JSON
pub mod config;
/// Coordinate, list and range expansion
pub mod coordinates;
/// Easing curves compiled from formulas in `t`
pub mod easing;
/// Expression compilation and evaluation
pub mod engine;
/// Error types for the various failure modes
pub mod errors;
/// Function definitions and sampling statistics
pub mod functions;
/// Dependency graph with topological ordering and cycle detection
pub mod graph;
/// Inserting `*` where multiplication is implied
pub mod implicit_mul;
/// Left-hand-side classification
pub mod lhs;
/// Parameter storage keyed by id and full name
pub mod parameters;
/// Serializable workspace state
pub mod snapshot;
/// Symbol canonicalization and the builtin table
pub mod symbols;
/// Core data model
pub mod types;
/// Links between independent variables and the functions sampled over them
pub mod variables;
/// The explicit context object tying everything together
pub mod workspace;
