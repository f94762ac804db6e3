//! Free-symbol binding and call-site validation.
//!
//! Every variable a right-hand side reads is sorted into one of four buckets: formal
//! parameters (ignored), builtins, names that already exist, and free symbols. Free
//! symbols are handed to a creation callback which stages a new parameter for each; the
//! binder itself never inserts anything, so a rejected definition leaves no trace.

use crate::engine::{CompiledExpression, ExpressionEngine, FunctionCall};
use crate::errors::{BindError, CallError, NameOwner};
use crate::types::{Parameter, ParsedLhs, ParsedName};

/// Outcome of binding the free symbols of an expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindResult {
    /// Staged parameters, one per free symbol, in name order
    pub created: Vec<Parameter>,
    /// Symbols that already name a parameter
    pub existing: Vec<String>,
    pub builtins: Vec<String>,
    pub errors: Vec<BindError>,
}

impl BindResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Binds the symbols read by `rhs`.
///
/// `owner_of` reports who holds a name; `create` stages a parameter for a free symbol or
/// explains why it cannot.
pub fn bind_expression<L, C>(
    engine: &ExpressionEngine,
    rhs: &CompiledExpression,
    formal_params: &[String],
    owner_of: L,
    mut create: C,
) -> BindResult
where
    L: Fn(&str) -> Option<NameOwner>,
    C: FnMut(ParsedName) -> Result<Parameter, String>,
{
    let mut result = BindResult::default();
    for symbol in engine.variables_of(rhs) {
        if formal_params.contains(&symbol) {
            continue;
        }
        if engine.symbols().is_builtin(&symbol) {
            result.builtins.push(symbol);
            continue;
        }
        match owner_of(&symbol) {
            Some(NameOwner::Parameter) => result.existing.push(symbol),
            Some(NameOwner::Function) => result.errors.push(BindError {
                reason: format!("'{}' is a function, call it as {}(...)", symbol, symbol),
                symbol,
            }),
            None => match engine.parse_lhs(&symbol) {
                Some(ParsedLhs::Parameter(name)) => match create(name) {
                    Ok(parameter) => result.created.push(parameter),
                    Err(reason) => result.errors.push(BindError { symbol, reason }),
                },
                _ => result.errors.push(BindError {
                    reason: "not a valid parameter name".to_string(),
                    symbol,
                }),
            },
        }
    }
    result
}

/// Checks every call site against the arity of its callee.
///
/// `arity_of` covers builtin and user functions alike; a callee it does not know is
/// reported as unknown.
pub fn validate_function_calls<A>(calls: &[FunctionCall], arity_of: A) -> Vec<CallError>
where
    A: Fn(&str) -> Option<usize>,
{
    calls
        .iter()
        .filter_map(|call| match arity_of(&call.name) {
            None => Some(CallError::UnknownFunction {
                name: call.name.clone(),
            }),
            Some(expected) if expected != call.args => Some(CallError::Arity {
                name: call.name.clone(),
                expected,
                got: call.args,
            }),
            Some(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParameterId;

    fn bind(
        engine: &ExpressionEngine,
        rhs: &str,
        formal: &[&str],
        taken: &[(&str, NameOwner)],
    ) -> BindResult {
        let compiled = engine.compile(rhs).unwrap();
        let formal: Vec<String> = formal.iter().map(|s| s.to_string()).collect();
        let mut next = 0;
        bind_expression(
            engine,
            &compiled,
            &formal,
            |name| taken.iter().find(|(n, _)| *n == name).map(|(_, o)| *o),
            |name| {
                next += 1;
                Ok(Parameter::with_value(ParameterId(next), name, 1.0))
            },
        )
    }

    #[test]
    fn test_free_symbols_are_staged() {
        let engine = ExpressionEngine::default();
        let result = bind(&engine, "sin(k*x)", &["x"], &[]);
        assert!(result.is_ok());
        assert_eq!(result.created.len(), 1);
        assert_eq!(result.created[0].full_name(), "k");
        assert!(result.existing.is_empty());
    }

    #[test]
    fn test_existing_and_builtin_symbols() {
        let engine = ExpressionEngine::default();
        let result = bind(&engine, "a*pi + b_{1}", &[], &[("a", NameOwner::Parameter)]);
        assert_eq!(result.existing, vec!["a"]);
        assert_eq!(result.builtins, vec!["π"]);
        assert_eq!(result.created[0].full_name(), "b_{1}");
    }

    #[test]
    fn test_function_used_as_variable_is_an_error() {
        let engine = ExpressionEngine::default();
        let result = bind(&engine, "f + 1", &[], &[("f", NameOwner::Function)]);
        assert!(!result.is_ok());
        assert_eq!(result.errors[0].symbol, "f");
    }

    #[test]
    fn test_create_failures_are_collected() {
        let engine = ExpressionEngine::default();
        let compiled = engine.compile("a + b").unwrap();
        let result = bind_expression(&engine, &compiled, &[], |_| None, |name| {
            Err(format!("{} refused", name))
        });
        assert_eq!(result.errors.len(), 2);
        assert!(result.created.is_empty());
    }

    #[test]
    fn test_validate_function_calls() {
        let calls = vec![
            FunctionCall { name: "f".to_string(), args: 1 },
            FunctionCall { name: "g".to_string(), args: 2 },
            FunctionCall { name: "h".to_string(), args: 1 },
        ];
        let errors = validate_function_calls(&calls, |name| match name {
            "f" => Some(1),
            "g" => Some(1),
            _ => None,
        });
        assert_eq!(
            errors,
            vec![
                CallError::Arity { name: "g".to_string(), expected: 1, got: 2 },
                CallError::UnknownFunction { name: "h".to_string() },
            ]
        );
    }
}
