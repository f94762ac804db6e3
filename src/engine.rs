//! Expression engine built on top of evalexpr.
//!
//! The engine owns the symbol registry and the configuration and turns user-typed text into
//! compiled evalexpr trees. Every expression goes through the same pipeline:
//!
//! 1. symbol normalization (aliases, escapes, operator glyphs)
//! 2. validation (length limit, forbidden-pattern denylist, bracket balance)
//! 3. implicit multiplication insertion
//! 4. integer literals rewritten as floats, so `5/2` is `2.5` and `1/0` is infinite
//! 5. `build_operator_tree`
//!
//! Evaluation runs a compiled tree against a context holding the builtin constants, the
//! builtin math functions, the values of a [`Scope`] and the user functions it defines.
//! Infinite results are accepted (division by zero is treated as a limit), NaN and
//! non-numeric results are domain errors.
//!
//! # Example
//!
//! ```
//! use paramflow::engine::{ExpressionEngine, Scope};
//!
//! let engine = ExpressionEngine::default();
//! let mut scope = Scope::new();
//! scope.set("k", 3.0);
//! assert_eq!(engine.evaluate("2k + 1", &scope).unwrap(), 7.0);
//! assert_eq!(engine.evaluate("5/2", &scope).unwrap(), 2.5);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use evalexpr::{
    build_operator_tree, ContextWithMutableFunctions, ContextWithMutableVariables,
    DefaultNumericTypes, EvalexprError, Function, HashMapContext, Node, Operator, Value,
};
use regex::RegexSet;

use crate::config::EngineConfig;
use crate::errors::{ConfigError, EngineError};
use crate::implicit_mul::insert_implicit_multiplication;
use crate::symbols::{MathFn, SymbolRegistry};

type EvalNode = Node<DefaultNumericTypes>;
type EvalValue = Value<DefaultNumericTypes>;
type EvalError = EvalexprError<DefaultNumericTypes>;
type EvalContext = HashMapContext<DefaultNumericTypes>;

/// An expression compiled once and evaluated many times.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    source: String,
    node: Arc<EvalNode>,
}

impl CompiledExpression {
    /// The prepared text handed to the parser (normalized, with explicit products).
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn node(&self) -> &EvalNode {
        &self.node
    }
}

/// A user-defined function callable from expressions.
#[derive(Debug, Clone)]
pub struct UserFunction {
    pub params: Vec<String>,
    pub body: CompiledExpression,
}

/// Values and user functions visible to an evaluation.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    values: BTreeMap<String, f64>,
    functions: BTreeMap<String, UserFunction>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name`, replacing any earlier value.
    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn remove(&mut self, name: &str) -> Option<f64> {
        self.values.remove(name)
    }

    /// Makes a user function callable from expressions evaluated in this scope.
    pub fn define_function(&mut self, name: impl Into<String>, function: UserFunction) {
        self.functions.insert(name.into(), function);
    }

    pub fn function(&self, name: &str) -> Option<&UserFunction> {
        self.functions.get(name)
    }

    /// Bound values in name order.
    pub fn values(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// A call site found in an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    pub args: usize,
}

/// Everything an evalexpr context needs, shared with the closures registered in it.
#[derive(Debug)]
struct EvalEnv {
    constants: Vec<(String, f64)>,
    math: Vec<(String, MathFn)>,
    scope: Scope,
}

impl EvalEnv {
    fn context(env: &Arc<EvalEnv>) -> Result<EvalContext, EvalError> {
        let mut context = EvalContext::new();
        for (name, value) in &env.constants {
            context.set_value(name.clone(), EvalValue::Float(*value))?;
        }
        for (name, value) in env.scope.values() {
            context.set_value(name.to_string(), EvalValue::Float(value))?;
        }
        for (name, math) in &env.math {
            let math = *math;
            context.set_function(
                name.clone(),
                Function::new(move |argument: &EvalValue| call_math(math, argument)),
            )?;
        }
        for (name, function) in &env.scope.functions {
            let env = Arc::clone(env);
            let function = function.clone();
            context.set_function(
                name.clone(),
                Function::new(move |argument: &EvalValue| {
                    EvalEnv::call_user(&env, &function, argument)
                }),
            )?;
        }
        Ok(context)
    }

    fn call_user(
        env: &Arc<EvalEnv>,
        function: &UserFunction,
        argument: &EvalValue,
    ) -> Result<EvalValue, EvalError> {
        let args = numeric_args(argument)?;
        if args.len() != function.params.len() {
            return Err(EvalError::CustomMessage(format!(
                "expected {} argument(s), got {}",
                function.params.len(),
                args.len()
            )));
        }
        let mut context = EvalEnv::context(env)?;
        for (param, value) in function.params.iter().zip(args) {
            context.set_value(param.clone(), EvalValue::Float(value))?;
        }
        function.body.node.eval_with_context(&context)
    }
}

fn as_number(value: &EvalValue) -> Result<f64, EvalError> {
    match value {
        EvalValue::Float(f) => Ok(*f),
        EvalValue::Int(i) => Ok(*i as f64),
        other => Err(EvalError::CustomMessage(format!(
            "expected a number, got {}",
            other
        ))),
    }
}

fn numeric_args(argument: &EvalValue) -> Result<Vec<f64>, EvalError> {
    match argument {
        EvalValue::Tuple(items) => items.iter().map(as_number).collect(),
        EvalValue::Empty => Ok(Vec::new()),
        other => Ok(vec![as_number(other)?]),
    }
}

fn call_math(math: MathFn, argument: &EvalValue) -> Result<EvalValue, EvalError> {
    let args = numeric_args(argument)?;
    math.apply(&args).map(EvalValue::Float).ok_or_else(|| {
        EvalError::CustomMessage(format!(
            "expected {} argument(s), got {}",
            math.arity(),
            args.len()
        ))
    })
}

/// A context prepared once for a scope, reused across many evaluations.
pub struct Evaluator {
    context: EvalContext,
}

impl Evaluator {
    /// Evaluates `compiled` with extra bindings (e.g. the sampled variable) set first.
    pub fn eval(
        &mut self,
        compiled: &CompiledExpression,
        bindings: &[(&str, f64)],
    ) -> Result<f64, EngineError> {
        for (name, value) in bindings {
            self.context
                .set_value(name.to_string(), EvalValue::Float(*value))?;
        }
        let value = compiled
            .node
            .eval_with_context(&self.context)
            .map_err(|err| EngineError::domain(err.to_string()))?;
        numeric_result(&value)
    }
}

fn numeric_result(value: &EvalValue) -> Result<f64, EngineError> {
    let number = match value {
        EvalValue::Float(f) => *f,
        EvalValue::Int(i) => *i as f64,
        other => {
            return Err(EngineError::domain(format!(
                "expression did not evaluate to a number: {}",
                other
            )))
        }
    };
    if number.is_nan() {
        return Err(EngineError::domain("expression evaluated to NaN"));
    }
    Ok(number)
}

/// Parses, validates and evaluates expression strings.
#[derive(Debug, Clone)]
pub struct ExpressionEngine {
    symbols: Arc<SymbolRegistry>,
    config: EngineConfig,
    forbidden: RegexSet,
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        let config = EngineConfig::default();
        let forbidden = RegexSet::new(&config.forbidden_patterns).unwrap_or_else(|_| RegexSet::empty());
        Self {
            symbols: Arc::new(SymbolRegistry::builtin()),
            config,
            forbidden,
        }
    }
}

impl ExpressionEngine {
    pub fn new(symbols: SymbolRegistry, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let forbidden =
            RegexSet::new(&config.forbidden_patterns).map_err(|source| ConfigError::Pattern {
                pattern: config.forbidden_patterns.join(" | "),
                source,
            })?;
        Ok(Self {
            symbols: Arc::new(symbols),
            config,
            forbidden,
        })
    }

    pub fn symbols(&self) -> &SymbolRegistry {
        &self.symbols
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn normalize(&self, text: &str) -> String {
        self.symbols.normalize_expression(text.trim())
    }

    pub fn insert_implicit_multiplication(&self, expr: &str) -> String {
        insert_implicit_multiplication(expr, &self.symbols)
    }

    /// Checks length, the forbidden-pattern denylist and bracket balance.
    ///
    /// Unbalanced brackets are a parse error; every other violation is collected into a
    /// single validation error.
    pub fn validate(&self, expr: &str) -> Result<(), EngineError> {
        if expr.trim().is_empty() {
            return Err(EngineError::parse("expression is empty"));
        }
        check_brackets(expr)?;

        let mut violations = Vec::new();
        let length = expr.chars().count();
        if length > self.config.max_expression_length {
            violations.push(format!(
                "expression is {} characters long, the limit is {}",
                length, self.config.max_expression_length
            ));
        }
        for index in self.forbidden.matches(expr).iter() {
            violations.push(format!(
                "expression contains forbidden pattern '{}'",
                self.forbidden.patterns()[index]
            ));
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(violations))
        }
    }

    /// Normalizes, validates and compiles an expression.
    pub fn compile(&self, expr: &str) -> Result<CompiledExpression, EngineError> {
        let normalized = self.normalize(expr);
        self.validate(&normalized)?;
        let source = self.insert_implicit_multiplication(&normalized);
        let prepared = float_literals(&source);

        let node = panic::catch_unwind(AssertUnwindSafe(|| {
            build_operator_tree::<DefaultNumericTypes>(&prepared)
        }))
        .map_err(|_| EngineError::parse(format!("internal parser fault on '{}'", source)))??;

        Ok(CompiledExpression {
            source,
            node: Arc::new(node),
        })
    }

    /// Prepares an evaluator whose context holds builtins and the contents of `scope`.
    pub fn evaluator(&self, scope: &Scope) -> Result<Evaluator, EngineError> {
        let env = Arc::new(EvalEnv {
            constants: self
                .symbols
                .constants()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
            math: self
                .symbols
                .functions()
                .map(|(name, f)| (name.to_string(), f))
                .collect(),
            scope: scope.clone(),
        });
        let context = EvalEnv::context(&env)?;
        Ok(Evaluator { context })
    }

    pub fn evaluate_compiled(
        &self,
        compiled: &CompiledExpression,
        scope: &Scope,
    ) -> Result<f64, EngineError> {
        self.evaluator(scope)?.eval(compiled, &[])
    }

    /// Evaluates an expression string against `scope`.
    pub fn evaluate(&self, expr: &str, scope: &Scope) -> Result<f64, EngineError> {
        let compiled = self.compile(expr)?;
        self.evaluate_compiled(&compiled, scope)
    }

    /// Names of the non-builtin symbols an expression reads.
    pub fn extract_dependencies(&self, expr: &str) -> Result<BTreeSet<String>, EngineError> {
        let compiled = self.compile(expr)?;
        Ok(self.dependencies_of(&compiled))
    }

    pub fn dependencies_of(&self, compiled: &CompiledExpression) -> BTreeSet<String> {
        let mut symbols = self.variables_of(compiled);
        symbols.retain(|name| !self.symbols.is_builtin(name));
        symbols
    }

    /// Graph edges of a definition: free variables plus called user functions, minus the
    /// definition's own formal parameters.
    pub fn graph_dependencies_of(
        &self,
        compiled: &CompiledExpression,
        formal_params: &[String],
    ) -> Vec<String> {
        let mut names = self.dependencies_of(compiled);
        names.extend(self.function_calls_of(compiled).into_iter().map(|call| call.name));
        names.retain(|name| !formal_params.contains(name));
        names.into_iter().collect()
    }

    /// Every variable an expression reads, builtin constants included.
    pub fn variables_of(&self, compiled: &CompiledExpression) -> BTreeSet<String> {
        let mut symbols = BTreeSet::new();
        collect_variables(&compiled.node, &mut symbols);
        symbols
    }

    /// Call sites of non-builtin functions, in source order.
    pub fn detect_function_calls(&self, expr: &str) -> Result<Vec<FunctionCall>, EngineError> {
        let compiled = self.compile(expr)?;
        Ok(self.function_calls_of(&compiled))
    }

    pub fn function_calls_of(&self, compiled: &CompiledExpression) -> Vec<FunctionCall> {
        let mut calls = Vec::new();
        collect_calls(&compiled.node, &mut calls);
        calls.retain(|call| !self.symbols.is_builtin_function(&call.name));
        calls
    }

    /// Every call site, builtin ones included.
    pub fn all_function_calls_of(&self, compiled: &CompiledExpression) -> Vec<FunctionCall> {
        let mut calls = Vec::new();
        collect_calls(&compiled.node, &mut calls);
        calls
    }
}

fn collect_variables(node: &EvalNode, symbols: &mut BTreeSet<String>) {
    match node.operator() {
        Operator::VariableIdentifierRead { identifier } => {
            symbols.insert(identifier.to_string());
        }
        _ => {
            for child in node.children() {
                collect_variables(child, symbols);
            }
        }
    }
}

fn collect_calls(node: &EvalNode, calls: &mut Vec<FunctionCall>) {
    if let Operator::FunctionIdentifier { identifier } = node.operator() {
        calls.push(FunctionCall {
            name: identifier.to_string(),
            args: node.children().first().map_or(0, count_args),
        });
    }
    for child in node.children() {
        collect_calls(child, calls);
    }
}

fn count_args(node: &EvalNode) -> usize {
    match node.operator() {
        Operator::Tuple => node.children().len(),
        Operator::RootNode => match node.children() {
            [] => 0,
            [only] => count_args(only),
            _ => 1,
        },
        _ => 1,
    }
}

fn check_brackets(expr: &str) -> Result<(), EngineError> {
    let mut stack = Vec::new();
    for (i, c) in expr.chars().enumerate() {
        match c {
            '(' | '[' | '{' => stack.push((c, i)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    _ => {
                        return Err(EngineError::parse(format!(
                            "unmatched '{}' at position {}",
                            c,
                            i + 1
                        )))
                    }
                }
            }
            _ => {}
        }
    }
    match stack.pop() {
        Some((open, i)) => Err(EngineError::parse(format!(
            "unmatched '{}' at position {}",
            open,
            i + 1
        ))),
        None => Ok(()),
    }
}

/// Rewrites integer literals as float literals, leaving identifiers (and their
/// subscripts) untouched.
fn float_literals(expr: &str) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let mut out = String::with_capacity(expr.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_alphabetic() || c == '_' {
            // identifier: letters, digits, primes, underscores and subscript spans
            while i < chars.len() {
                let d = chars[i];
                if d == '{' {
                    let mut depth = 0usize;
                    while i < chars.len() {
                        let e = chars[i];
                        out.push(e);
                        i += 1;
                        if e == '{' {
                            depth += 1;
                        } else if e == '}' {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                    }
                } else if d.is_alphanumeric() || d == '_' || d == '\'' {
                    out.push(d);
                    i += 1;
                } else {
                    break;
                }
            }
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            let mut has_point = false;
            while i < chars.len() && (chars[i].is_ascii_digit() || (chars[i] == '.' && !has_point)) {
                has_point |= chars[i] == '.';
                out.push(chars[i]);
                i += 1;
            }
            if !has_point {
                out.push_str(".0");
            }
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn engine() -> ExpressionEngine {
        ExpressionEngine::default()
    }

    #[test]
    fn test_evaluate_arithmetic() {
        let scope = Scope::new();
        assert_eq!(engine().evaluate("1 + 2*3", &scope).unwrap(), 7.0);
        assert_eq!(engine().evaluate("2^10", &scope).unwrap(), 1024.0);
        assert_eq!(engine().evaluate("7/2", &scope).unwrap(), 3.5);
        assert_eq!(engine().evaluate("-3 + 1", &scope).unwrap(), -2.0);
    }

    #[test]
    fn test_evaluate_builtins_and_constants() {
        let scope = Scope::new();
        assert!((engine().evaluate("sin(pi/2)", &scope).unwrap() - 1.0).abs() < 1e-12);
        assert!((engine().evaluate("2π", &scope).unwrap() - 2.0 * PI).abs() < 1e-12);
        assert_eq!(engine().evaluate("max(2, 5)", &scope).unwrap(), 5.0);
        assert_eq!(engine().evaluate("sqrt(16)", &scope).unwrap(), 4.0);
        assert_eq!(engine().evaluate("√(9)", &scope).unwrap(), 3.0);
    }

    #[test]
    fn test_division_by_zero_is_infinite() {
        let value = engine().evaluate("1/0", &Scope::new()).unwrap();
        assert!(value.is_infinite() && value > 0.0);
    }

    #[test]
    fn test_nan_is_a_domain_error() {
        let result = engine().evaluate("0/0", &Scope::new());
        assert!(matches!(result, Err(EngineError::Domain(_))));
        let result = engine().evaluate("sqrt(-1)", &Scope::new());
        assert!(matches!(result, Err(EngineError::Domain(_))));
    }

    #[test]
    fn test_unknown_symbol_fails() {
        let result = engine().evaluate("q + 1", &Scope::new());
        assert!(matches!(result, Err(EngineError::Domain(_))));
    }

    #[test]
    fn test_scope_values_and_subscripts() {
        let scope = Scope::new().with("k_{1}", 2.0).with("α", 3.0);
        assert_eq!(engine().evaluate("k_{1}α", &scope).unwrap(), 6.0);
        assert_eq!(engine().evaluate("2k_{1} + alpha", &scope).unwrap(), 7.0);
    }

    #[test]
    fn test_user_functions() {
        let engine = engine();
        let mut scope = Scope::new().with("k", 3.0);
        let body = engine.compile("k*x + 1").unwrap();
        scope.define_function(
            "f",
            UserFunction {
                params: vec!["x".to_string()],
                body,
            },
        );
        assert_eq!(engine.evaluate("f(2)", &scope).unwrap(), 7.0);
        assert_eq!(engine.evaluate("2f(1) + 1", &scope).unwrap(), 9.0);
        assert!(engine.evaluate("f(1, 2)", &scope).is_err());
    }

    #[test]
    fn test_length_limit_and_forbidden_patterns() {
        let engine = engine();
        let long = "1+".repeat(300) + "1";
        match engine.validate(&long) {
            Err(EngineError::Validation(messages)) => assert_eq!(messages.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        match engine.validate("x; y := 2") {
            Err(EngineError::Validation(messages)) => assert_eq!(messages.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(engine.validate("x + 1").is_ok());
    }

    #[test]
    fn test_unbalanced_brackets_are_parse_errors() {
        assert!(matches!(engine().validate("(x + 1"), Err(EngineError::Parse(_))));
        assert!(matches!(engine().validate("x + 1)"), Err(EngineError::Parse(_))));
        assert!(matches!(engine().validate("[x)"), Err(EngineError::Parse(_))));
    }

    #[test]
    fn test_extract_dependencies_excludes_builtins() {
        let deps = engine().extract_dependencies("sin(k*x) + pi*a_{1}").unwrap();
        let expected: BTreeSet<String> = ["a_{1}", "k", "x"].iter().map(|s| s.to_string()).collect();
        assert_eq!(deps, expected);
    }

    #[test]
    fn test_detect_function_calls() {
        let calls = engine().detect_function_calls("f(x) + g(x, y) + sin(h(1))").unwrap();
        assert_eq!(
            calls,
            vec![
                FunctionCall { name: "f".to_string(), args: 1 },
                FunctionCall { name: "g".to_string(), args: 2 },
                FunctionCall { name: "h".to_string(), args: 1 },
            ]
        );
    }

    #[test]
    fn test_evaluator_reuses_context() {
        let engine = engine();
        let compiled = engine.compile("x^2").unwrap();
        let mut evaluator = engine.evaluator(&Scope::new()).unwrap();
        assert_eq!(evaluator.eval(&compiled, &[("x", 3.0)]).unwrap(), 9.0);
        assert_eq!(evaluator.eval(&compiled, &[("x", 4.0)]).unwrap(), 16.0);
    }

    #[test]
    fn test_float_literals() {
        assert_eq!(float_literals("2*x+10"), "2.0*x+10.0");
        assert_eq!(float_literals("2.5*k_{12}"), "2.5*k_{12}");
        assert_eq!(float_literals("log10(x)"), "log10(x)");
        assert_eq!(float_literals(".5"), ".5");
    }
}
