//! Ids, names, parameters, domains and function definitions shared by every module.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a parameter, allocated sequentially by the `ParameterTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterId(pub u32);

/// Identity of a function definition, allocated sequentially by the `FunctionManager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(pub u32);

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Key of a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Parameter(ParameterId),
    Function(FunctionId),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Parameter(id) => id.fmt(f),
            NodeId::Function(id) => id.fmt(f),
        }
    }
}

/// Numeric range a parameter can sweep over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Domain {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Problems with this domain, empty when it is usable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.min.is_finite() || !self.max.is_finite() {
            problems.push("domain bounds must be finite".to_string());
        } else if self.min > self.max {
            problems.push(format!(
                "domain minimum {} exceeds maximum {}",
                self.min, self.max
            ));
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            problems.push("domain step must be a positive number".to_string());
        }
        problems
    }

    /// Sample points from `min` to `max` inclusive, at most `limit` of them.
    ///
    /// When stepping would exceed `limit`, the points are spread evenly over the whole
    /// domain instead, so both endpoints are always sampled.
    pub fn samples(&self, limit: usize) -> Vec<f64> {
        if !self.problems().is_empty() || limit == 0 {
            return Vec::new();
        }
        // tolerate rounding on the last step
        let count = ((self.max - self.min) / self.step + 1e-9).floor() + 1.0;
        if count.is_finite() && count <= limit as f64 {
            return (0..count as usize)
                .map(|i| self.min + i as f64 * self.step)
                .collect();
        }
        if limit == 1 {
            return vec![self.min];
        }
        let last = (limit - 1) as f64;
        (0..limit)
            .map(|i| {
                let t = i as f64 / last;
                self.min * (1.0 - t) + self.max * t
            })
            .collect()
    }
}

/// Kind of UI control bound to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Slider,
    Input,
    Toggle,
}

/// UI-control descriptor; opaque to the core apart from its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub kind: ControlKind,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// Role tag of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    IndependentVariable,
    Slider,
    ConstantApproximation,
}

/// A display name: exactly one letter, optional primes, optional free-text subscript.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedName {
    pub name: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub primes: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscript: Option<String>,
}

fn is_zero(value: &u8) -> bool {
    *value == 0
}

impl ParsedName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primes: 0,
            subscript: None,
        }
    }

    pub fn with_subscript(name: impl Into<String>, subscript: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primes: 0,
            subscript: Some(subscript.into()),
        }
    }

    /// The unique, collision-checked identity, e.g. `k`, `k'` or `k_{1}`.
    pub fn full_name(&self) -> String {
        let mut full = self.name.clone();
        for _ in 0..self.primes {
            full.push('\'');
        }
        if let Some(sub) = &self.subscript {
            full.push_str("_{");
            full.push_str(sub);
            full.push('}');
        }
        full
    }
}

impl fmt::Display for ParsedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Classification of the left-hand side of a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedLhs {
    /// `k` or `k_{sub}`
    Parameter(ParsedName),
    /// `f(x, y)` or `f_{sub}(x)`
    Function {
        name: ParsedName,
        formal_params: Vec<String>,
    },
    /// The `y = ...` plotting shorthand
    Anonymous,
}

pub const ANONYMOUS_NAME: &str = "anonymous";

impl ParsedLhs {
    pub fn full_name(&self) -> String {
        match self {
            ParsedLhs::Parameter(name) | ParsedLhs::Function { name, .. } => name.full_name(),
            ParsedLhs::Anonymous => ANONYMOUS_NAME.to_string(),
        }
    }

    pub fn arity(&self) -> Option<usize> {
        match self {
            ParsedLhs::Function { formal_params, .. } => Some(formal_params.len()),
            _ => None,
        }
    }
}

/// A named numeric parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: ParameterId,
    pub name: ParsedName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<Control>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Defining expression of a derived parameter (`a = 2*k`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Parameter {
    pub fn with_value(id: ParameterId, name: ParsedName, value: f64) -> Self {
        Self {
            id,
            name,
            value: Some(value),
            domain: None,
            control: None,
            role: None,
            expression: None,
            error: None,
        }
    }

    pub fn full_name(&self) -> String {
        self.name.full_name()
    }

    /// Value used when the parameter is read in an expression.
    pub fn current_value(&self) -> Option<f64> {
        self.value.or(self.domain.map(|d| d.min))
    }

    pub fn is_derived(&self) -> bool {
        self.expression.is_some()
    }

    pub fn is_independent_variable(&self) -> bool {
        self.role == Some(Role::IndependentVariable)
    }

    /// A parameter needs a value, a domain, or both.
    pub fn validate(&self) -> Result<(), String> {
        if self.value.is_none() && self.domain.is_none() {
            return Err(format!(
                "parameter '{}' has neither a value nor a domain",
                self.full_name()
            ));
        }
        if let Some(domain) = &self.domain {
            if let Some(problem) = domain.problems().into_iter().next() {
                return Err(format!("parameter '{}': {}", self.full_name(), problem));
            }
        }
        Ok(())
    }
}

/// Rendering metadata; carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_width: Option<f64>,
    #[serde(default)]
    pub visible: bool,
}

/// Descriptive statistics from sampling a function over its independent variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub samples: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub zero_crossings: usize,
    pub continuous: bool,
}

/// A committed function definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub id: FunctionId,
    pub lhs: ParsedLhs,
    /// Resolved formal parameters; an anonymous plot takes the default independent variable
    pub formal_params: Vec<String>,
    /// Normalized right-hand side
    pub expression: String,
    pub independent_var: Option<ParameterId>,
    /// Free symbols read by the expression, formal params and builtins excluded
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub style: Style,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FunctionDefinition {
    /// Formal parameters, in declaration order.
    pub fn formal_params(&self) -> &[String] {
        &self.formal_params
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self.lhs, ParsedLhs::Anonymous)
    }

    /// Name under which this function appears in the dependency graph.
    ///
    /// Anonymous plots cannot be referenced, so they get a per-id name.
    pub fn graph_name(&self) -> String {
        match &self.lhs {
            ParsedLhs::Anonymous => format!("{}#{}", ANONYMOUS_NAME, self.id.0),
            lhs => lhs.full_name(),
        }
    }
}

/// A point produced by coordinate expansion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name() {
        assert_eq!(ParsedName::new("k").full_name(), "k");
        assert_eq!(ParsedName::with_subscript("k", "1").full_name(), "k_{1}");
        let primed = ParsedName {
            name: "a".to_string(),
            primes: 2,
            subscript: Some("x".to_string()),
        };
        assert_eq!(primed.full_name(), "a''_{x}");
    }

    #[test]
    fn test_parameter_requires_value_or_domain() {
        let mut p = Parameter::with_value(ParameterId(0), ParsedName::new("k"), 1.0);
        assert!(p.validate().is_ok());
        p.value = None;
        assert!(p.validate().is_err());
        p.domain = Some(Domain::new(0.0, 1.0, 0.1));
        assert!(p.validate().is_ok());
        assert_eq!(p.current_value(), Some(0.0));
    }

    #[test]
    fn test_domain_samples_are_inclusive() {
        let samples = Domain::new(0.0, 1.0, 0.25).samples(100);
        assert_eq!(samples, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(Domain::new(0.0, 1.0, 0.1).samples(100).len(), 11);
        assert_eq!(Domain::new(0.0, 10.0, 1.0).samples(3), vec![0.0, 5.0, 10.0]);
        assert_eq!(Domain::new(0.0, 10.0, 1.0).samples(1), vec![0.0]);
        assert!(Domain::new(0.0, 10.0, 1.0).samples(0).is_empty());
        assert!(Domain::new(1.0, 0.0, 0.1).samples(100).is_empty());
    }

    #[test]
    fn test_dense_domains_are_spread_over_the_limit() {
        let samples = Domain::new(-1e300, 1e300, 1e-10).samples(5);
        assert_eq!(samples, vec![-1e300, -5e299, 0.0, 5e299, 1e300]);

        let samples = Domain::new(-f64::MAX, f64::MAX, 1.0).samples(3);
        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|v| v.is_finite()));
        assert_eq!(samples[2], f64::MAX);

        let samples = Domain::new(-10.0, 10.0, 0.0001).samples(100_000);
        assert_eq!(samples.len(), 100_000);
        assert_eq!(samples.first(), Some(&-10.0));
        assert_eq!(samples.last(), Some(&10.0));
    }

    #[test]
    fn test_anonymous_graph_name() {
        let def = FunctionDefinition {
            id: FunctionId(4),
            lhs: ParsedLhs::Anonymous,
            formal_params: vec!["x".to_string()],
            expression: "x".to_string(),
            independent_var: None,
            dependencies: vec![],
            style: Style::default(),
            stats: None,
            error: None,
        };
        assert_eq!(def.graph_name(), "anonymous#4");
        assert_eq!(def.formal_params(), ["x".to_string()]);
    }
}
