//! Engine configuration.
//!
//! Every field has a default, so a JSON document only needs to name what it changes:
//!
//! ```
//! use paramflow::config::EngineConfig;
//!
//! let config = EngineConfig::from_json(r#"{"max_expression_length": 80}"#).unwrap();
//! assert_eq!(config.max_expression_length, 80);
//! assert_eq!(config.independent_variable.name, "x");
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::types::Domain;

/// Defaults applied to parameters created by auto-parameterization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoParameterDefaults {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for AutoParameterDefaults {
    fn default() -> Self {
        Self {
            value: 1.0,
            min: -10.0,
            max: 10.0,
            step: 0.1,
        }
    }
}

impl AutoParameterDefaults {
    pub fn domain(&self) -> Domain {
        Domain::new(self.min, self.max, self.step)
    }
}

/// The independent variable created for a fresh workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndependentVariableDefaults {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for IndependentVariableDefaults {
    fn default() -> Self {
        Self {
            name: "x".to_string(),
            min: -10.0,
            max: 10.0,
            step: 0.1,
        }
    }
}

impl IndependentVariableDefaults {
    pub fn domain(&self) -> Domain {
        Domain::new(self.min, self.max, self.step)
    }
}

/// Limits and defaults of the expression engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Longest accepted expression, in characters
    pub max_expression_length: usize,
    /// Regular expressions that may not match anywhere in an expression
    pub forbidden_patterns: Vec<String>,
    pub auto_parameter: AutoParameterDefaults,
    pub independent_variable: IndependentVariableDefaults,
    /// Upper bound on the number of values a `[a..b..s]` range may expand to
    pub max_range_points: usize,
    /// Upper bound on the number of samples taken for function statistics
    pub max_samples: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_expression_length: 500,
            forbidden_patterns: default_forbidden_patterns(),
            auto_parameter: AutoParameterDefaults::default(),
            independent_variable: IndependentVariableDefaults::default(),
            max_range_points: 10_000,
            max_samples: 100_000,
        }
    }
}

fn default_forbidden_patterns() -> Vec<String> {
    [
        // namespaced builtins of the evaluator
        r"::",
        // statement chaining and assignment operators
        r";",
        r"[+\-*/%^]=",
        r":=",
        // string literals
        r#"""#,
        // boolean and comparison operators
        r"&&",
        r"\|\|",
        r"[<>!]",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Checks that every forbidden pattern compiles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for pattern in &self.forbidden_patterns {
            regex::Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.auto_parameter.domain(), Domain::new(-10.0, 10.0, 0.1));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            EngineConfig::from_json(r#"{"auto_parameter": {"value": 5.0}, "max_samples": 10}"#)
                .unwrap();
        assert_eq!(config.auto_parameter.value, 5.0);
        assert_eq!(config.auto_parameter.max, 10.0);
        assert_eq!(config.max_samples, 10);
        assert_eq!(config.max_expression_length, 500);
    }

    #[test]
    fn test_bad_pattern_is_rejected() {
        let result = EngineConfig::from_json(r#"{"forbidden_patterns": ["("]}"#);
        assert!(matches!(result, Err(ConfigError::Pattern { .. })));
    }

    #[test]
    fn test_bad_json_is_rejected() {
        assert!(matches!(
            EngineConfig::from_json("{"),
            Err(ConfigError::Json(_))
        ));
    }
}
