//! Easing curves given as formulas in `t`.
//!
//! A formula is compiled by the same engine as every other expression and may read only
//! `t` and builtins. Nothing else is ever executed.

use crate::engine::{CompiledExpression, ExpressionEngine, Scope};
use crate::errors::EngineError;

/// Name of the only free variable an easing formula may read.
pub const EASING_VARIABLE: &str = "t";

#[derive(Debug, Clone)]
pub struct EasingFormula {
    engine: ExpressionEngine,
    compiled: CompiledExpression,
}

impl EasingFormula {
    /// Compiles `text`, rejecting any free symbol other than `t` and any non-builtin call.
    pub fn parse(engine: &ExpressionEngine, text: &str) -> Result<Self, EngineError> {
        let compiled = engine.compile(text)?;

        let mut problems: Vec<String> = engine
            .dependencies_of(&compiled)
            .into_iter()
            .filter(|name| name != EASING_VARIABLE)
            .map(|name| format!("easing formulas may only read '{}', found '{}'", EASING_VARIABLE, name))
            .collect();
        problems.extend(
            engine
                .function_calls_of(&compiled)
                .into_iter()
                .map(|call| format!("easing formulas cannot call '{}'", call.name)),
        );
        if !problems.is_empty() {
            return Err(EngineError::Validation(problems));
        }

        Ok(Self {
            engine: engine.clone(),
            compiled,
        })
    }

    pub fn linear(engine: &ExpressionEngine) -> Result<Self, EngineError> {
        Self::parse(engine, "t")
    }

    pub fn ease_in(engine: &ExpressionEngine) -> Result<Self, EngineError> {
        Self::parse(engine, "t^2")
    }

    pub fn ease_out(engine: &ExpressionEngine) -> Result<Self, EngineError> {
        Self::parse(engine, "1 - (1 - t)^2")
    }

    pub fn ease_in_out(engine: &ExpressionEngine) -> Result<Self, EngineError> {
        Self::parse(engine, "3t^2 - 2t^3")
    }

    /// Normalized formula text.
    pub fn source(&self) -> &str {
        self.compiled.source()
    }

    pub fn eval(&self, t: f64) -> Result<f64, EngineError> {
        self.engine
            .evaluate_compiled(&self.compiled, &Scope::new().with(EASING_VARIABLE, t))
    }

    /// Values at `steps + 1` evenly spaced points of `[0, 1]`.
    pub fn curve(&self, steps: usize) -> Result<Vec<f64>, EngineError> {
        let steps = steps.max(1);
        let mut evaluator = self.engine.evaluator(&Scope::new())?;
        (0..=steps)
            .map(|i| {
                let t = i as f64 / steps as f64;
                evaluator.eval(&self.compiled, &[(EASING_VARIABLE, t)])
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_hit_the_endpoints() {
        let engine = ExpressionEngine::default();
        for easing in [
            EasingFormula::linear(&engine).unwrap(),
            EasingFormula::ease_in(&engine).unwrap(),
            EasingFormula::ease_out(&engine).unwrap(),
            EasingFormula::ease_in_out(&engine).unwrap(),
        ] {
            assert_eq!(easing.eval(0.0).unwrap(), 0.0, "{}", easing.source());
            assert_eq!(easing.eval(1.0).unwrap(), 1.0, "{}", easing.source());
        }
    }

    #[test]
    fn test_builtins_are_allowed() {
        let engine = ExpressionEngine::default();
        let easing = EasingFormula::parse(&engine, "sin(t*pi/2)").unwrap();
        assert!((easing.eval(1.0).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(easing.eval(0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_other_symbols_are_rejected() {
        let engine = ExpressionEngine::default();
        match EasingFormula::parse(&engine, "t*k + f(t)") {
            Err(EngineError::Validation(problems)) => {
                assert_eq!(problems.len(), 2);
                assert!(problems[0].contains("'k'"));
                assert!(problems[1].contains("'f'"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_forbidden_syntax_is_rejected() {
        let engine = ExpressionEngine::default();
        assert!(EasingFormula::parse(&engine, "t; t = 2").is_err());
        assert!(EasingFormula::parse(&engine, "\"t\"").is_err());
    }

    #[test]
    fn test_curve_is_monotonic() {
        let engine = ExpressionEngine::default();
        let values = EasingFormula::ease_in_out(&engine)
            .unwrap()
            .curve(20)
            .unwrap();
        assert_eq!(values.len(), 21);
        assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
