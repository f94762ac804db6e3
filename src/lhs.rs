//! Definition splitting and left-hand-side classification.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::engine::ExpressionEngine;
use crate::errors::EngineError;
use crate::types::{ParsedLhs, ParsedName};

static LHS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<name>[^\s'_(){},=]+)(?P<primes>'*)(?:_\{(?P<sub>[^{}]*)\})?(?:\((?P<args>[^()]*)\))?$",
    )
    .expect("left-hand-side pattern is valid")
});

/// A definition split at its `=`, each side normalized independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDefinition {
    pub lhs_text: String,
    pub rhs: String,
}

fn is_single_letter(text: &str) -> bool {
    let mut chars = text.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
}

impl ExpressionEngine {
    /// Splits `lhs = rhs`. Exactly one `=` is required.
    pub fn parse_expression(&self, full: &str) -> Result<ParsedDefinition, EngineError> {
        let parts: Vec<&str> = full.split('=').collect();
        let [lhs, rhs] = parts.as_slice() else {
            return Err(EngineError::parse(format!(
                "a definition needs exactly one '=', found {}",
                parts.len() - 1
            )));
        };
        let lhs_text = self.normalize(lhs);
        let rhs = self.normalize(rhs);
        if lhs_text.is_empty() {
            return Err(EngineError::parse("left-hand side is empty"));
        }
        if rhs.is_empty() {
            return Err(EngineError::parse("right-hand side is empty"));
        }
        Ok(ParsedDefinition { lhs_text, rhs })
    }

    /// Classifies a left-hand side; `None` when it is not a well-formed name or signature.
    pub fn parse_lhs(&self, text: &str) -> Option<ParsedLhs> {
        self.parse_lhs_checked(text).ok()
    }

    /// Like [`parse_lhs`](Self::parse_lhs) but explains a rejection.
    pub fn parse_lhs_checked(&self, text: &str) -> Result<ParsedLhs, EngineError> {
        let text = self.normalize(text);
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if compact == "y" {
            return Ok(ParsedLhs::Anonymous);
        }

        let caps = LHS_PATTERN
            .captures(&compact)
            .ok_or_else(|| EngineError::parse(format!("'{}' is not a valid name", text)))?;
        let letter = &caps["name"];
        if !is_single_letter(letter) {
            // undo implicit products so the message shows what was typed
            let typed = letter.replace('*', "");
            return Err(EngineError::validation(format!(
                "name '{}' must be a single letter, use a subscript such as {}_{{{}}}",
                typed,
                typed.chars().next().unwrap_or('k'),
                typed.chars().skip(1).collect::<String>()
            )));
        }
        let primes = u8::try_from(caps["primes"].chars().count())
            .map_err(|_| EngineError::validation("too many primes"))?;
        let name = ParsedName {
            name: letter.to_string(),
            primes,
            subscript: caps.name("sub").map(|m| m.as_str().to_string()),
        };

        Ok(match caps.name("args") {
            None => ParsedLhs::Parameter(name),
            Some(args) => ParsedLhs::Function {
                name,
                formal_params: args
                    .as_str()
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect(),
            },
        })
    }

    /// Every problem with a classified left-hand side.
    pub fn validate_lhs(&self, lhs: &ParsedLhs) -> Vec<String> {
        let mut problems = Vec::new();
        let name = match lhs {
            ParsedLhs::Anonymous => return problems,
            ParsedLhs::Parameter(name) | ParsedLhs::Function { name, .. } => name,
        };

        let full = name.full_name();
        if self.symbols().is_builtin(&full) {
            problems.push(format!("'{}' is a reserved name", full));
        }

        if let ParsedLhs::Function { formal_params, .. } = lhs {
            if formal_params.is_empty() {
                problems.push(format!("function '{}' needs at least one parameter", full));
            }
            let mut seen = BTreeSet::new();
            for param in formal_params {
                if !is_single_letter(param) {
                    problems.push(format!(
                        "parameter '{}' of '{}' must be a single letter",
                        param.replace('*', ""),
                        full
                    ));
                } else if self.symbols().is_builtin(param) {
                    problems.push(format!("parameter '{}' of '{}' is a reserved name", param, full));
                }
                if !seen.insert(param.as_str()) {
                    problems.push(format!("parameter '{}' of '{}' is repeated", param, full));
                }
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ExpressionEngine {
        ExpressionEngine::default()
    }

    #[test]
    fn test_parse_expression_requires_one_equals() {
        let def = engine().parse_expression("k = 2 pi").unwrap();
        assert_eq!(def.lhs_text, "k");
        assert_eq!(def.rhs, "2 π");
        assert!(matches!(engine().parse_expression("k + 1"), Err(EngineError::Parse(_))));
        assert!(matches!(engine().parse_expression("a = b = 1"), Err(EngineError::Parse(_))));
        assert!(matches!(engine().parse_expression("k = "), Err(EngineError::Parse(_))));
    }

    #[test]
    fn test_parse_parameter_names() {
        assert_eq!(
            engine().parse_lhs("k"),
            Some(ParsedLhs::Parameter(ParsedName::new("k")))
        );
        assert_eq!(
            engine().parse_lhs("k_{max}"),
            Some(ParsedLhs::Parameter(ParsedName::with_subscript("k", "max")))
        );
        assert_eq!(
            engine().parse_lhs("\\alpha"),
            Some(ParsedLhs::Parameter(ParsedName::new("α")))
        );
        let primed = engine().parse_lhs("k''").unwrap();
        assert_eq!(primed.full_name(), "k''");
    }

    #[test]
    fn test_parse_function_signatures() {
        match engine().parse_lhs("f(x, t)") {
            Some(ParsedLhs::Function { name, formal_params }) => {
                assert_eq!(name.full_name(), "f");
                assert_eq!(formal_params, vec!["x".to_string(), "t".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(engine().parse_lhs("g_{2}(x)").unwrap().arity(), Some(1));
        assert_eq!(engine().parse_lhs("y"), Some(ParsedLhs::Anonymous));
    }

    #[test]
    fn test_long_names_are_rejected() {
        assert_eq!(engine().parse_lhs("ab"), None);
        assert!(matches!(
            engine().parse_lhs_checked("a*b"),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine().parse_lhs_checked("speed"),
            Err(EngineError::Validation(_))
        ));
        assert!(engine().parse_lhs("2k").is_none());
        assert!(engine().parse_lhs("f(x").is_none());
    }

    #[test]
    fn test_validate_lhs_reports_everything() {
        let engine = engine();
        let lhs = engine.parse_lhs("f(x, x, pi)").unwrap();
        let problems = engine.validate_lhs(&lhs);
        assert_eq!(problems.len(), 2);

        let lhs = engine.parse_lhs("e").unwrap();
        assert_eq!(engine.validate_lhs(&lhs).len(), 1);

        let lhs = engine.parse_lhs("f(ab)").unwrap();
        assert_eq!(engine.validate_lhs(&lhs).len(), 1);

        assert!(engine.validate_lhs(&ParsedLhs::Anonymous).is_empty());
        assert!(engine.validate_lhs(&engine.parse_lhs("e_{1}").unwrap()).is_empty());
    }
}
