//! Coordinate tuples: `(X, Y)` where each side is a scalar, a list `[a, b, c]` or a range
//! `[start..end]` / `[start..end..step]`.
//!
//! A scalar on one side is broadcast against a list on the other; two lists produce their
//! Cartesian product, X varying slowest.

use itertools::Itertools;

use crate::engine::{ExpressionEngine, Scope};
use crate::errors::EngineError;
use crate::types::Point;

#[derive(Debug, Clone, PartialEq)]
enum Axis {
    Scalar(f64),
    List(Vec<f64>),
}

/// Splits `text` at every top-level occurrence of `sep`, ignoring separators nested in
/// brackets.
fn split_top_level<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < text.len() {
        let rest = &text[i..];
        let Some(c) = rest.chars().next() else { break };
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        if depth == 0 && rest.starts_with(sep) {
            parts.push(&text[start..i]);
            i += sep.len();
            start = i;
            continue;
        }
        i += c.len_utf8();
    }
    parts.push(&text[start..]);
    parts
}

/// Whether `text` is `open ... close` with the outer pair matching each other.
fn is_wrapped(text: &str, open: char, close: char) -> bool {
    if !(text.starts_with(open) && text.ends_with(close)) || text.len() < 2 {
        return false;
    }
    let mut depth = 0i32;
    for (i, c) in text.char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return i + c.len_utf8() == text.len();
            }
        }
    }
    false
}

fn expand_range(start: f64, end: f64, step: f64, limit: usize) -> Result<Vec<f64>, EngineError> {
    if !(start.is_finite() && end.is_finite() && step.is_finite()) {
        return Err(EngineError::domain("range bounds and step must be finite"));
    }
    if step == 0.0 {
        return Ok(vec![start]);
    }
    let span = (end - start) / step;
    if span < 0.0 {
        return Err(EngineError::validation(format!(
            "range from {} to {} with step {} is empty",
            start, end, step
        )));
    }
    let count = (span + 1e-9).floor() + 1.0;
    if !count.is_finite() || count > limit as f64 {
        return Err(EngineError::validation(format!(
            "range expands to {} points, the limit is {}",
            count, limit
        )));
    }
    Ok((0..count as usize).map(|i| start + i as f64 * step).collect())
}

impl ExpressionEngine {
    fn parse_axis(&self, text: &str, scope: &Scope) -> Result<Axis, EngineError> {
        let text = text.trim();
        if !is_wrapped(text, '[', ']') {
            return Ok(Axis::Scalar(self.evaluate(text, scope)?));
        }
        let inner = &text[1..text.len() - 1];

        let bounds = split_top_level(inner, "..");
        if bounds.len() > 1 {
            let values = bounds
                .iter()
                .map(|b| self.evaluate(b, scope))
                .collect::<Result<Vec<_>, _>>()?;
            let (start, end, step) = match values.as_slice() {
                [start, end] => (*start, *end, 1.0),
                [start, end, step] => (*start, *end, *step),
                _ => {
                    return Err(EngineError::parse(format!(
                        "a range is [start..end] or [start..end..step], got '{}'",
                        text
                    )))
                }
            };
            return Ok(Axis::List(expand_range(
                start,
                end,
                step,
                self.config().max_range_points,
            )?));
        }

        if inner.trim().is_empty() {
            return Err(EngineError::parse("a list needs at least one value"));
        }
        let values = split_top_level(inner, ",")
            .into_iter()
            .map(|item| self.evaluate(item, scope))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Axis::List(values))
    }

    /// Expands a coordinate tuple into points.
    ///
    /// # Example
    /// ```
    /// use paramflow::engine::{ExpressionEngine, Scope};
    ///
    /// let engine = ExpressionEngine::default();
    /// let points = engine.parse_coordinates("([0..2], 1)", &Scope::new()).unwrap();
    /// assert_eq!(points.len(), 3);
    /// ```
    pub fn parse_coordinates(&self, expr: &str, scope: &Scope) -> Result<Vec<Point>, EngineError> {
        let text = self.normalize(expr);
        if !is_wrapped(&text, '(', ')') {
            return Err(EngineError::parse(format!(
                "coordinates must have the form (X, Y), got '{}'",
                text
            )));
        }
        let inner = &text[1..text.len() - 1];
        let parts = split_top_level(inner, ",");
        let [x, y] = parts.as_slice() else {
            return Err(EngineError::parse(format!(
                "coordinates need exactly two components, got '{}'",
                text
            )));
        };

        let points = match (self.parse_axis(x, scope)?, self.parse_axis(y, scope)?) {
            (Axis::Scalar(x), Axis::Scalar(y)) => vec![Point::new(x, y)],
            (Axis::Scalar(x), Axis::List(ys)) => ys.into_iter().map(|y| Point::new(x, y)).collect(),
            (Axis::List(xs), Axis::Scalar(y)) => xs.into_iter().map(|x| Point::new(x, y)).collect(),
            (Axis::List(xs), Axis::List(ys)) => xs
                .into_iter()
                .cartesian_product(ys)
                .map(|(x, y)| Point::new(x, y))
                .collect(),
        };
        Ok(points)
    }

    /// Whether `text` looks like a coordinate tuple rather than a definition.
    pub fn is_coordinate_tuple(&self, text: &str) -> bool {
        let text = text.trim();
        !text.contains('=')
            && is_wrapped(text, '(', ')')
            && split_top_level(&text[1..text.len() - 1], ",").len() == 2
    }
}
