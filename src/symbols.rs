//! Symbol canonicalization: aliases, display glyphs, builtin functions and constants.
//!
//! The registry is built once from a `SymbolTable` and is immutable afterwards. A hardcoded
//! table is always loaded first, so `sin`, `cos`, `pi` and friends resolve even when an
//! external table is missing or broken; an external table can only add to it.
//!
//! Builtin membership is a closed enumeration: the math functions the evaluator can call
//! are listed in [`MATH_FUNCTIONS`], constants carry their value in the table.
//!
//! # Example
//!
//! ```
//! use paramflow::symbols::SymbolRegistry;
//!
//! let symbols = SymbolRegistry::builtin();
//! assert_eq!(symbols.normalize_expression("\\alpha + pi"), "α + π");
//! assert!(symbols.is_builtin("sin"));
//! assert_eq!(symbols.value_of("τ"), Some(std::f64::consts::TAU));
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::f64::consts::{E, PI, TAU};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::SymbolTableError;

/// Implementation of a builtin math function.
#[derive(Debug, Clone, Copy)]
pub enum MathFn {
    Unary(fn(f64) -> f64),
    Binary(fn(f64, f64) -> f64),
}

impl MathFn {
    pub fn arity(&self) -> usize {
        match self {
            MathFn::Unary(_) => 1,
            MathFn::Binary(_) => 2,
        }
    }

    /// Applies the function; `args` must have exactly `arity()` elements.
    pub fn apply(&self, args: &[f64]) -> Option<f64> {
        match (self, args) {
            (MathFn::Unary(f), [a]) => Some(f(*a)),
            (MathFn::Binary(f), [a, b]) => Some(f(*a, *b)),
            _ => None,
        }
    }
}

fn sec(x: f64) -> f64 {
    1.0 / x.cos()
}

fn csc(x: f64) -> f64 {
    1.0 / x.sin()
}

fn cot(x: f64) -> f64 {
    1.0 / x.tan()
}

fn sign(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x.signum()
    }
}

/// Every function the evaluator knows how to call.
pub const MATH_FUNCTIONS: &[(&str, MathFn)] = &[
    ("sin", MathFn::Unary(f64::sin)),
    ("cos", MathFn::Unary(f64::cos)),
    ("tan", MathFn::Unary(f64::tan)),
    ("sec", MathFn::Unary(sec)),
    ("csc", MathFn::Unary(csc)),
    ("cot", MathFn::Unary(cot)),
    ("asin", MathFn::Unary(f64::asin)),
    ("acos", MathFn::Unary(f64::acos)),
    ("atan", MathFn::Unary(f64::atan)),
    ("atan2", MathFn::Binary(f64::atan2)),
    ("sinh", MathFn::Unary(f64::sinh)),
    ("cosh", MathFn::Unary(f64::cosh)),
    ("tanh", MathFn::Unary(f64::tanh)),
    ("asinh", MathFn::Unary(f64::asinh)),
    ("acosh", MathFn::Unary(f64::acosh)),
    ("atanh", MathFn::Unary(f64::atanh)),
    ("exp", MathFn::Unary(f64::exp)),
    ("ln", MathFn::Unary(f64::ln)),
    ("log", MathFn::Unary(f64::ln)),
    ("log10", MathFn::Unary(f64::log10)),
    ("log2", MathFn::Unary(f64::log2)),
    ("sqrt", MathFn::Unary(f64::sqrt)),
    ("cbrt", MathFn::Unary(f64::cbrt)),
    ("abs", MathFn::Unary(f64::abs)),
    ("sign", MathFn::Unary(sign)),
    ("floor", MathFn::Unary(f64::floor)),
    ("ceil", MathFn::Unary(f64::ceil)),
    ("round", MathFn::Unary(f64::round)),
    ("min", MathFn::Binary(f64::min)),
    ("max", MathFn::Binary(f64::max)),
    ("mod", MathFn::Binary(f64::rem_euclid)),
    ("pow", MathFn::Binary(f64::powf)),
    ("hypot", MathFn::Binary(f64::hypot)),
];

const FUNCTION_ALIASES: &[(&str, &str)] = &[
    ("arcsin", "asin"),
    ("arccos", "acos"),
    ("arctan", "atan"),
    ("arsinh", "asinh"),
    ("arcosh", "acosh"),
    ("artanh", "atanh"),
    ("sgn", "sign"),
];

const CONSTANTS: &[(&str, &[&str], f64)] = &[
    ("π", &["pi", "\\pi"], PI),
    ("τ", &["tau", "\\tau"], TAU),
    ("e", &[], E),
];

const GREEK: &[(&str, &str)] = &[
    ("α", "alpha"),
    ("β", "beta"),
    ("γ", "gamma"),
    ("δ", "delta"),
    ("ε", "epsilon"),
    ("ζ", "zeta"),
    ("η", "eta"),
    ("θ", "theta"),
    ("ι", "iota"),
    ("κ", "kappa"),
    ("λ", "lambda"),
    ("μ", "mu"),
    ("ν", "nu"),
    ("ξ", "xi"),
    ("ρ", "rho"),
    ("σ", "sigma"),
    ("υ", "upsilon"),
    ("φ", "phi"),
    ("χ", "chi"),
    ("ψ", "psi"),
    ("ω", "omega"),
    ("Γ", "Gamma"),
    ("Δ", "Delta"),
    ("Θ", "Theta"),
    ("Λ", "Lambda"),
    ("Ξ", "Xi"),
    ("Σ", "Sigma"),
    ("Φ", "Phi"),
    ("Ψ", "Psi"),
    ("Ω", "Omega"),
];

/// Operator glyphs: canonical operator, display glyph, accepted input glyphs.
const OPERATORS: &[(&str, &str, &[&str])] = &[
    ("*", "·", &["×", "·", "⋅", "∗"]),
    ("/", "÷", &["÷", "∕"]),
    ("-", "−", &["−", "–"]),
    ("sqrt", "√", &["√"]),
];

/// Kind of a symbol table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Greek,
    Constant,
    Function,
    Operator,
}

/// One entry of an external symbol table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub canonical: String,
    pub kind: SymbolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glyph: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Loadable symbol configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolTable {
    pub symbols: Vec<SymbolEntry>,
}

impl SymbolTable {
    /// The hardcoded table used as the base of every registry.
    pub fn fallback() -> Self {
        let mut symbols = Vec::new();
        for (glyph, name) in GREEK {
            symbols.push(SymbolEntry {
                canonical: glyph.to_string(),
                kind: SymbolKind::Greek,
                glyph: None,
                aliases: vec![name.to_string(), format!("\\{}", name)],
                value: None,
            });
        }
        for (canonical, aliases, value) in CONSTANTS {
            symbols.push(SymbolEntry {
                canonical: canonical.to_string(),
                kind: SymbolKind::Constant,
                glyph: None,
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
                value: Some(*value),
            });
        }
        for (name, _) in MATH_FUNCTIONS {
            symbols.push(SymbolEntry {
                canonical: name.to_string(),
                kind: SymbolKind::Function,
                glyph: None,
                aliases: FUNCTION_ALIASES
                    .iter()
                    .filter(|(_, target)| target == name)
                    .map(|(alias, _)| alias.to_string())
                    .collect(),
                value: None,
            });
        }
        for (canonical, glyph, aliases) in OPERATORS {
            symbols.push(SymbolEntry {
                canonical: canonical.to_string(),
                kind: SymbolKind::Operator,
                glyph: Some(glyph.to_string()),
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
                value: None,
            });
        }
        Self { symbols }
    }

    pub fn from_json(text: &str) -> Result<Self, SymbolTableError> {
        let table: SymbolTable = serde_json::from_str(text)?;
        if table.symbols.is_empty() {
            return Err(SymbolTableError::Empty);
        }
        Ok(table)
    }
}

/// Immutable lookup tables for canonicalizing tokens and recognizing builtins.
#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    /// Alias characters and canonical form, longest alias first
    aliases: Vec<(Vec<char>, String)>,
    alias_lookup: HashMap<String, String>,
    glyphs: HashMap<String, String>,
    operators: HashMap<char, String>,
    constants: BTreeMap<String, f64>,
    functions: BTreeMap<String, MathFn>,
    greek: BTreeSet<String>,
}

impl Default for SymbolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SymbolRegistry {
    /// Registry built from the hardcoded table only.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        // the fallback table is validated by tests
        for entry in SymbolTable::fallback().symbols {
            if let Err(err) = registry.add_entry(&entry) {
                warn!(error = %err, "skipping builtin symbol");
            }
        }
        registry.sort_aliases();
        registry
    }

    /// Registry built from the hardcoded table extended by `table`.
    pub fn with_table(table: &SymbolTable) -> Result<Self, SymbolTableError> {
        let mut registry = Self::builtin();
        for entry in &table.symbols {
            registry.add_entry(entry)?;
        }
        registry.sort_aliases();
        Ok(registry)
    }

    /// Parses an external JSON table and falls back to the builtin table on any failure.
    pub fn load_or_fallback(json: Option<&str>) -> Self {
        let Some(json) = json else {
            return Self::builtin();
        };
        match SymbolTable::from_json(json).and_then(|table| Self::with_table(&table)) {
            Ok(registry) => registry,
            Err(err) => {
                warn!(error = %err, "symbol table failed to load, using builtin table");
                Self::builtin()
            }
        }
    }

    fn empty() -> Self {
        Self {
            aliases: Vec::new(),
            alias_lookup: HashMap::new(),
            glyphs: HashMap::new(),
            operators: HashMap::new(),
            constants: BTreeMap::new(),
            functions: BTreeMap::new(),
            greek: BTreeSet::new(),
        }
    }

    fn add_entry(&mut self, entry: &SymbolEntry) -> Result<(), SymbolTableError> {
        let canonical = entry.canonical.clone();
        if canonical.is_empty() {
            return Err(SymbolTableError::InvalidEntry(
                canonical,
                "canonical form is empty".to_string(),
            ));
        }
        match entry.kind {
            SymbolKind::Greek => {
                self.greek.insert(canonical.clone());
            }
            SymbolKind::Constant => {
                let value = entry
                    .value
                    .or_else(|| self.constants.get(&canonical).copied())
                    .ok_or_else(|| {
                        SymbolTableError::InvalidEntry(
                            canonical.clone(),
                            "constant has no value".to_string(),
                        )
                    })?;
                self.constants.insert(canonical.clone(), value);
                for alias in &entry.aliases {
                    self.constants.insert(alias.clone(), value);
                }
            }
            SymbolKind::Function => {
                let function = MATH_FUNCTIONS
                    .iter()
                    .find(|(name, _)| *name == canonical)
                    .map(|(_, f)| *f)
                    .ok_or_else(|| {
                        SymbolTableError::InvalidEntry(
                            canonical.clone(),
                            "no implementation for this function".to_string(),
                        )
                    })?;
                self.functions.insert(canonical.clone(), function);
                for alias in &entry.aliases {
                    self.functions.insert(alias.clone(), function);
                }
            }
            SymbolKind::Operator => {
                for alias in &entry.aliases {
                    let mut chars = alias.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => {
                            self.operators.insert(c, canonical.clone());
                        }
                        _ => {
                            return Err(SymbolTableError::InvalidEntry(
                                canonical,
                                format!("operator glyph '{}' must be one character", alias),
                            ))
                        }
                    }
                }
            }
        }
        if let Some(glyph) = &entry.glyph {
            self.glyphs.insert(canonical.clone(), glyph.clone());
        }
        if entry.kind != SymbolKind::Operator {
            for alias in &entry.aliases {
                self.alias_lookup.insert(alias.clone(), canonical.clone());
            }
        }
        Ok(())
    }

    fn sort_aliases(&mut self) {
        let mut aliases: Vec<(Vec<char>, String)> = self
            .alias_lookup
            .iter()
            .map(|(alias, canonical)| (alias.chars().collect(), canonical.clone()))
            .collect();
        // longest first, then lexicographic for a stable order
        aliases.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        self.aliases = aliases;
    }

    /// Canonical form of a single token.
    pub fn normalize_token(&self, token: &str) -> String {
        self.alias_lookup
            .get(token)
            .cloned()
            .unwrap_or_else(|| token.to_string())
    }

    /// Display glyph of a canonical symbol.
    pub fn to_glyph(&self, canonical: &str) -> String {
        self.glyphs
            .get(canonical)
            .cloned()
            .unwrap_or_else(|| canonical.to_string())
    }

    /// Builtin functions and constants, under every accepted spelling.
    pub fn is_builtin(&self, name: &str) -> bool {
        self.functions.contains_key(name) || self.constants.contains_key(name)
    }

    pub fn is_builtin_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn is_greek(&self, name: &str) -> bool {
        self.greek.contains(name)
    }

    pub fn function(&self, name: &str) -> Option<MathFn> {
        self.functions.get(name).copied()
    }

    pub fn function_arity(&self, name: &str) -> Option<usize> {
        self.function(name).map(|f| f.arity())
    }

    /// Numeric value of a builtin constant.
    pub fn value_of(&self, name: &str) -> Option<f64> {
        self.constants.get(name).copied()
    }

    pub fn constants(&self) -> impl Iterator<Item = (&str, f64)> {
        self.constants.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn functions(&self) -> impl Iterator<Item = (&str, MathFn)> {
        self.functions.iter().map(|(name, f)| (name.as_str(), *f))
    }

    /// Closed, sorted enumeration of builtin names.
    pub fn builtin_names(&self) -> BTreeSet<String> {
        self.functions
            .keys()
            .chain(self.constants.keys())
            .cloned()
            .collect()
    }

    /// Expands aliases and backslash escapes to canonical glyphs, then operator glyphs.
    ///
    /// Alias matching is greedy (longest alias wins) and boundary-aware: a bare alias
    /// only matches when it is not part of a longer run of letters.
    pub fn normalize_expression(&self, text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let escaped = c == '\\';
            let starts_word = i == 0 || !chars[i - 1].is_alphabetic();
            if escaped || (c.is_alphabetic() && starts_word) {
                if let Some((len, canonical)) = self.match_alias(&chars[i..]) {
                    out.push_str(canonical);
                    i += len;
                    continue;
                }
            }
            match self.operators.get(&c) {
                Some(op) => out.push_str(op),
                None => out.push(c),
            }
            i += 1;
        }
        out
    }

    fn match_alias(&self, rest: &[char]) -> Option<(usize, &str)> {
        self.aliases.iter().find_map(|(alias, canonical)| {
            let len = alias.len();
            let matches = rest.len() >= len
                && rest[..len] == alias[..]
                && rest.get(len).map_or(true, |next| !next.is_alphabetic());
            matches.then_some((len, canonical.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_is_never_empty() {
        let symbols = SymbolRegistry::builtin();
        for name in ["sin", "cos", "pi", "π", "e", "sqrt"] {
            assert!(symbols.is_builtin(name), "{} should be builtin", name);
        }
        assert!(!symbols.builtin_names().is_empty());
    }

    #[test]
    fn test_fallback_entries_are_all_valid() {
        let mut registry = SymbolRegistry::empty();
        for entry in SymbolTable::fallback().symbols {
            registry.add_entry(&entry).unwrap();
        }
    }

    #[test]
    fn test_normalize_aliases() {
        let symbols = SymbolRegistry::builtin();
        assert_eq!(symbols.normalize_expression("\\alpha+\\beta"), "α+β");
        assert_eq!(symbols.normalize_expression("2pi"), "2π");
        assert_eq!(symbols.normalize_expression("sin(theta)"), "sin(θ)");
        assert_eq!(symbols.normalize_expression("arcsin(x)"), "asin(x)");
    }

    #[test]
    fn test_alias_is_boundary_aware() {
        let symbols = SymbolRegistry::builtin();
        // "eta" must not match inside "theta" or "beta"
        assert_eq!(symbols.normalize_expression("theta"), "θ");
        assert_eq!(symbols.normalize_expression("beta"), "β");
        assert_eq!(symbols.normalize_expression("alphabet"), "alphabet");
        assert_eq!(symbols.normalize_expression("spin"), "spin");
    }

    #[test]
    fn test_greedy_longest_match() {
        let symbols = SymbolRegistry::builtin();
        assert_eq!(symbols.normalize_expression("epsilon"), "ε");
        assert_eq!(symbols.normalize_expression("\\upsilon"), "υ");
    }

    #[test]
    fn test_operator_glyphs() {
        let symbols = SymbolRegistry::builtin();
        assert_eq!(symbols.normalize_expression("2×3÷4−1"), "2*3/4-1");
        assert_eq!(symbols.normalize_expression("√(x)"), "sqrt(x)");
        assert_eq!(symbols.to_glyph("*"), "·");
        assert_eq!(symbols.to_glyph("α"), "α");
    }

    #[test]
    fn test_normalize_token() {
        let symbols = SymbolRegistry::builtin();
        assert_eq!(symbols.normalize_token("\\lambda"), "λ");
        assert_eq!(symbols.normalize_token("tau"), "τ");
        assert_eq!(symbols.normalize_token("k"), "k");
    }

    #[test]
    fn test_constants_and_arity() {
        let symbols = SymbolRegistry::builtin();
        assert_eq!(symbols.value_of("pi"), Some(PI));
        assert_eq!(symbols.value_of("k"), None);
        assert_eq!(symbols.function_arity("atan2"), Some(2));
        assert_eq!(symbols.function_arity("sgn"), Some(1));
        assert!(!symbols.is_builtin("alpha"));
        assert!(symbols.is_greek("α"));
    }

    #[test]
    fn test_external_table_extends_fallback() {
        let json = r#"{"symbols": [
            {"canonical": "φ", "kind": "constant", "aliases": ["golden"], "value": 1.618}
        ]}"#;
        let symbols = SymbolRegistry::load_or_fallback(Some(json));
        assert_eq!(symbols.value_of("golden"), Some(1.618));
        assert_eq!(symbols.normalize_expression("golden"), "φ");
        assert!(symbols.is_builtin("sin"));
    }

    #[test]
    fn test_broken_table_falls_back() {
        let symbols = SymbolRegistry::load_or_fallback(Some("{not json"));
        assert!(symbols.is_builtin("cos"));
        let unknown_fn = r#"{"symbols": [{"canonical": "frobnicate", "kind": "function"}]}"#;
        let symbols = SymbolRegistry::load_or_fallback(Some(unknown_fn));
        assert!(!symbols.is_builtin("frobnicate"));
        assert!(symbols.is_builtin("tan"));
    }
}
