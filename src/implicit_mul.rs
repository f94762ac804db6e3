//! Implicit multiplication insertion for natural notation.
//!
//! A single left-to-right scan inserts `*` between adjacent characters where a product is
//! implied:
//!
//! - digit followed by a letter or `(`: `2x` → `2*x`, `2(x)` → `2*(x)`
//! - letter followed by a digit: `x2` → `x*2`
//! - letter followed by a letter: `xy` → `x*y`
//! - `)` followed by a letter, digit or `(`: `(a)b` → `(a)*b`
//!
//! A subscript span `_{...}` is copied verbatim and closes an identifier, so `k_{1}x`
//! becomes `k_{1}*x`. Call sites of builtin functions are found before the scan (walking
//! back from every `(`) and left intact: `sin(x)` stays `sin(x)` and `2sin(x)` becomes
//! `2*sin(x)`. Letters are anything `char::is_alphabetic` accepts, so Greek glyphs count.

use crate::symbols::SymbolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Digit,
    Letter,
    Prime,
    Open,
    Close,
}

fn classify(chars: &[char], i: usize) -> Option<Class> {
    let c = chars[i];
    match c {
        '0'..='9' => Some(Class::Digit),
        '.' => {
            let digit_before = i > 0 && chars[i - 1].is_ascii_digit();
            let digit_after = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            (digit_before || digit_after).then_some(Class::Digit)
        }
        '\'' => Some(Class::Prime),
        '(' => Some(Class::Open),
        ')' => Some(Class::Close),
        c if c.is_alphabetic() => Some(Class::Letter),
        _ => None,
    }
}

fn implies_product(prev: Class, next: Class) -> bool {
    matches!(
        (prev, next),
        (Class::Digit, Class::Letter | Class::Open)
            | (Class::Letter | Class::Prime, Class::Digit | Class::Letter)
            | (Class::Close, Class::Letter | Class::Digit | Class::Open)
    )
}

/// Builtin call sites: `region[i]` holds the start index of the builtin name covering
/// character `i`, `call_paren[i]` marks a `(` that opens a builtin call.
struct CallSites {
    region: Vec<Option<usize>>,
    call_paren: Vec<bool>,
}

fn find_builtin_calls(chars: &[char], symbols: &SymbolRegistry) -> CallSites {
    let mut sites = CallSites {
        region: vec![None; chars.len()],
        call_paren: vec![false; chars.len()],
    };
    for (paren, _) in chars.iter().enumerate().filter(|(_, c)| **c == '(') {
        let mut start = paren;
        while start > 0 && chars[start - 1].is_alphanumeric() {
            start -= 1;
        }
        // longest suffix of the run that names a builtin function
        let found = (start..paren).find(|&from| {
            chars[from].is_alphabetic()
                && symbols.is_builtin_function(&chars[from..paren].iter().collect::<String>())
        });
        if let Some(from) = found {
            for slot in &mut sites.region[from..paren] {
                *slot = Some(from);
            }
            sites.call_paren[paren] = true;
        }
    }
    sites
}

fn subscript_end(chars: &[char], open: usize) -> usize {
    let mut depth = 0usize;
    for (i, c) in chars.iter().enumerate().skip(open) {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
    }
    chars.len() - 1
}

/// Inserts `*` wherever multiplication is implied by adjacency.
///
/// # Example
/// ```
/// use paramflow::implicit_mul::insert_implicit_multiplication;
/// use paramflow::symbols::SymbolRegistry;
///
/// let symbols = SymbolRegistry::builtin();
/// assert_eq!(insert_implicit_multiplication("2x", &symbols), "2*x");
/// assert_eq!(insert_implicit_multiplication("sin(x)", &symbols), "sin(x)");
/// assert_eq!(insert_implicit_multiplication("2πx", &symbols), "2*π*x");
/// ```
pub fn insert_implicit_multiplication(expr: &str, symbols: &SymbolRegistry) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let sites = find_builtin_calls(&chars, symbols);
    let mut out = String::with_capacity(expr.len() + expr.len() / 2);
    let mut prev: Option<Class> = None;
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '_' && chars.get(i + 1) == Some(&'{') {
            let end = subscript_end(&chars, i + 1);
            out.extend(&chars[i..=end]);
            prev = Some(Class::Letter);
            i = end + 1;
            continue;
        }
        // whitespace separates tokens without breaking adjacency
        if chars[i].is_whitespace() {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let class = classify(&chars, i);
        if let (Some(p), Some(c)) = (prev, class) {
            let inside_builtin = i > 0
                && sites.region[i].is_some()
                && sites.region[i] == sites.region[i - 1];
            if implies_product(p, c) && !inside_builtin && !sites.call_paren[i] {
                out.push('*');
            }
        }
        out.push(chars[i]);
        prev = class;
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imul(expr: &str) -> String {
        insert_implicit_multiplication(expr, &SymbolRegistry::builtin())
    }

    #[test]
    fn test_whitespace_keeps_adjacency() {
        assert_eq!(imul("2 x"), "2 *x");
        assert_eq!(imul("2 π"), "2 *π");
        assert_eq!(imul("(x + 1) (x - 1)"), "(x + 1) *(x - 1)");
        assert_eq!(imul("x + y"), "x + y");
        assert_eq!(imul("sin (x)"), "sin (x)");
    }

    #[test]
    fn test_number_letter() {
        assert_eq!(imul("2x"), "2*x");
        assert_eq!(imul("2.5x"), "2.5*x");
        assert_eq!(imul("x2"), "x*2");
    }

    #[test]
    fn test_letter_letter() {
        assert_eq!(imul("xy"), "x*y");
        assert_eq!(imul("abc"), "a*b*c");
        assert_eq!(imul("2πx"), "2*π*x");
    }

    #[test]
    fn test_parentheses() {
        assert_eq!(imul("2(x+1)"), "2*(x+1)");
        assert_eq!(imul("(a)(b)"), "(a)*(b)");
        assert_eq!(imul("(a)b"), "(a)*b");
        assert_eq!(imul("(a)2"), "(a)*2");
        assert_eq!(imul("x(y)"), "x(y)");
    }

    #[test]
    fn test_builtin_calls_untouched() {
        assert_eq!(imul("sin(x)"), "sin(x)");
        assert_eq!(imul("sin(kx)"), "sin(k*x)");
        assert_eq!(imul("2sin(x)"), "2*sin(x)");
        assert_eq!(imul("xsin(x)"), "x*sin(x)");
        assert_eq!(imul("asin(x)"), "asin(x)");
        assert_eq!(imul("log10(x)"), "log10(x)");
        assert_eq!(imul("atan2(y,x)"), "atan2(y,x)");
        assert_eq!(imul("sin(x)cos(x)"), "sin(x)*cos(x)");
    }

    #[test]
    fn test_subscript_span_is_atomic() {
        assert_eq!(imul("k_{1}x"), "k_{1}*x");
        assert_eq!(imul("2k_{12}"), "2*k_{12}");
        assert_eq!(imul("k_{ab}"), "k_{ab}");
        assert_eq!(imul("k_{1}2"), "k_{1}*2");
        assert_eq!(imul("f_{1}(x)"), "f_{1}(x)");
    }

    #[test]
    fn test_primes_continue_identifier() {
        assert_eq!(imul("a'x"), "a'*x");
        assert_eq!(imul("2a'"), "2*a'");
    }

    #[test]
    fn test_definitions_keep_their_shape() {
        assert_eq!(imul("f(x) = 2x"), "f(x) = 2*x");
        assert_eq!(imul("k = 5"), "k = 5");
        assert_eq!(imul("x + y"), "x + y");
    }

    quickcheck::quickcheck! {
        fn prop_insertion_is_idempotent(picks: Vec<u8>) -> bool {
            const ALPHABET: &[u8] = b"xk2.()+ ";
            let expr: String = picks
                .iter()
                .map(|p| ALPHABET[*p as usize % ALPHABET.len()] as char)
                .collect();
            let once = imul(&expr);
            imul(&once) == once
        }
    }
}
