//! Name collision detection between parameters and functions.
//!
//! Parameters and functions share one namespace keyed by full name (`k`, `k'`, `k_{1}`).
//! When a new name is taken, up to three free alternatives are offered: the first free
//! numbered subscript, the first free primed form and the first free descriptive subscript.

use crate::errors::{NameCollision, NameOwner};
use crate::types::ParsedName;

const DESCRIPTIVE_SUBSCRIPTS: &[&str] = &["alt", "new", "b"];
const MAX_NUMBERED: u32 = 9;
const MAX_PRIMES: u8 = 2;

/// Checks new names against the names already in use.
///
/// `owner_of` answers which kind of entity holds a full name, if any.
pub struct CollisionDetector<F>
where
    F: Fn(&str) -> Option<NameOwner>,
{
    owner_of: F,
}

impl<F> CollisionDetector<F>
where
    F: Fn(&str) -> Option<NameOwner>,
{
    pub fn new(owner_of: F) -> Self {
        Self { owner_of }
    }

    fn is_free(&self, full_name: &str) -> bool {
        (self.owner_of)(full_name).is_none()
    }

    /// Fails with suggestions when `name` is already in use.
    pub fn check(&self, name: &ParsedName) -> Result<(), NameCollision> {
        let full = name.full_name();
        match (self.owner_of)(&full) {
            None => Ok(()),
            Some(owner) => Err(NameCollision {
                name: full,
                owner,
                suggestions: self.suggestions(name),
            }),
        }
    }

    /// Free alternatives for `name`, in preference order.
    pub fn suggestions(&self, name: &ParsedName) -> Vec<String> {
        let letter = &name.name;
        let numbered =
            (1..=MAX_NUMBERED).map(|n| ParsedName::with_subscript(letter.clone(), n.to_string()));
        let primed = (1..=MAX_PRIMES).map(|primes| ParsedName {
            name: letter.clone(),
            primes,
            subscript: None,
        });
        let descriptive = DESCRIPTIVE_SUBSCRIPTS
            .iter()
            .map(|sub| ParsedName::with_subscript(letter.clone(), *sub));

        let full = name.full_name();
        let mut suggestions = Vec::new();
        let groups: [Vec<ParsedName>; 3] = [
            numbered.collect(),
            primed.collect(),
            descriptive.collect(),
        ];
        for group in groups {
            let free = group
                .into_iter()
                .map(|candidate| candidate.full_name())
                .find(|candidate| *candidate != full && self.is_free(candidate));
            suggestions.extend(free);
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn detector(
        taken: &[(&str, NameOwner)],
    ) -> CollisionDetector<impl Fn(&str) -> Option<NameOwner>> {
        let taken: BTreeMap<String, NameOwner> =
            taken.iter().map(|(n, o)| (n.to_string(), *o)).collect();
        CollisionDetector::new(move |name: &str| taken.get(name).copied())
    }

    #[test]
    fn test_free_name_passes() {
        let detector = detector(&[("a", NameOwner::Parameter)]);
        assert!(detector.check(&ParsedName::new("k")).is_ok());
    }

    #[test]
    fn test_collision_reports_owner_and_suggestions() {
        let detector = detector(&[("k", NameOwner::Function)]);
        let err = detector.check(&ParsedName::new("k")).unwrap_err();
        assert_eq!(err.owner, NameOwner::Function);
        assert_eq!(err.suggestions, vec!["k_{1}", "k'", "k_{alt}"]);
    }

    #[test]
    fn test_suggestions_skip_taken_names() {
        let detector = detector(&[
            ("k", NameOwner::Parameter),
            ("k_{1}", NameOwner::Parameter),
            ("k_{2}", NameOwner::Parameter),
            ("k'", NameOwner::Function),
            ("k_{alt}", NameOwner::Parameter),
        ]);
        let err = detector.check(&ParsedName::new("k")).unwrap_err();
        assert_eq!(err.suggestions, vec!["k_{3}", "k''", "k_{new}"]);
    }

    #[test]
    fn test_at_most_three_suggestions() {
        let detector = detector(&[("a", NameOwner::Parameter)]);
        assert!(detector.suggestions(&ParsedName::new("a")).len() <= 3);
    }
}
