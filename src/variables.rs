//! Independent variables: the default one and the functions sampled over each.

use std::collections::{BTreeMap, BTreeSet};

use crate::parameters::ParameterTable;
use crate::types::{FunctionId, ParameterId};

/// Tracks the default independent variable and which functions are sampled over which
/// variable.
///
/// Links are kept in both directions and always mirror each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndependentVariableManager {
    default: Option<ParameterId>,
    functions: BTreeMap<ParameterId, BTreeSet<FunctionId>>,
    variables: BTreeMap<FunctionId, ParameterId>,
}

impl IndependentVariableManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_variable(&self) -> Option<ParameterId> {
        self.default
    }

    pub fn set_default(&mut self, variable: Option<ParameterId>) {
        self.default = variable;
    }

    /// Full name of the default variable, if it still exists.
    pub fn default_name(&self, parameters: &ParameterTable) -> Option<String> {
        self.default
            .and_then(|id| parameters.get(id))
            .map(|p| p.full_name())
    }

    /// Links `function` to `variable`, dropping its previous link.
    pub fn link(&mut self, variable: ParameterId, function: FunctionId) {
        self.unlink(function);
        self.functions.entry(variable).or_default().insert(function);
        self.variables.insert(function, variable);
    }

    pub fn unlink(&mut self, function: FunctionId) -> Option<ParameterId> {
        let variable = self.variables.remove(&function)?;
        if let Some(linked) = self.functions.get_mut(&variable) {
            linked.remove(&function);
            if linked.is_empty() {
                self.functions.remove(&variable);
            }
        }
        Some(variable)
    }

    pub fn variable_of(&self, function: FunctionId) -> Option<ParameterId> {
        self.variables.get(&function).copied()
    }

    pub fn functions_of(&self, variable: ParameterId) -> Vec<FunctionId> {
        self.functions
            .get(&variable)
            .map(|linked| linked.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Forgets a deleted variable and returns the functions that were sampled over it.
    pub fn remove_variable(&mut self, variable: ParameterId) -> Vec<FunctionId> {
        if self.default == Some(variable) {
            self.default = None;
        }
        let orphaned: Vec<FunctionId> = self
            .functions
            .remove(&variable)
            .map(|linked| linked.into_iter().collect())
            .unwrap_or_default();
        for function in &orphaned {
            self.variables.remove(function);
        }
        orphaned
    }

    pub fn is_symmetric(&self) -> bool {
        let forward = self
            .functions
            .iter()
            .all(|(var, fns)| fns.iter().all(|f| self.variables.get(f) == Some(var)));
        let backward = self.variables.iter().all(|(f, var)| {
            self.functions
                .get(var)
                .is_some_and(|linked| linked.contains(f))
        });
        forward && backward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relink_moves_function() {
        let mut manager = IndependentVariableManager::new();
        manager.link(ParameterId(0), FunctionId(0));
        manager.link(ParameterId(1), FunctionId(0));
        assert!(manager.functions_of(ParameterId(0)).is_empty());
        assert_eq!(manager.functions_of(ParameterId(1)), vec![FunctionId(0)]);
        assert!(manager.is_symmetric());
    }

    #[test]
    fn test_remove_variable_orphans_functions() {
        let mut manager = IndependentVariableManager::new();
        manager.set_default(Some(ParameterId(0)));
        manager.link(ParameterId(0), FunctionId(0));
        manager.link(ParameterId(0), FunctionId(1));
        let orphaned = manager.remove_variable(ParameterId(0));
        assert_eq!(orphaned, vec![FunctionId(0), FunctionId(1)]);
        assert_eq!(manager.default_variable(), None);
        assert_eq!(manager.variable_of(FunctionId(0)), None);
        assert!(manager.is_symmetric());
    }
}
