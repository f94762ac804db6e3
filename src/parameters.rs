//! The parameter table.

use std::collections::BTreeMap;

use crate::types::{Parameter, ParameterId};

/// Parameters keyed by id, with a full-name index.
///
/// Ids are allocated sequentially and never reused, so a staged parameter can be given
/// its id before it is inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterTable {
    parameters: BTreeMap<ParameterId, Parameter>,
    by_name: BTreeMap<String, ParameterId>,
    next_id: u32,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// The id the next inserted parameter would receive.
    pub fn next_id(&self) -> ParameterId {
        ParameterId(self.next_id)
    }

    pub fn get(&self, id: ParameterId) -> Option<&Parameter> {
        self.parameters.get(&id)
    }

    pub fn get_mut(&mut self, id: ParameterId) -> Option<&mut Parameter> {
        self.parameters.get_mut(&id)
    }

    pub fn id_of(&self, full_name: &str) -> Option<ParameterId> {
        self.by_name.get(full_name).copied()
    }

    pub fn by_name(&self, full_name: &str) -> Option<&Parameter> {
        self.id_of(full_name).and_then(|id| self.parameters.get(&id))
    }

    /// Inserts a parameter, replacing any parameter with the same id.
    ///
    /// Fails when another parameter already holds the name.
    pub fn insert(&mut self, parameter: Parameter) -> Result<(), String> {
        let full = parameter.full_name();
        if let Some(holder) = self.id_of(&full) {
            if holder != parameter.id {
                return Err(format!("parameter '{}' already exists", full));
            }
        }
        if let Some(old) = self.parameters.get(&parameter.id) {
            self.by_name.remove(&old.full_name());
        }
        self.next_id = self.next_id.max(parameter.id.0 + 1);
        self.by_name.insert(full, parameter.id);
        self.parameters.insert(parameter.id, parameter);
        Ok(())
    }

    pub fn remove(&mut self, id: ParameterId) -> Option<Parameter> {
        let parameter = self.parameters.remove(&id)?;
        self.by_name.remove(&parameter.full_name());
        Some(parameter)
    }

    /// Parameters in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.values()
    }

    /// Current values keyed by full name.
    pub fn values(&self) -> BTreeMap<String, f64> {
        self.parameters
            .values()
            .filter_map(|p| p.current_value().map(|v| (p.full_name(), v)))
            .collect()
    }
}
