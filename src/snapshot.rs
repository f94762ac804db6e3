//! Persisted form of a workspace.
//!
//! Parameters and functions are stored in id order with every field the core owns, so a
//! save/load cycle reproduces the workspace exactly and saving twice yields identical
//! bytes.

use serde::{Deserialize, Serialize};

use crate::errors::WorkspaceError;
use crate::types::{FunctionDefinition, Parameter, ParameterId};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_variable: Option<ParameterId>,
    pub parameters: Vec<Parameter>,
    pub functions: Vec<FunctionDefinition>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, WorkspaceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, WorkspaceError> {
        let snapshot: Snapshot = serde_json::from_str(text)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(WorkspaceError::InvalidSnapshot(format!(
                "unsupported version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParsedName;

    #[test]
    fn test_json_round_trip() {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            default_variable: Some(ParameterId(0)),
            parameters: vec![Parameter::with_value(
                ParameterId(0),
                ParsedName::with_subscript("k", "1"),
                0.1,
            )],
            functions: vec![],
        };
        let json = snapshot.to_json().unwrap();
        assert_eq!(Snapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let json = r#"{"version": 99, "parameters": [], "functions": []}"#;
        assert!(matches!(
            Snapshot::from_json(json),
            Err(WorkspaceError::InvalidSnapshot(_))
        ));
    }
}
