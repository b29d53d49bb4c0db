use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fs;
use std::path::{Path, PathBuf};

use crate::runtime::Object;


#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("configuration has no system.definition")]
    MissingDefinition,
}

// Value bound to an external name. `null` marks a callable the host
// supplies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Binding {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Binding {
    fn object(&self, name: &str) -> Object {
        match self {
            Binding::Null => Object::Function(name.to_string()),
            Binding::Bool(b) => Object::Bool(*b),
            Binding::Number(n) => Object::Number(*n),
            Binding::Text(s) => Object::Str(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(flatten)]
    pub bindings: IndexMap<String, Binding>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub system: SystemSection,
    // Blocks to run per step, cycling. Empty means every named block.
    #[serde(default)]
    pub selector: Vec<String>,
}

impl SystemConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn definition(&self) -> Result<&str, ConfigError> {
        self.system
            .definition
            .as_deref()
            .ok_or(ConfigError::MissingDefinition)
    }

    // External names, lowercased as ESDL sees them.
    pub fn externals(&self) -> Vec<String> {
        self.system
            .bindings
            .keys()
            .map(|name| name.to_lowercase())
            .collect()
    }

    // Initial values for the externals.
    pub fn objects(&self) -> IndexMap<String, Object> {
        self.system
            .bindings
            .iter()
            .map(|(name, binding)| {
                let name = name.to_lowercase();
                let object = binding.object(&name);
                (name, object)
            })
            .collect()
    }

    pub fn selector(&self) -> Option<Vec<String>> {
        if self.selector.is_empty() {
            None
        } else {
            Some(self.selector.iter().map(|s| s.to_lowercase()).collect())
        }
    }
}
