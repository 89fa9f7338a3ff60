// src/directory/mapper.rs
//! Translation of requested attribute names to directory attribute names.

use crate::utils::serialization::load_json_file;
use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;

/// Maps wire attribute names (often URNs) to the names a backend stores.
///
/// Names without a mapping, or mapped to an empty string, pass through
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct AttributeNameMapper {
    mapping: HashMap<String, String>,
}

impl AttributeNameMapper {
    pub fn new(mapping: HashMap<String, String>) -> Self {
        Self { mapping }
    }

    /// Loads a JSON object of `requested name -> backend name`.
    ///
    /// Without a file every name maps to itself.
    pub fn from_file(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let mapping: HashMap<String, String> = load_json_file(path)?;
                info!("Loaded {} attribute name mapping(s) from {}", mapping.len(), path.display());
                Ok(Self { mapping })
            }
            None => {
                info!("No attribute name mapping configured; names are used as requested");
                Ok(Self::default())
            }
        }
    }

    pub fn map_name(&self, name: &str) -> String {
        match self.mapping.get(name).filter(|mapped| !mapped.is_empty()) {
            Some(mapped) => {
                debug!("Mapping attribute name '{}' to '{}'", name, mapped);
                mapped.clone()
            }
            None => name.to_string(),
        }
    }

    /// Maps every name, keeping positions.
    pub fn map(&self, names: &[String]) -> Vec<String> {
        names.iter().map(|name| self.map_name(name)).collect()
    }
}
