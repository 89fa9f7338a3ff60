// src/directory/property.rs
//! Directory backed by a JSON file.
//!
//! The file maps subjects to their attributes:
//! ```json
//! { "johndoe": { "email": "j@example.org", "surname": "Doe" } }
//! ```

use crate::directory::{Directory, DirectoryError};
use crate::utils::serialization::load_json_file;
use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;

pub struct PropertyDirectory {
    subjects: HashMap<String, HashMap<String, String>>,
}

impl PropertyDirectory {
    /// Loads the directory file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let subjects: HashMap<String, HashMap<String, String>> = load_json_file(path)?;
        info!("Loaded {} subject(s) from {}", subjects.len(), path.display());
        Ok(Self { subjects })
    }

    pub fn from_entries(subjects: HashMap<String, HashMap<String, String>>) -> Self {
        Self { subjects }
    }
}

#[async_trait]
impl Directory for PropertyDirectory {
    async fn fetch_attributes(
        &self,
        subject_id: &str,
        names: &[String],
    ) -> Result<HashMap<String, String>, DirectoryError> {
        let attributes = self
            .subjects
            .get(subject_id)
            .ok_or_else(|| DirectoryError::SubjectNotFound(subject_id.to_string()))?;

        Ok(names
            .iter()
            .map(|name| {
                let value = attributes.get(name).cloned().unwrap_or_default();
                debug!("{}.{} = '{}'", subject_id, name, value);
                (name.clone(), value)
            })
            .collect())
    }
}
