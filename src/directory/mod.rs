// src/directory/mod.rs
//! Attribute directories.
//!
//! A [`Directory`] answers "which values does this subject have for these
//! attributes". The backend is picked once at startup from configuration and
//! handed around as `Arc<dyn Directory>`.

pub mod ldap;
pub mod mapper;
pub mod property;

use crate::config::{DirectoryKind, DirectorySettings};
use async_trait::async_trait;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub use ldap::LdapDirectory;
pub use mapper::AttributeNameMapper;
pub use property::PropertyDirectory;

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The subject has no entry. A domain outcome, not a failure.
    #[error("subject '{0}' not found in directory")]
    SubjectNotFound(String),

    /// The backend could not be reached or answered with an error.
    #[error("directory backend failure: {0}")]
    Backend(String),
}

/// Attribute store keyed by subject identifier.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Fetches the values of `names` for `subject_id`.
    ///
    /// # Returns
    /// - `Ok(map)` with an entry for every requested name; names the subject
    ///   has no value for map to an empty string
    /// - `Err(DirectoryError::SubjectNotFound)` if the subject is unknown
    /// - `Err(DirectoryError::Backend)` on any backend failure
    async fn fetch_attributes(
        &self,
        subject_id: &str,
        names: &[String],
    ) -> Result<HashMap<String, String>, DirectoryError>;
}

/// Builds the configured directory backend.
pub fn from_settings(settings: &DirectorySettings) -> anyhow::Result<Arc<dyn Directory>> {
    match settings.kind {
        DirectoryKind::Property => {
            info!(
                "Using property directory from {}",
                settings.property_file.display()
            );
            Ok(Arc::new(PropertyDirectory::from_file(&settings.property_file)?))
        }
        DirectoryKind::Ldap => {
            info!("Using LDAP directory at {}", settings.ldap.url);
            Ok(Arc::new(LdapDirectory::new(settings.ldap.clone())))
        }
    }
}
