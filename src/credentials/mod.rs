// src/credentials/mod.rs
//! Signing and verification credentials.
//!
//! The pipeline only ever sees credentials through [`CredentialStore`]:
//! verification keys are fetched by alias, never from key material carried
//! inside a signed message.

pub mod key_store;

use k256::ecdsa::{SigningKey, VerifyingKey};
use thiserror::Error;

pub use key_store::KeyStore;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no verification credential registered for alias '{0}'")]
    UnknownAlias(String),

    #[error("no signing credential configured")]
    MissingSigningKey,

    #[error("invalid key material for '{alias}': {reason}")]
    InvalidKey { alias: String, reason: String },
}

/// The service's own signing key together with the alias it is published under.
#[derive(Clone)]
pub struct SigningCredential {
    pub alias: String,
    pub key: SigningKey,
}

impl SigningCredential {
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key().clone()
    }
}

impl std::fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredential")
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

/// Source of credential material.
///
/// Failures are reported as errors and are turned into verification
/// failures by callers; they never abort the process.
pub trait CredentialStore: Send + Sync {
    /// Verification key registered for `alias`.
    fn verification_credential(&self, alias: &str) -> Result<VerifyingKey, CredentialError>;

    /// The service's signing credential.
    fn signing_credential(&self) -> Result<SigningCredential, CredentialError>;
}
