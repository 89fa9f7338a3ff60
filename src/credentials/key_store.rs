// src/credentials/key_store.rs
//! In-memory key store for the attribute authority.
//!
//! Holds:
//! - the service's secp256k1 signing key (via the `k256` crate)
//! - trusted peer verification keys, indexed by alias
//!
//! Key material is decoded once at startup and read-only afterwards, so the
//! store can be shared across request tasks without locking.

use crate::config::CredentialSettings;
use crate::credentials::{CredentialError, CredentialStore, SigningCredential};
use crate::utils::serialization::{decode_base64, encode_base64};
use k256::ecdsa::{SigningKey, VerifyingKey};
use log::{info, warn};
use rand::rngs::OsRng;
use std::collections::HashMap;

/// Key store backed by configuration.
///
/// # Security Notes
/// - The secret key is never exposed through `Debug`
/// - Lookups are by alias only
#[derive(Clone)]
pub struct KeyStore {
    signing: Option<SigningCredential>,
    trusted: HashMap<String, VerifyingKey>,
}

impl KeyStore {
    /// Builds a key store from the `credentials` settings section.
    ///
    /// # Arguments
    /// * `settings` - Signing key, its alias and the trusted peer keys
    ///
    /// # Returns
    /// The populated store, or an error naming the first undecodable key
    ///
    /// # Notes
    /// The service's own verifying key is registered under its signing alias,
    /// so messages signed by this authority verify against it.
    pub fn from_settings(settings: &CredentialSettings) -> Result<Self, CredentialError> {
        let mut store = KeyStore {
            signing: None,
            trusted: HashMap::new(),
        };

        match &settings.signing_key {
            Some(encoded) => {
                let key = decode_signing_key(&settings.signing_alias, encoded)?;
                store = store.with_signing_key(&settings.signing_alias, key);
            }
            None => warn!("No signing key configured; every response will fail to sign"),
        }

        for trusted in &settings.trusted {
            let key = decode_verifying_key(&trusted.alias, &trusted.public_key)?;
            store.trusted.insert(trusted.alias.clone(), key);
        }

        info!(
            "Key store ready: signing alias '{}', {} trusted key(s)",
            settings.signing_alias,
            store.trusted.len()
        );
        Ok(store)
    }

    /// Generates a key store with a fresh random signing key.
    ///
    /// Used for development setups and tests.
    pub fn generate(alias: &str) -> Self {
        let key = SigningKey::random(&mut OsRng);
        KeyStore {
            signing: None,
            trusted: HashMap::new(),
        }
        .with_signing_key(alias, key)
    }

    /// Sets the signing key and trusts its public half under the same alias.
    pub fn with_signing_key(mut self, alias: &str, key: SigningKey) -> Self {
        self.trusted.insert(alias.to_string(), key.verifying_key().clone());
        self.signing = Some(SigningCredential {
            alias: alias.to_string(),
            key,
        });
        self
    }

    /// Registers an additional trusted verification key.
    pub fn trust(mut self, alias: &str, key: VerifyingKey) -> Self {
        self.trusted.insert(alias.to_string(), key);
        self
    }

    /// Base64 SEC1 encoding of the signing key's public half, for distribution
    /// to peers.
    pub fn public_key_base64(&self) -> Option<String> {
        self.signing.as_ref().map(|credential| {
            encode_base64(credential.verifying_key().to_encoded_point(true).as_bytes())
        })
    }
}

impl CredentialStore for KeyStore {
    fn verification_credential(&self, alias: &str) -> Result<VerifyingKey, CredentialError> {
        self.trusted
            .get(alias)
            .cloned()
            .ok_or_else(|| CredentialError::UnknownAlias(alias.to_string()))
    }

    fn signing_credential(&self) -> Result<SigningCredential, CredentialError> {
        self.signing.clone().ok_or(CredentialError::MissingSigningKey)
    }
}

fn decode_signing_key(alias: &str, encoded: &str) -> Result<SigningKey, CredentialError> {
    let bytes = decode_base64(encoded).map_err(|e| CredentialError::InvalidKey {
        alias: alias.to_string(),
        reason: e.to_string(),
    })?;
    SigningKey::from_slice(&bytes).map_err(|e| CredentialError::InvalidKey {
        alias: alias.to_string(),
        reason: e.to_string(),
    })
}

fn decode_verifying_key(alias: &str, encoded: &str) -> Result<VerifyingKey, CredentialError> {
    let bytes = decode_base64(encoded).map_err(|e| CredentialError::InvalidKey {
        alias: alias.to_string(),
        reason: e.to_string(),
    })?;
    VerifyingKey::from_sec1_bytes(&bytes).map_err(|e| CredentialError::InvalidKey {
        alias: alias.to_string(),
        reason: e.to_string(),
    })
}
