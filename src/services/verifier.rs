// src/services/verifier.rs
//! Signature verification service.
//!
//! Checks signatures found on received messages against the trusted keys of
//! the credential store. Keys are looked up by the alias the caller names
//! (the issuer of the signed message), never by anything carried inside the
//! signed message itself.

use crate::credentials::CredentialStore;
use crate::saml::signature::XmlSignature;
use log::{debug, error};
use std::sync::Arc;

/// Signature verifier backed by a credential store.
///
/// The Verifier provides:
/// - Thread-safe key lookup via `Arc<dyn CredentialStore>`
/// - Fail-closed verification: every failure is logged and reported as `false`
#[derive(Clone)]
pub struct Verifier {
    /// Store holding the trusted verification keys
    credentials: Arc<dyn CredentialStore>,
}

impl Verifier {
    /// Constructs a new Verifier instance.
    ///
    /// # Arguments
    /// * `credentials` - Shared credential store with the trusted keys
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self { credentials }
    }

    /// Verifies a signature against the key registered for `alias`.
    ///
    /// # Arguments
    /// * `signature` - Signature taken from the message, if it had one
    /// * `alias` - Name of the trusted key to check against
    ///
    /// # Returns
    /// `true` only if a key is registered for `alias` and the signature
    /// (reference, digest and value) verifies with it
    pub fn verify(&self, signature: Option<&XmlSignature>, alias: &str) -> bool {
        let signature = match signature {
            Some(signature) => signature,
            None => {
                error!("Message from '{}' is not signed", alias);
                return false;
            }
        };

        let key = match self.credentials.verification_credential(alias) {
            Ok(key) => key,
            Err(e) => {
                error!("No verification credential for '{}': {}", alias, e);
                return false;
            }
        };

        match signature.verify_with(&key) {
            Ok(()) => {
                debug!(
                    "Signature on '{}' verified with credential '{}'",
                    signature.element_id, alias
                );
                true
            }
            Err(e) => {
                error!(
                    "Signature on '{}' does not verify with credential '{}': {}",
                    signature.element_id, alias, e
                );
                false
            }
        }
    }
}
