// src/lib.rs
//! # Attribute Authority
//!
//! A SAML 2.0 Attribute Authority. It receives signed, extended attribute
//! queries, decides whether the requester may learn about the subject, looks
//! the attributes up in a directory and answers with a signed attribute
//! assertion or a signed status response.
//!
//! ## Layout
//! 1. **Models**: attribute specs, queries, responses
//! 2. **SAML**: XML tree, enveloped signatures, bindings, builders
//! 3. **Credentials**: signing key and trusted peer keys
//! 4. **Backends**: directory, name mapper, eligibility policy
//! 5. **Services**: validation pipeline, HTTP server, query sender

pub mod config;
pub mod credentials;
pub mod directory;
pub mod eligibility;
pub mod error;
pub mod models;
pub mod saml;
pub mod services;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;
