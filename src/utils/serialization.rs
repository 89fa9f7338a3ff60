// src/utils/serialization.rs
//! Serialization utilities.
//!
//! Provides:
//! - JSON loading for the small lookup files (attribute mapping, eligibility
//!   policies, property directory)
//! - Base64 helpers tolerant of the line breaks other SAML stacks insert

use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Reads and deserializes a JSON file.
///
/// # Arguments
/// * `path` - Location of the JSON document
///
/// # Returns
/// - `Ok(T)` with deserialized value on success
/// - `Err(anyhow::Error)` naming the file if reading or parsing fails
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
    serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("cannot parse {}: {}", path.display(), e))
}

/// Encodes bytes as standard (padded) base64.
pub fn encode_base64(data: &[u8]) -> String {
    base64::encode(data)
}

/// Decodes standard base64, ignoring embedded whitespace.
///
/// # Arguments
/// * `data` - Base64 text, possibly wrapped over several lines
///
/// # Returns
/// - `Ok(Vec<u8>)` with the decoded bytes
/// - `Err(base64::DecodeError)` on invalid input
pub fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::decode(compact)
}
