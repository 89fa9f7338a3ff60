// src/utils/crypto.rs
//! Cryptographic helpers shared by the signing and verification code.
//!
//! Digests use SHA-256 (via `ring`), which is the digest algorithm
//! advertised in every `ds:Reference` this service produces.

use rand::RngCore;
use ring::digest::{digest, SHA256};

/// Computes a SHA-256 hash of the input data.
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest(&SHA256, data).as_ref());
    out
}

/// Generates a random SAML message identifier.
///
/// Identifiers are `_` followed by 32 lowercase hex characters (128 bits from
/// the OS-seeded thread RNG). The leading underscore keeps the value a valid
/// `xs:ID`, which must not start with a digit.
pub fn generate_identifier() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);

    let mut id = String::with_capacity(33);
    id.push('_');
    for byte in bytes {
        id.push_str(&format!("{:02x}", byte));
    }
    id
}
