// src/saml/signature.rs
//! Enveloped XML signatures.
//!
//! Every signed element carries a `ds:Signature` child right after its
//! `Issuer`. The `Reference` points at the element's `ID`; its digest covers
//! the canonical form of the element without that signature, and the
//! `SignatureValue` is an ECDSA/secp256k1 signature over the canonical form
//! of `SignedInfo`. Both canonical forms are Exclusive XML Canonicalization.
//! `KeyInfo` only names the signer and is never trusted.

use crate::credentials::{CredentialError, SigningCredential};
use crate::saml::xml::{canonicalize, Element, XmlError, NS_ASSERTION, NS_DSIG};
use crate::utils::crypto::hash_data;
use crate::utils::serialization::{decode_base64, encode_base64};
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, VerifyingKey};
use thiserror::Error;

pub const ALG_EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const ALG_ENVELOPED: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
pub const ALG_ECDSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";
pub const ALG_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("element to sign has no ID attribute")]
    MissingId,

    #[error("malformed signature: {0}")]
    Malformed(String),

    #[error("signature reference '{reference}' does not point at element '{element_id}'")]
    ReferenceMismatch {
        reference: String,
        element_id: String,
    },

    #[error("digest mismatch: signed content was altered")]
    DigestMismatch,

    #[error("signature value does not verify")]
    InvalidSignature,

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// A signature lifted off a received element, ready for verification.
///
/// The digest of the element content is computed at extraction time, so the
/// value is self-contained and no longer needs the document it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlSignature {
    /// `ID` of the element carrying the signature
    pub element_id: String,
    /// `Reference@URI` as written by the signer
    pub reference_uri: String,
    /// Signer name from `KeyInfo/KeyName`, informational only
    pub key_name: Option<String>,
    digest_value: Vec<u8>,
    computed_digest: [u8; 32],
    signed_info: Vec<u8>,
    signature_value: Vec<u8>,
}

impl XmlSignature {
    /// Extracts the enveloped signature of `element`.
    ///
    /// # Returns
    /// - `Ok(None)` if the element carries no `Signature` child
    /// - `Ok(Some(_))` with the parsed signature
    /// - `Err(_)` if a signature is present but structurally broken
    pub fn extract(element: &Element) -> Result<Option<Self>, SignatureError> {
        let signature = match element.find_child(NS_DSIG, "Signature") {
            Some(signature) => signature,
            None => return Ok(None),
        };

        let signed_info = signature
            .find_child(NS_DSIG, "SignedInfo")
            .ok_or_else(|| SignatureError::Malformed("missing SignedInfo".to_string()))?;

        let canonicalization = signed_info
            .find_child(NS_DSIG, "CanonicalizationMethod")
            .and_then(|m| m.attribute("Algorithm"));
        if canonicalization != Some(ALG_EXC_C14N) {
            return Err(SignatureError::Malformed(format!(
                "unsupported canonicalization method {:?}",
                canonicalization
            )));
        }

        let method = signed_info
            .find_child(NS_DSIG, "SignatureMethod")
            .and_then(|m| m.attribute("Algorithm"));
        if method != Some(ALG_ECDSA_SHA256) {
            return Err(SignatureError::Malformed(format!(
                "unsupported signature method {:?}",
                method
            )));
        }

        let reference = signed_info
            .find_child(NS_DSIG, "Reference")
            .ok_or_else(|| SignatureError::Malformed("missing Reference".to_string()))?;
        let digest_method = reference
            .find_child(NS_DSIG, "DigestMethod")
            .and_then(|m| m.attribute("Algorithm"));
        if digest_method != Some(ALG_SHA256) {
            return Err(SignatureError::Malformed(format!(
                "unsupported digest method {:?}",
                digest_method
            )));
        }

        let digest_value = reference
            .find_child(NS_DSIG, "DigestValue")
            .and_then(Element::text_value)
            .ok_or_else(|| SignatureError::Malformed("missing DigestValue".to_string()))
            .and_then(|v| {
                decode_base64(v).map_err(|e| SignatureError::Malformed(e.to_string()))
            })?;
        let signature_value = signature
            .find_child(NS_DSIG, "SignatureValue")
            .and_then(Element::text_value)
            .ok_or_else(|| SignatureError::Malformed("missing SignatureValue".to_string()))
            .and_then(|v| {
                decode_base64(v).map_err(|e| SignatureError::Malformed(e.to_string()))
            })?;

        Ok(Some(XmlSignature {
            element_id: element.attribute("ID").unwrap_or_default().to_string(),
            reference_uri: reference.attribute("URI").unwrap_or_default().to_string(),
            key_name: signature
                .find_path(NS_DSIG, &["KeyInfo", "KeyName"])
                .and_then(Element::text_value)
                .map(str::to_string),
            digest_value,
            computed_digest: hash_data(&canonicalize(element, true)?),
            signed_info: canonicalize(signed_info, false)?,
            signature_value,
        }))
    }

    /// Checks reference, digest and signature value against `key`.
    pub fn verify_with(&self, key: &VerifyingKey) -> Result<(), SignatureError> {
        if self.element_id.is_empty() || self.reference_uri != format!("#{}", self.element_id) {
            return Err(SignatureError::ReferenceMismatch {
                reference: self.reference_uri.clone(),
                element_id: self.element_id.clone(),
            });
        }
        if self.digest_value.as_slice() != self.computed_digest.as_slice() {
            return Err(SignatureError::DigestMismatch);
        }

        let signature = Signature::from_slice(&self.signature_value)
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;
        key.verify(&self.signed_info, &signature)
            .map_err(|_| SignatureError::InvalidSignature)
    }
}

/// Signs `element` in place with the given credential.
///
/// Any signature the element already carries is replaced. The element must
/// have an `ID` attribute for the reference to point at.
pub fn sign_element(
    element: &mut Element,
    credential: &SigningCredential,
) -> Result<(), SignatureError> {
    let id = element
        .attribute("ID")
        .filter(|id| !id.is_empty())
        .ok_or(SignatureError::MissingId)?
        .to_string();

    element.children.retain(|c| !c.is(NS_DSIG, "Signature"));
    let digest = hash_data(&canonicalize(element, true)?);

    let signed_info = Element::ds("SignedInfo")
        .child(Element::ds("CanonicalizationMethod").attr("Algorithm", ALG_EXC_C14N))
        .child(Element::ds("SignatureMethod").attr("Algorithm", ALG_ECDSA_SHA256))
        .child(
            Element::ds("Reference")
                .attr("URI", format!("#{}", id))
                .child(
                    Element::ds("Transforms")
                        .child(Element::ds("Transform").attr("Algorithm", ALG_ENVELOPED))
                        .child(Element::ds("Transform").attr("Algorithm", ALG_EXC_C14N)),
                )
                .child(Element::ds("DigestMethod").attr("Algorithm", ALG_SHA256))
                .child(Element::ds("DigestValue").text(encode_base64(&digest))),
        );

    let value: Signature = credential.key.sign(&canonicalize(&signed_info, false)?);

    let signature = Element::ds("Signature")
        .child(signed_info)
        .child(Element::ds("SignatureValue").text(encode_base64(&value.to_bytes())))
        .child(
            Element::ds("KeyInfo")
                .child(Element::ds("KeyName").text(credential.alias.clone())),
        );

    let position = element
        .children
        .iter()
        .position(|c| c.is(NS_ASSERTION, "Issuer"))
        .map(|i| i + 1)
        .unwrap_or(0);
    element.children.insert(position, signature);
    Ok(())
}
