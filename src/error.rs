// src/error.rs
//! Outcomes of a rejected or failed attribute query.
//!
//! A [`Rejection`] is the caller's problem: the query was decided against
//! and the caller gets a signed status response saying why. A
//! [`ServiceError`] is the operator's problem: nothing was decided and the
//! caller gets an unsigned diagnostic.

use crate::models::response::StatusCode;
use crate::saml::codec::DecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Rejection {
    #[error("cannot decode query: {0}")]
    Decode(#[from] DecodeError),

    #[error("malformed query: {0}")]
    Structure(String),

    #[error("query signature does not verify against credential '{0}'")]
    Signature(String),

    #[error("subject '{0}' is not eligible for attribute release")]
    EligibilityDenied(String),

    #[error("authentication assertion rejected: {0}")]
    AuthnAssertion(String),

    #[error("subject '{0}' not found in directory")]
    SubjectNotFound(String),
}

impl Rejection {
    /// Status codes of the response answering this rejection, outer first.
    pub fn status_codes(&self) -> [StatusCode; 2] {
        match self {
            Rejection::Decode(_) | Rejection::Structure(_) | Rejection::Signature(_) => {
                [StatusCode::Requester, StatusCode::RequestDenied]
            }
            Rejection::EligibilityDenied(_) | Rejection::SubjectNotFound(_) => {
                [StatusCode::Responder, StatusCode::UnknownPrincipal]
            }
            Rejection::AuthnAssertion(_) => [StatusCode::Requester, StatusCode::NoAuthnContext],
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("attribute directory unavailable: {0}")]
    BackendUnavailable(String),

    #[error("cannot construct response: {0}")]
    ResponseConstruction(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_rejection_maps_to_one_pair() {
        let cases = [
            (
                Rejection::Structure("missing ID".to_string()),
                [StatusCode::Requester, StatusCode::RequestDenied],
            ),
            (
                Rejection::Signature("https://sp.example.org".to_string()),
                [StatusCode::Requester, StatusCode::RequestDenied],
            ),
            (
                Rejection::EligibilityDenied("johndoe".to_string()),
                [StatusCode::Responder, StatusCode::UnknownPrincipal],
            ),
            (
                Rejection::AuthnAssertion("expired".to_string()),
                [StatusCode::Requester, StatusCode::NoAuthnContext],
            ),
            (
                Rejection::SubjectNotFound("johndoe".to_string()),
                [StatusCode::Responder, StatusCode::UnknownPrincipal],
            ),
        ];
        for (rejection, codes) in cases {
            assert_eq!(rejection.status_codes(), codes, "{}", rejection);
        }
    }
}
