// src/models/response.rs
//! Response data model.
//!
//! A [`Response`] is built by the pipeline and becomes a [`SignedResponse`]
//! once the response builder has signed it; only the latter can be encoded.

use crate::models::attribute::Attribute;
use crate::saml::xml::Element;
use chrono::{DateTime, Utc};
use std::fmt;

/// SAML 2.0 status codes used by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    Requester,
    Responder,
    RequestDenied,
    NoAuthnContext,
    UnknownPrincipal,
}

const STATUS_PREFIX: &str = "urn:oasis:names:tc:SAML:2.0:status:";

impl StatusCode {
    pub fn uri(&self) -> String {
        format!("{}{}", STATUS_PREFIX, self.local_name())
    }

    fn local_name(&self) -> &'static str {
        match self {
            StatusCode::Success => "Success",
            StatusCode::Requester => "Requester",
            StatusCode::Responder => "Responder",
            StatusCode::RequestDenied => "RequestDenied",
            StatusCode::NoAuthnContext => "NoAuthnContext",
            StatusCode::UnknownPrincipal => "UnknownPrincipal",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        let local = uri.strip_prefix(STATUS_PREFIX)?;
        [
            StatusCode::Success,
            StatusCode::Requester,
            StatusCode::Responder,
            StatusCode::RequestDenied,
            StatusCode::NoAuthnContext,
            StatusCode::UnknownPrincipal,
        ]
        .into_iter()
        .find(|code| code.local_name() == local)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.local_name())
    }
}

/// Envelope data shared by every response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusOutcome {
    /// Where the response goes (the query issuer, when known)
    pub destination: Option<String>,
    /// ID of the query being answered, when known
    pub in_response_to: Option<String>,
    /// Outer code first, optional inner code second
    pub status_codes: Vec<StatusCode>,
}

/// A successful attribute response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeResponse {
    pub outcome: StatusOutcome,
    pub subject_id: String,
    /// Attributes in the order they were queried
    pub attributes: Vec<Attribute>,
    /// Issuer of the query the assertion is restricted to
    pub audience: String,
    pub not_before: DateTime<Utc>,
    pub not_on_or_after: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Status(StatusOutcome),
    Attributes(AttributeResponse),
}

impl Response {
    pub fn outcome(&self) -> &StatusOutcome {
        match self {
            Response::Status(outcome) => outcome,
            Response::Attributes(response) => &response.outcome,
        }
    }

    pub fn status_codes(&self) -> &[StatusCode] {
        &self.outcome().status_codes
    }

    pub fn is_success(&self) -> bool {
        self.status_codes().first() == Some(&StatusCode::Success)
    }
}

/// A response together with its signed XML form.
///
/// Constructed only by the response builder, so holding one proves the
/// signature was applied.
#[derive(Debug, Clone)]
pub struct SignedResponse {
    response: Response,
    element: Element,
}

impl SignedResponse {
    pub(crate) fn new(response: Response, element: Element) -> Self {
        Self { response, element }
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn element(&self) -> &Element {
        &self.element
    }
}
