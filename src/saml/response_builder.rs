// src/saml/response_builder.rs
//! Builds and signs outbound responses.
//!
//! Error paths get a status-only response; the success path gets a response
//! carrying one attribute assertion, valid from the moment of issue for the
//! configured number of minutes and restricted to the query issuer. The
//! assertion is signed first, then the enclosing response.

use crate::config::SamlSettings;
use crate::credentials::CredentialStore;
use crate::models::attribute::Attribute;
use crate::models::query::Query;
use crate::models::response::{AttributeResponse, Response, SignedResponse, StatusCode, StatusOutcome};
use crate::saml::signature::{sign_element, SignatureError};
use crate::saml::xml::{Element, NS_XS, NS_XSI};
use crate::saml::{format_instant, truncate_to_millis};
use crate::utils::crypto::generate_identifier;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::sync::Arc;

/// Response builder bound to the authority's identity and signing key.
#[derive(Clone)]
pub struct ResponseBuilder {
    issuer: String,
    name_id_format: String,
    validity: Duration,
    credentials: Arc<dyn CredentialStore>,
}

impl ResponseBuilder {
    /// # Arguments
    /// * `saml` - Issuer, NameID format and assertion lifetime
    /// * `credentials` - Store providing the signing credential
    pub fn new(saml: &SamlSettings, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            issuer: saml.issuer.clone(),
            name_id_format: saml.name_id_format.clone(),
            validity: Duration::minutes(saml.assertion_validity_minutes),
            credentials,
        }
    }

    /// Builds a signed status-only response.
    ///
    /// # Arguments
    /// * `destination` - Query issuer, if one was read
    /// * `in_response_to` - Query ID, if one was read
    /// * `status_codes` - Outer code, optionally followed by an inner code
    pub fn status(
        &self,
        destination: Option<&str>,
        in_response_to: Option<&str>,
        status_codes: &[StatusCode],
        now: DateTime<Utc>,
    ) -> Result<SignedResponse, SignatureError> {
        self.build(
            Response::Status(StatusOutcome {
                destination: destination.map(str::to_string),
                in_response_to: in_response_to.map(str::to_string),
                status_codes: status_codes.to_vec(),
            }),
            now,
        )
    }

    /// Builds a signed success response answering `query`.
    ///
    /// `attributes` are written in the order given.
    pub fn attributes(
        &self,
        query: &Query,
        attributes: Vec<Attribute>,
        now: DateTime<Utc>,
    ) -> Result<SignedResponse, SignatureError> {
        let now = truncate_to_millis(now);
        self.build(
            Response::Attributes(AttributeResponse {
                outcome: StatusOutcome {
                    destination: Some(query.issuer.clone()),
                    in_response_to: Some(query.id.clone()),
                    status_codes: vec![StatusCode::Success],
                },
                subject_id: query.subject_id.clone(),
                attributes,
                audience: query.issuer.clone(),
                not_before: now,
                not_on_or_after: now + self.validity,
            }),
            now,
        )
    }

    /// Renders `response` as XML and signs it.
    pub fn build(
        &self,
        response: Response,
        now: DateTime<Utc>,
    ) -> Result<SignedResponse, SignatureError> {
        let credential = self.credentials.signing_credential()?;
        let issue_instant = format_instant(now);

        let outcome = response.outcome();
        let mut element = Element::samlp("Response")
            .attr("ID", generate_identifier())
            .attr("Version", "2.0")
            .attr("IssueInstant", issue_instant.as_str());
        if let Some(destination) = &outcome.destination {
            element.set_attribute("Destination", destination.as_str());
        }
        if let Some(in_response_to) = &outcome.in_response_to {
            element.set_attribute("InResponseTo", in_response_to.as_str());
        }
        element = element
            .child(Element::saml("Issuer").text(self.issuer.as_str()))
            .child(Element::samlp("Status").child(status_code(&outcome.status_codes)));

        if let Response::Attributes(attributes) = &response {
            let mut assertion = self.assertion(attributes, &issue_instant);
            sign_element(&mut assertion, &credential)?;
            element = element.child(assertion);
        }

        sign_element(&mut element, &credential)?;
        debug!(
            "Signed response {} with status {:?}",
            element.attribute("ID").unwrap_or_default(),
            response.status_codes()
        );
        Ok(SignedResponse::new(response, element))
    }

    fn assertion(&self, response: &AttributeResponse, issue_instant: &str) -> Element {
        let statement = response.attributes.iter().fold(
            Element::saml("AttributeStatement"),
            |statement, attribute| statement.child(attribute_element(attribute)),
        );

        // signed on its own, so it declares the prefixes its values use
        Element::saml("Assertion")
            .attr("xmlns:xsi", NS_XSI)
            .attr("xmlns:xs", NS_XS)
            .attr("ID", generate_identifier())
            .attr("Version", "2.0")
            .attr("IssueInstant", issue_instant)
            .child(Element::saml("Issuer").text(self.issuer.as_str()))
            .child(
                Element::saml("Subject").child(
                    Element::saml("NameID")
                        .attr("Format", self.name_id_format.as_str())
                        .text(response.subject_id.as_str()),
                ),
            )
            .child(
                Element::saml("Conditions")
                    .attr("NotBefore", format_instant(response.not_before))
                    .attr("NotOnOrAfter", format_instant(response.not_on_or_after))
                    .child(
                        Element::saml("AudienceRestriction").child(
                            Element::saml("Audience").text(response.audience.as_str()),
                        ),
                    ),
            )
            .child(statement)
    }
}

/// Nests the codes outer-first: `[a, b]` becomes `StatusCode(a, StatusCode(b))`.
fn status_code(codes: &[StatusCode]) -> Element {
    codes
        .iter()
        .rev()
        .fold(None, |inner: Option<Element>, code| {
            let element = Element::samlp("StatusCode").attr("Value", code.uri());
            Some(match inner {
                Some(inner) => element.child(inner),
                None => element,
            })
        })
        .unwrap_or_else(|| Element::samlp("StatusCode"))
}

/// An attribute with no value gets no `AttributeValue` child.
fn attribute_element(attribute: &Attribute) -> Element {
    let mut element = Element::saml("Attribute").attr("Name", attribute.name());
    if let Some(format) = &attribute.spec.name_format {
        element.set_attribute("NameFormat", format.as_str());
    }
    if let Some(friendly_name) = &attribute.spec.friendly_name {
        element.set_attribute("FriendlyName", friendly_name.as_str());
    }
    match &attribute.value {
        Some(value) => element.child(
            Element::saml("AttributeValue")
                .attr("xsi:type", "xs:string")
                .text(value.as_str()),
        ),
        None => element,
    }
}
