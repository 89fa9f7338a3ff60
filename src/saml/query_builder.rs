// src/saml/query_builder.rs
//! Client side: builds signed extended attribute queries.
//!
//! An extended query carries, in its `Extensions`, a signed assertion
//! proving the subject authenticated shortly before the query was sent.

use crate::config::{QuerySenderSettings, SamlSettings};
use crate::credentials::CredentialStore;
use crate::models::attribute::AttributeSpec;
use crate::saml::format_instant;
use crate::saml::signature::{sign_element, SignatureError};
use crate::saml::xml::Element;
use crate::utils::crypto::generate_identifier;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct QueryBuilder {
    issuer: String,
    name_id_format: String,
    destination: Option<String>,
    assurance_level: String,
    subject_confirmation_method: String,
    credentials: Arc<dyn CredentialStore>,
}

impl QueryBuilder {
    pub fn new(
        saml: &SamlSettings,
        sender: &QuerySenderSettings,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            issuer: saml.issuer.clone(),
            name_id_format: saml.name_id_format.clone(),
            destination: sender.url.clone(),
            assurance_level: sender.assurance_level.clone(),
            subject_confirmation_method: sender.subject_confirmation_method.clone(),
            credentials,
        }
    }

    /// Builds a signed query, optionally carrying a fresh authentication
    /// assertion for the same subject.
    pub fn build(
        &self,
        subject_id: &str,
        attributes: &[AttributeSpec],
        embed_assertion: bool,
        now: DateTime<Utc>,
    ) -> Result<Element, SignatureError> {
        let assertion = if embed_assertion {
            Some(self.assertion(subject_id, now)?)
        } else {
            None
        };
        self.query(subject_id, attributes, assertion, now)
    }

    /// Builds a signed authentication assertion about `subject_id`.
    ///
    /// The assertion is valid from five minutes before `now` until five
    /// minutes after it, with the authentication one minute into that window.
    pub fn assertion(&self, subject_id: &str, now: DateTime<Utc>) -> Result<Element, SignatureError> {
        let issued = now - Duration::minutes(4);

        let mut assertion = Element::saml("Assertion")
            .attr("ID", generate_identifier())
            .attr("Version", "2.0")
            .attr("IssueInstant", format_instant(issued))
            .child(Element::saml("Issuer").text(self.issuer.as_str()))
            .child(
                Element::saml("Subject")
                    .child(self.name_id(subject_id))
                    .child(
                        Element::saml("SubjectConfirmation")
                            .attr("Method", self.subject_confirmation_method.as_str()),
                    ),
            )
            .child(
                Element::saml("Conditions")
                    .attr("NotBefore", format_instant(now - Duration::minutes(5)))
                    .attr("NotOnOrAfter", format_instant(now + Duration::minutes(5)))
                    .child(
                        Element::saml("AudienceRestriction").child(
                            Element::saml("Audience").text(self.issuer.as_str()),
                        ),
                    ),
            )
            .child(
                Element::saml("AuthnStatement")
                    .attr("AuthnInstant", format_instant(issued))
                    .child(
                        Element::saml("AuthnContext").child(
                            Element::saml("AuthnContextClassRef")
                                .text(self.assurance_level.as_str()),
                        ),
                    ),
            );

        sign_element(&mut assertion, &self.credentials.signing_credential()?)?;
        Ok(assertion)
    }

    /// Builds and signs the query around an already built assertion.
    pub fn query(
        &self,
        subject_id: &str,
        attributes: &[AttributeSpec],
        assertion: Option<Element>,
        now: DateTime<Utc>,
    ) -> Result<Element, SignatureError> {
        let mut query = Element::samlp("AttributeQuery")
            .attr("ID", generate_identifier())
            .attr("Version", "2.0")
            .attr("IssueInstant", format_instant(now));
        if let Some(destination) = &self.destination {
            query.set_attribute("Destination", destination.as_str());
        }
        query = query.child(Element::saml("Issuer").text(self.issuer.as_str()));

        if let Some(assertion) = assertion {
            query = query.child(Element::samlp("Extensions").child(assertion));
        }

        query = query.child(Element::saml("Subject").child(self.name_id(subject_id)));
        for spec in attributes {
            let mut attribute = Element::saml("Attribute").attr("Name", spec.name.as_str());
            if let Some(format) = &spec.name_format {
                attribute.set_attribute("NameFormat", format.as_str());
            }
            if let Some(friendly_name) = &spec.friendly_name {
                attribute.set_attribute("FriendlyName", friendly_name.as_str());
            }
            query = query.child(attribute);
        }

        sign_element(&mut query, &self.credentials.signing_credential()?)?;
        Ok(query)
    }

    fn name_id(&self, subject_id: &str) -> Element {
        Element::saml("NameID")
            .attr("Format", self.name_id_format.as_str())
            .text(subject_id)
    }
}
