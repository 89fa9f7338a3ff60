// src/services/attribute_service.rs
//! The attribute query pipeline.
//!
//! One call to [`AttributeService::handle`] turns one received payload into
//! one reply. The gates run strictly in order and the first one that fails
//! ends the run:
//! 1. decode the payload in the configured binding
//! 2. require query ID, issuer and subject
//! 3. verify the query signature against the issuer's credential (optional)
//! 4. ask the eligibility gate about the subject
//! 5. validate the embedded authentication assertion (optional): present,
//!    same subject, signed by its issuer (optional), inside its validity
//!    window at reception time (optional)
//! 6. resolve the attributes through the name mapper and the directory
//! 7. build, sign and encode the attribute response
//!
//! Rejections in steps 1-6 become signed status responses. A directory
//! outage or a failure to sign is reported to the transport as a
//! [`ServiceError`] instead.

use crate::config::{Binding, Settings, VerificationSettings};
use crate::credentials::{CredentialStore, KeyStore};
use crate::directory::{self, AttributeNameMapper, Directory, DirectoryError};
use crate::eligibility::{self, EligibilityGate};
use crate::error::{Rejection, ServiceError};
use crate::models::attribute::Attribute;
use crate::models::query::Query;
use crate::models::response::{Response, SignedResponse};
use crate::saml::codec::{decode_query, encode_response, EncodedPayload};
use crate::saml::response_builder::ResponseBuilder;
use crate::services::verifier::Verifier;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::sync::Arc;

/// What the transport should send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Signed attribute response in the configured binding
    Success(EncodedPayload),
    /// Signed status response, always in the SOAP binding
    Rejected(EncodedPayload),
}

impl Reply {
    pub fn payload(&self) -> &EncodedPayload {
        match self {
            Reply::Success(payload) | Reply::Rejected(payload) => payload,
        }
    }
}

enum Failure {
    Rejected(Rejection),
    Unavailable(ServiceError),
}

impl From<Rejection> for Failure {
    fn from(rejection: Rejection) -> Self {
        Failure::Rejected(rejection)
    }
}

/// Whatever could be read of the query, for addressing a status response.
#[derive(Default)]
struct Correlation {
    issuer: Option<String>,
    query_id: Option<String>,
}

/// Attribute authority pipeline.
///
/// Holds only read-only state, so one instance serves all requests
/// concurrently.
#[derive(Clone)]
pub struct AttributeService {
    binding: Binding,
    verification: VerificationSettings,
    verifier: Verifier,
    eligibility: Arc<dyn EligibilityGate>,
    directory: Arc<dyn Directory>,
    mapper: AttributeNameMapper,
    responses: ResponseBuilder,
}

impl AttributeService {
    /// Assembles the pipeline from explicit collaborators.
    ///
    /// # Arguments
    /// * `settings` - Binding, SAML identity and verification switches
    /// * `credentials` - Trusted peer keys and the signing key
    /// * `eligibility` - Release policy
    /// * `directory` - Attribute store
    /// * `mapper` - Requested name to directory name translation
    pub fn new(
        settings: &Settings,
        credentials: Arc<dyn CredentialStore>,
        eligibility: Arc<dyn EligibilityGate>,
        directory: Arc<dyn Directory>,
        mapper: AttributeNameMapper,
    ) -> Self {
        Self {
            binding: settings.saml.binding,
            verification: settings.verification,
            verifier: Verifier::new(credentials.clone()),
            eligibility,
            directory,
            mapper,
            responses: ResponseBuilder::new(&settings.saml, credentials),
        }
    }

    /// Assembles the pipeline with the backends named in `settings`.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let credentials: Arc<dyn CredentialStore> =
            Arc::new(KeyStore::from_settings(&settings.credentials)?);
        let eligibility = eligibility::from_settings(&settings.eligibility)?;
        let directory = directory::from_settings(&settings.directory)?;
        let mapper = AttributeNameMapper::from_file(settings.attribute_mapper.file.as_deref())?;

        info!(
            "Attribute service ready: issuer {}, binding {:?}, {:?}",
            settings.saml.issuer, settings.saml.binding, settings.verification
        );
        Ok(Self::new(settings, credentials, eligibility, directory, mapper))
    }

    /// Runs one received payload through the pipeline.
    ///
    /// # Arguments
    /// * `raw` - Request body as received
    /// * `received_at` - Reception time, used for the assertion validity check
    ///
    /// # Returns
    /// - `Ok(Reply::Success)` with the encoded attribute response
    /// - `Ok(Reply::Rejected)` with an encoded status response
    /// - `Err(ServiceError)` if the directory failed or no signed response
    ///   could be built
    pub async fn handle(
        &self,
        raw: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<Reply, ServiceError> {
        info!("Received attribute query ({} bytes)", raw.len());
        let mut correlation = Correlation::default();

        match self.process(raw, received_at, &mut correlation).await {
            Ok(response) => {
                let payload = encode_response(&response, self.binding)
                    .map_err(|e| construction_failed(e.to_string()))?;
                info!(
                    "Answered query {} with {} attribute(s)",
                    correlation.query_id.as_deref().unwrap_or("?"),
                    match response.response() {
                        Response::Attributes(attributes) => attributes.attributes.len(),
                        Response::Status(_) => 0,
                    }
                );
                Ok(Reply::Success(payload))
            }
            Err(Failure::Rejected(rejection)) => self.reject(&correlation, rejection),
            Err(Failure::Unavailable(e)) => {
                error!(
                    "Query {} not answered: {}",
                    correlation.query_id.as_deref().unwrap_or("?"),
                    e
                );
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        raw: &[u8],
        received_at: DateTime<Utc>,
        correlation: &mut Correlation,
    ) -> Result<SignedResponse, Failure> {
        let inbound = decode_query(raw, self.binding).map_err(Rejection::Decode)?;
        correlation.issuer = inbound.issuer.clone();
        correlation.query_id = inbound.id.clone();

        let query = inbound
            .into_query()
            .map_err(|e| Rejection::Structure(e.to_string()))?;
        debug!(
            "Query {} from {} about '{}' for {} attribute(s)",
            query.id,
            query.issuer,
            query.subject_id,
            query.attributes.len()
        );

        if self.verification.query_signature {
            if !self.verifier.verify(query.signature.as_ref(), &query.issuer) {
                return Err(Rejection::Signature(query.issuer.clone()).into());
            }
            debug!("Query signature verified");
        } else {
            debug!("Query signature verification disabled");
        }

        if !self.eligibility.is_eligible(&query.subject_id) {
            return Err(Rejection::EligibilityDenied(query.subject_id.clone()).into());
        }
        debug!("Subject '{}' is eligible", query.subject_id);

        if self.verification.authn_statement {
            self.check_assertion(&query, received_at)?;
            debug!("Embedded authentication assertion accepted");
        } else {
            debug!("Embedded assertion validation disabled");
        }

        let attributes = self.resolve(&query).await?;

        self.responses
            .attributes(&query, attributes, Utc::now())
            .map_err(|e| Failure::Unavailable(construction_failed(e.to_string())))
    }

    fn check_assertion(&self, query: &Query, received_at: DateTime<Utc>) -> Result<(), Rejection> {
        let assertion = query
            .embedded_assertion
            .as_ref()
            .map_err(|defect| Rejection::AuthnAssertion(defect.to_string()))?;

        if assertion.subject_id != query.subject_id {
            return Err(Rejection::AuthnAssertion(format!(
                "assertion subject '{}' does not match query subject '{}'",
                assertion.subject_id, query.subject_id
            )));
        }

        if self.verification.authn_signature
            && !self.verifier.verify(assertion.signature.as_ref(), &assertion.issuer)
        {
            return Err(Rejection::AuthnAssertion(format!(
                "signature does not verify against credential '{}'",
                assertion.issuer
            )));
        }

        if self.verification.authn_timespan && !assertion.is_valid_at(received_at) {
            return Err(Rejection::AuthnAssertion(format!(
                "received at {} outside validity [{}, {})",
                received_at, assertion.not_before, assertion.not_on_or_after
            )));
        }
        Ok(())
    }

    /// Resolves attribute values, keeping the order of the query.
    async fn resolve(&self, query: &Query) -> Result<Vec<Attribute>, Failure> {
        if query.attributes.is_empty() {
            return Err(Rejection::Structure("query requests no attributes".to_string()).into());
        }

        let names: Vec<String> = query.attributes.iter().map(|spec| spec.name.clone()).collect();
        let backend_names = self.mapper.map(&names);

        let values = self
            .directory
            .fetch_attributes(&query.subject_id, &backend_names)
            .await
            .map_err(|e| match e {
                DirectoryError::SubjectNotFound(subject) => {
                    Failure::Rejected(Rejection::SubjectNotFound(subject))
                }
                DirectoryError::Backend(reason) => {
                    Failure::Unavailable(ServiceError::BackendUnavailable(reason))
                }
            })?;

        let attributes: Vec<Attribute> = query
            .attributes
            .iter()
            .zip(&backend_names)
            .map(|(spec, backend_name)| spec.clone().resolve(values.get(backend_name).cloned()))
            .collect();
        for attribute in &attributes {
            debug!("Resolved {}", attribute);
        }
        Ok(attributes)
    }

    fn reject(&self, correlation: &Correlation, rejection: Rejection) -> Result<Reply, ServiceError> {
        error!(
            "Rejecting query {}: {}",
            correlation.query_id.as_deref().unwrap_or("?"),
            rejection
        );

        let response = self
            .responses
            .status(
                correlation.issuer.as_deref(),
                correlation.query_id.as_deref(),
                &rejection.status_codes(),
                Utc::now(),
            )
            .map_err(|e| construction_failed(e.to_string()))?;
        let payload = encode_response(&response, Binding::Soap)
            .map_err(|e| construction_failed(e.to_string()))?;
        Ok(Reply::Rejected(payload))
    }
}

fn construction_failed(reason: String) -> ServiceError {
    error!("Cannot construct response: {}", reason);
    ServiceError::ResponseConstruction(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerificationSettings;
    use crate::models::attribute::AttributeSpec;
    use crate::models::response::StatusCode;
    use crate::saml::codec::{decode_response, encode_query, ParsedResponse};
    use crate::saml::xml::{to_document, Element, NS_PROTOCOL};
    use crate::test_support::{Backend, Fixture};
    use chrono::Duration;

    fn status_of(reply: &Reply) -> Vec<StatusCode> {
        parse_reply(reply).response.status_codes().to_vec()
    }

    fn parse_reply(reply: &Reply) -> ParsedResponse {
        decode_response(reply.payload().body.as_bytes(), Binding::Soap).unwrap()
    }

    fn requester_denied() -> Vec<StatusCode> {
        vec![StatusCode::Requester, StatusCode::RequestDenied]
    }

    #[tokio::test]
    async fn test_scenario_a_success() {
        let fixture = Fixture::new(Backend::values(&[("email", "j@example.org")]), true);
        let now = Utc::now();
        let raw = fixture.query("johndoe", &["email"], true, now);

        let reply = fixture.service().handle(raw.as_bytes(), now).await.unwrap();
        assert!(matches!(reply, Reply::Success(_)));

        let parsed = parse_reply(&reply);
        match &parsed.response {
            Response::Attributes(response) => {
                assert_eq!(response.outcome.status_codes, vec![StatusCode::Success]);
                assert_eq!(response.subject_id, "johndoe");
                assert_eq!(response.audience, "https://sp.example.org");
                assert_eq!(response.attributes.len(), 1);
                assert_eq!(response.attributes[0].name(), "email");
                assert_eq!(response.attributes[0].value.as_deref(), Some("j@example.org"));
            }
            other => panic!("expected attributes, got {:?}", other),
        }
        assert!(fixture.aa_verifier().verify(parsed.signature.as_ref(), "stiam-aa"));
        assert!(fixture.aa_verifier().verify(parsed.assertion_signature.as_ref(), "stiam-aa"));
        assert_eq!(fixture.directory.calls(), 1);
    }

    #[tokio::test]
    async fn test_scenario_b_ineligible_subject() {
        let fixture = Fixture::new(Backend::values(&[("email", "j@example.org")]), false);
        let now = Utc::now();
        let raw = fixture.query("johndoe", &["email"], true, now);

        let reply = fixture.service().handle(raw.as_bytes(), now).await.unwrap();
        assert!(matches!(reply, Reply::Rejected(_)));
        let parsed = parse_reply(&reply);
        assert!(matches!(parsed.response, Response::Status(_)));
        assert_eq!(
            parsed.response.status_codes(),
            &[StatusCode::Responder, StatusCode::UnknownPrincipal]
        );
        assert!(parsed.response.outcome().in_response_to.is_some());
        assert_eq!(fixture.eligibility.calls(), 1);
        assert_eq!(fixture.directory.calls(), 0);
    }

    #[tokio::test]
    async fn test_scenario_c_invalid_assertion_signature() {
        let fixture = Fixture::new(Backend::values(&[("email", "j@example.org")]), true);
        let now = Utc::now();

        // assertion signed by a key the authority does not trust for this issuer
        let rogue = Fixture::new(Backend::values(&[]), true);
        let assertion = rogue.sp_builder().assertion("johndoe", now).unwrap();
        let query = fixture
            .sp_builder()
            .query("johndoe", &[AttributeSpec::new("email")], Some(assertion), now)
            .unwrap();
        let raw = encode_query(&query, Binding::Soap).unwrap().body;

        let reply = fixture.service().handle(raw.as_bytes(), now).await.unwrap();
        assert_eq!(
            status_of(&reply),
            vec![StatusCode::Requester, StatusCode::NoAuthnContext]
        );
        assert_eq!(fixture.directory.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_fields_never_reach_collaborators() {
        let fixture = Fixture::new(Backend::values(&[("email", "j@example.org")]), true);
        let now = Utc::now();

        for field in ["ID", "Issuer", "Subject"] {
            let mut query = fixture
                .sp_builder()
                .build("johndoe", &[AttributeSpec::new("email")], true, now)
                .unwrap();
            if field == "ID" {
                query.attributes.retain(|(k, _)| k != "ID");
            } else {
                query.children.retain(|c| c.name != field);
            }
            let raw = encode_query(&query, Binding::Soap).unwrap().body;

            let reply = fixture.service().handle(raw.as_bytes(), now).await.unwrap();
            assert_eq!(status_of(&reply), requester_denied(), "missing {}", field);
        }
        assert_eq!(fixture.eligibility.calls(), 0);
        assert_eq!(fixture.directory.calls(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_payload() {
        let fixture = Fixture::new(Backend::values(&[]), true);
        let reply = fixture
            .service()
            .handle(b"<not-an-envelope/>", Utc::now())
            .await
            .unwrap();
        let parsed = parse_reply(&reply);
        assert_eq!(parsed.response.status_codes(), requester_denied().as_slice());
        assert!(parsed.response.outcome().in_response_to.is_none());
        assert!(fixture.aa_verifier().verify(parsed.signature.as_ref(), "stiam-aa"));
    }

    #[tokio::test]
    async fn test_zero_attributes_never_reach_directory() {
        let fixture = Fixture::new(Backend::values(&[("email", "j@example.org")]), true);
        let now = Utc::now();
        let raw = fixture.query("johndoe", &[], true, now);

        let reply = fixture.service().handle(raw.as_bytes(), now).await.unwrap();
        assert_eq!(status_of(&reply), requester_denied());
        assert_eq!(fixture.directory.calls(), 0);
    }

    #[tokio::test]
    async fn test_query_signature_gate() {
        let fixture = Fixture::new(Backend::values(&[("email", "j@example.org")]), true);
        let now = Utc::now();
        let raw = fixture
            .query("johndoe", &["email"], true, now)
            .replace("johndoe", "janedoe");

        let reply = fixture.service().handle(raw.as_bytes(), now).await.unwrap();
        assert_eq!(status_of(&reply), requester_denied());
        assert_eq!(fixture.eligibility.calls(), 0);

        // the same tampered query passes once the gate is switched off,
        // and then fails on the (equally tampered) assertion signature
        let lenient = fixture.service_with(VerificationSettings {
            query_signature: false,
            ..VerificationSettings::default()
        });
        let reply = lenient.handle(raw.as_bytes(), now).await.unwrap();
        assert_eq!(
            status_of(&reply),
            vec![StatusCode::Requester, StatusCode::NoAuthnContext]
        );
    }

    #[tokio::test]
    async fn test_attribute_name_moved_into_a_namespace_is_rejected() {
        let fixture = Fixture::new(
            Backend::values(&[("email", "j@example.org"), ("phone", "555")]),
            true,
        );
        let now = Utc::now();
        let raw = fixture.query("johndoe", &["email", "phone"], true, now);
        assert!(raw.contains(r#"Name="phone""#));

        // undeclared prefix: the document no longer parses
        let unbound = raw.replace(r#"Name="phone""#, r#"xx:Name="phone""#);
        let reply = fixture.service().handle(unbound.as_bytes(), now).await.unwrap();
        assert_eq!(status_of(&reply), requester_denied());

        // declared prefix: parses, but the signed content changed
        let declared = raw.replace(
            r#"Name="phone""#,
            r#"xmlns:xx="urn:example:other" xx:Name="phone""#,
        );
        let reply = fixture.service().handle(declared.as_bytes(), now).await.unwrap();
        assert_eq!(status_of(&reply), requester_denied());

        assert_eq!(fixture.eligibility.calls(), 0);
        assert_eq!(fixture.directory.calls(), 0);
    }

    #[tokio::test]
    async fn test_unsigned_query_is_rejected() {
        let fixture = Fixture::new(Backend::values(&[("email", "j@example.org")]), true);
        let now = Utc::now();
        let mut query = fixture
            .sp_builder()
            .build("johndoe", &[AttributeSpec::new("email")], true, now)
            .unwrap();
        query.children.retain(|c| c.name != "Signature");
        let raw = encode_query(&query, Binding::Soap).unwrap().body;

        let reply = fixture.service().handle(raw.as_bytes(), now).await.unwrap();
        assert_eq!(status_of(&reply), requester_denied());
    }

    #[tokio::test]
    async fn test_missing_assertion() {
        let fixture = Fixture::new(Backend::values(&[("email", "j@example.org")]), true);
        let now = Utc::now();
        let raw = fixture.query("johndoe", &["email"], false, now);

        let reply = fixture.service().handle(raw.as_bytes(), now).await.unwrap();
        assert_eq!(
            status_of(&reply),
            vec![StatusCode::Requester, StatusCode::NoAuthnContext]
        );

        // not required when the gate is off
        let lenient = fixture.service_with(VerificationSettings {
            authn_statement: false,
            ..VerificationSettings::default()
        });
        let reply = lenient.handle(raw.as_bytes(), now).await.unwrap();
        assert!(matches!(reply, Reply::Success(_)));
    }

    #[tokio::test]
    async fn test_assertion_subject_mismatch() {
        let fixture = Fixture::new(Backend::values(&[("email", "j@example.org")]), true);
        let now = Utc::now();
        let builder = fixture.sp_builder();
        let assertion = builder.assertion("janedoe", now).unwrap();
        let query = builder
            .query("johndoe", &[AttributeSpec::new("email")], Some(assertion), now)
            .unwrap();
        let raw = encode_query(&query, Binding::Soap).unwrap().body;

        let reply = fixture.service().handle(raw.as_bytes(), now).await.unwrap();
        assert_eq!(
            status_of(&reply),
            vec![StatusCode::Requester, StatusCode::NoAuthnContext]
        );
        assert_eq!(fixture.directory.calls(), 0);
    }

    #[tokio::test]
    async fn test_assertion_timespan_boundaries() {
        let fixture = Fixture::new(Backend::values(&[("email", "j@example.org")]), true);
        let issued = crate::saml::truncate_to_millis(Utc::now());
        let raw = fixture.query("johndoe", &["email"], true, issued);
        // the builder's assertion is valid for [issued - 5m, issued + 5m)
        let not_before = issued - Duration::minutes(5);
        let not_on_or_after = issued + Duration::minutes(5);
        let service = fixture.service();

        let at_start = service.handle(raw.as_bytes(), not_before).await.unwrap();
        assert!(matches!(at_start, Reply::Success(_)));
        let last_moment = service
            .handle(raw.as_bytes(), not_on_or_after - Duration::milliseconds(1))
            .await
            .unwrap();
        assert!(matches!(last_moment, Reply::Success(_)));
        let expired = service.handle(raw.as_bytes(), not_on_or_after).await.unwrap();
        assert_eq!(
            status_of(&expired),
            vec![StatusCode::Requester, StatusCode::NoAuthnContext]
        );
        let early = service
            .handle(raw.as_bytes(), not_before - Duration::milliseconds(1))
            .await
            .unwrap();
        assert!(matches!(early, Reply::Rejected(_)));

        // expired evidence is accepted with the timespan check off
        let lenient = fixture.service_with(VerificationSettings {
            authn_timespan: false,
            ..VerificationSettings::default()
        });
        let reply = lenient.handle(raw.as_bytes(), not_on_or_after).await.unwrap();
        assert!(matches!(reply, Reply::Success(_)));
    }

    #[tokio::test]
    async fn test_subject_not_found() {
        let fixture = Fixture::new(Backend::NotFound, true);
        let now = Utc::now();
        let raw = fixture.query("johndoe", &["email"], true, now);

        let reply = fixture.service().handle(raw.as_bytes(), now).await.unwrap();
        assert_eq!(
            status_of(&reply),
            vec![StatusCode::Responder, StatusCode::UnknownPrincipal]
        );
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_a_saml_response() {
        let fixture = Fixture::new(Backend::Down, true);
        let now = Utc::now();
        let raw = fixture.query("johndoe", &["email"], true, now);

        let result = fixture.service().handle(raw.as_bytes(), now).await;
        assert!(matches!(result, Err(ServiceError::BackendUnavailable(_))));
    }

    #[tokio::test]
    async fn test_attributes_keep_query_order_through_mapping() {
        let fixture = Fixture::new(
            Backend::values(&[("mail", "j@example.org"), ("sn", "Doe")]),
            true,
        )
        .with_mapping(&[("urn:oid:0.9.2342.19200300.100.1.3", "mail"), ("surname", "sn")]);
        let now = Utc::now();
        let raw = fixture.query(
            "johndoe",
            &["surname", "urn:oid:0.9.2342.19200300.100.1.3", "surname", "title"],
            true,
            now,
        );

        let reply = fixture.service().handle(raw.as_bytes(), now).await.unwrap();
        let parsed = parse_reply(&reply);
        let attributes = match parsed.response {
            Response::Attributes(response) => response.attributes,
            other => panic!("expected attributes, got {:?}", other),
        };
        let pairs: Vec<(&str, Option<&str>)> = attributes
            .iter()
            .map(|a| (a.name(), a.value.as_deref()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("surname", Some("Doe")),
                ("urn:oid:0.9.2342.19200300.100.1.3", Some("j@example.org")),
                ("title", Some("")),
            ]
        );
        assert_eq!(
            fixture.directory.last_names(),
            vec!["sn".to_string(), "mail".to_string(), "title".to_string()]
        );
    }

    #[tokio::test]
    async fn test_post_binding_success() {
        let mut fixture = Fixture::new(Backend::values(&[("email", "j@example.org")]), true);
        fixture.settings.saml.binding = Binding::Post;
        let now = Utc::now();
        let query = fixture
            .sp_builder()
            .build("johndoe", &[AttributeSpec::new("email")], true, now)
            .unwrap();
        let raw = encode_query(&query, Binding::Post).unwrap().body;

        let reply = fixture.service().handle(raw.as_bytes(), now).await.unwrap();
        let payload = match reply {
            Reply::Success(payload) => payload,
            other => panic!("expected success, got {:?}", other),
        };
        let parsed = decode_response(payload.body.as_bytes(), Binding::Post).unwrap();
        assert!(parsed.response.is_success());

        // rejections still travel as SOAP
        let reply = fixture
            .service()
            .handle(b"SAMLRequest=", now)
            .await
            .unwrap();
        assert_eq!(status_of(&reply), requester_denied());
    }

    #[tokio::test]
    async fn test_unknown_first_extension_is_ignored() {
        let fixture = Fixture::new(Backend::values(&[("email", "j@example.org")]), true);
        let now = Utc::now();
        let builder = fixture.sp_builder();
        let assertion = builder.assertion("johndoe", now).unwrap();
        let mut query = builder
            .query("johndoe", &[AttributeSpec::new("email")], Some(assertion), now)
            .unwrap();
        // an unrelated extension ahead of the assertion, then re-sign
        if let Some(extensions) = query
            .children
            .iter_mut()
            .find(|c| c.is(NS_PROTOCOL, "Extensions"))
        {
            let hint = Element::new("urn:example:ext", "ext", "Hint").text("x");
            extensions.children.insert(0, hint);
        }
        crate::saml::signature::sign_element(&mut query, &fixture.sp_credential()).unwrap();
        let raw = encode_query(&query, Binding::Soap).unwrap().body;
        assert!(to_document(&query).unwrap().contains("Hint"));

        let reply = fixture.service().handle(raw.as_bytes(), now).await.unwrap();
        assert!(matches!(reply, Reply::Success(_)));
    }
}
