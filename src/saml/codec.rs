// src/saml/codec.rs
//! Wire bindings.
//!
//! Two bindings are supported:
//! - SOAP: a SOAP 1.1 envelope whose body holds the SAML element. For
//!   queries, the first `AttributeQuery` in the body is used and any other
//!   body children are ignored.
//! - POST: the base64-encoded SAML document in a form field. Queries arrive
//!   as `application/x-www-form-urlencoded` with a `SAMLRequest` field;
//!   responses leave as a self-submitting XHTML form with a hidden
//!   `SAMLResponse` field posting back to the query issuer.
//!
//! The codec only checks transport syntax. Nothing in here makes a trust
//! decision.

use crate::config::Binding;
use crate::models::attribute::{Attribute, AttributeSpec};
use crate::models::query::{Assertion, AssertionDefect, InboundQuery};
use crate::models::response::{AttributeResponse, Response, SignedResponse, StatusCode, StatusOutcome};
use crate::saml::parse_instant;
use crate::saml::signature::XmlSignature;
use crate::saml::xml::{
    parse, to_document, Element, XmlError, NS_ASSERTION, NS_PROTOCOL, NS_SOAP11,
};
use crate::utils::serialization::{decode_base64, encode_base64};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SAML_REQUEST_FIELD: &str = "SAMLRequest";
pub const SAML_RESPONSE_FIELD: &str = "SAMLResponse";

pub const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

const NS_XHTML: &str = "http://www.w3.org/1999/xhtml";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("invalid form body: {0}")]
    Form(#[from] serde_urlencoded::de::Error),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("missing element {0}")]
    MissingElement(&'static str),

    #[error("expected {expected} element, found {found}")]
    UnexpectedElement { expected: &'static str, found: String },
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("cannot encode form body: {0}")]
    Form(#[from] serde_urlencoded::ser::Error),
}

/// Form body of a query sent with the POST binding.
#[derive(Debug, Serialize, Deserialize)]
struct SamlRequestForm {
    #[serde(rename = "SAMLRequest")]
    saml_request: Option<String>,
}

/// An encoded message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub content_type: &'static str,
    pub body: String,
}

/// A response read back from the wire, with the signatures it carried.
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub issuer: Option<String>,
    pub response: Response,
    pub signature: Option<XmlSignature>,
    pub assertion_signature: Option<XmlSignature>,
}

/// Decodes an inbound attribute query.
///
/// # Arguments
/// * `raw` - Request body as received
/// * `binding` - Binding the authority is configured for
///
/// # Returns
/// The query fields as found, or a `DecodeError` when the payload is not a
/// readable `AttributeQuery` in the given binding
pub fn decode_query(raw: &[u8], binding: Binding) -> Result<InboundQuery, DecodeError> {
    let element = match binding {
        Binding::Soap => first_body_element(raw, NS_PROTOCOL, "AttributeQuery")?,
        Binding::Post => {
            let form: SamlRequestForm = serde_urlencoded::from_bytes(raw)?;
            let encoded = form
                .saml_request
                .ok_or(DecodeError::MissingElement(SAML_REQUEST_FIELD))?;
            expect_root(parse_base64_document(&encoded)?, NS_PROTOCOL, "AttributeQuery")?
        }
    };
    Ok(query_from_element(&element))
}

/// Encodes a signed response for the transport.
pub fn encode_response(
    response: &SignedResponse,
    binding: Binding,
) -> Result<EncodedPayload, XmlError> {
    match binding {
        Binding::Soap => soap_payload(response.element()),
        Binding::Post => {
            let destination = response
                .response()
                .outcome()
                .destination
                .clone()
                .unwrap_or_default();
            let document = to_document(response.element())?;
            Ok(EncodedPayload {
                content_type: HTML_CONTENT_TYPE,
                body: to_document(&post_form(&destination, &encode_base64(document.as_bytes())))?,
            })
        }
    }
}

/// Encodes a signed query the way a client sends it.
pub fn encode_query(query: &Element, binding: Binding) -> Result<EncodedPayload, EncodeError> {
    match binding {
        Binding::Soap => Ok(soap_payload(query)?),
        Binding::Post => {
            let form = SamlRequestForm {
                saml_request: Some(encode_base64(to_document(query)?.as_bytes())),
            };
            Ok(EncodedPayload {
                content_type: FORM_CONTENT_TYPE,
                body: serde_urlencoded::to_string(&form)?,
            })
        }
    }
}

/// Decodes a response as produced by [`encode_response`].
pub fn decode_response(raw: &[u8], binding: Binding) -> Result<ParsedResponse, DecodeError> {
    let element = match binding {
        Binding::Soap => first_body_element(raw, NS_PROTOCOL, "Response")?,
        Binding::Post => {
            let page = parse(&String::from_utf8(raw.to_vec())?)?;
            let encoded = find_input_value(&page, SAML_RESPONSE_FIELD)
                .ok_or(DecodeError::MissingElement(SAML_RESPONSE_FIELD))?;
            expect_root(parse_base64_document(encoded)?, NS_PROTOCOL, "Response")?
        }
    };
    response_from_element(&element)
}

fn soap_payload(element: &Element) -> Result<EncodedPayload, XmlError> {
    let envelope = Element::soap("Envelope").child(Element::soap("Body").child(element.clone()));
    Ok(EncodedPayload {
        content_type: SOAP_CONTENT_TYPE,
        body: to_document(&envelope)?,
    })
}

fn html(name: &str) -> Element {
    Element::new(NS_XHTML, "", name)
}

fn post_form(destination: &str, encoded_response: &str) -> Element {
    html("html")
        .child(html("head").child(html("title").text("SAML response")))
        .child(
            html("body")
                .attr("onload", "document.forms[0].submit()")
                .child(html("noscript").child(
                    html("p").text("Your browser does not run scripts. Press Continue to proceed."),
                ))
                .child(
                    html("form")
                        .attr("action", destination)
                        .attr("method", "post")
                        .child(
                            html("div")
                                .child(
                                    html("input")
                                        .attr("type", "hidden")
                                        .attr("name", SAML_RESPONSE_FIELD)
                                        .attr("value", encoded_response),
                                )
                                .child(
                                    html("input")
                                        .attr("type", "submit")
                                        .attr("value", "Continue"),
                                ),
                        ),
                ),
        )
}

fn first_body_element(
    raw: &[u8],
    namespace: &str,
    expected: &'static str,
) -> Result<Element, DecodeError> {
    let envelope = parse(&String::from_utf8(raw.to_vec())?)?;
    if !envelope.is(NS_SOAP11, "Envelope") {
        return Err(DecodeError::UnexpectedElement {
            expected: "Envelope",
            found: envelope.qualified_name(),
        });
    }
    let body = envelope
        .find_child(NS_SOAP11, "Body")
        .ok_or(DecodeError::MissingElement("Body"))?;
    body.find_child(namespace, expected)
        .cloned()
        .ok_or(DecodeError::MissingElement(expected))
}

fn parse_base64_document(encoded: &str) -> Result<Element, DecodeError> {
    let document = String::from_utf8(decode_base64(encoded)?)?;
    Ok(parse(&document)?)
}

fn expect_root(
    element: Element,
    namespace: &str,
    expected: &'static str,
) -> Result<Element, DecodeError> {
    if element.is(namespace, expected) {
        Ok(element)
    } else {
        Err(DecodeError::UnexpectedElement {
            expected,
            found: element.qualified_name(),
        })
    }
}

fn find_input_value<'a>(element: &'a Element, field: &str) -> Option<&'a str> {
    if element.is(NS_XHTML, "input") && element.attribute("name") == Some(field) {
        return element.attribute("value");
    }
    element
        .children
        .iter()
        .find_map(|child| find_input_value(child, field))
}

fn query_from_element(query: &Element) -> InboundQuery {
    let signature = XmlSignature::extract(query).unwrap_or_else(|e| {
        warn!("Ignoring unreadable query signature: {}", e);
        None
    });

    let attributes = query
        .find_children(NS_ASSERTION, "Attribute")
        .filter_map(|attribute| {
            let spec = attribute_spec(attribute);
            if spec.is_none() {
                warn!("Ignoring requested attribute without a Name");
            }
            spec
        })
        .collect();

    InboundQuery {
        id: query.attribute("ID").map(str::to_string),
        issuer: child_text(query, &["Issuer"]),
        subject_id: child_text(query, &["Subject", "NameID"]),
        signature,
        attributes,
        embedded_assertion: embedded_assertion(query),
    }
}

/// Extracts the authentication assertion from a query's extensions.
///
/// Only the first `Assertion` under `Extensions` is considered, and it must
/// carry an `AuthnStatement`. Further extensions are ignored.
fn embedded_assertion(query: &Element) -> Result<Assertion, AssertionDefect> {
    let assertion = query
        .find_child(NS_PROTOCOL, "Extensions")
        .and_then(|extensions| extensions.find_child(NS_ASSERTION, "Assertion"))
        .ok_or(AssertionDefect::Absent)?;

    if assertion.find_child(NS_ASSERTION, "AuthnStatement").is_none() {
        return Err(AssertionDefect::NoAuthnStatement);
    }

    let conditions = assertion
        .find_child(NS_ASSERTION, "Conditions")
        .ok_or(AssertionDefect::MissingField("Conditions"))?;
    let signature = XmlSignature::extract(assertion).unwrap_or_else(|e| {
        warn!("Ignoring unreadable assertion signature: {}", e);
        None
    });

    Ok(Assertion {
        id: assertion.attribute("ID").unwrap_or_default().to_string(),
        issuer: child_text(assertion, &["Issuer"]).ok_or(AssertionDefect::MissingField("Issuer"))?,
        subject_id: child_text(assertion, &["Subject", "NameID"])
            .ok_or(AssertionDefect::MissingField("Subject/NameID"))?,
        signature,
        not_before: instant_attribute(conditions, "NotBefore")?,
        not_on_or_after: instant_attribute(conditions, "NotOnOrAfter")?,
    })
}

fn instant_attribute(
    element: &Element,
    field: &'static str,
) -> Result<chrono::DateTime<chrono::Utc>, AssertionDefect> {
    let value = element
        .attribute(field)
        .ok_or(AssertionDefect::MissingField(field))?;
    parse_instant(value).ok_or_else(|| AssertionDefect::InvalidTimestamp {
        field,
        value: value.to_string(),
    })
}

fn response_from_element(element: &Element) -> Result<ParsedResponse, DecodeError> {
    let outcome = StatusOutcome {
        destination: element.attribute("Destination").map(str::to_string),
        in_response_to: element.attribute("InResponseTo").map(str::to_string),
        status_codes: status_codes(element)?,
    };
    let signature = XmlSignature::extract(element).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let issuer = child_text(element, &["Issuer"]);

    let assertion = match element.find_child(NS_ASSERTION, "Assertion") {
        Some(assertion) => assertion,
        None => {
            return Ok(ParsedResponse {
                issuer,
                response: Response::Status(outcome),
                signature,
                assertion_signature: None,
            })
        }
    };

    let conditions = assertion
        .find_child(NS_ASSERTION, "Conditions")
        .ok_or(DecodeError::MissingElement("Conditions"))?;
    let instant = |field: &'static str| {
        conditions
            .attribute(field)
            .and_then(parse_instant)
            .ok_or(DecodeError::MissingElement(field))
    };

    let attributes = assertion
        .find_child(NS_ASSERTION, "AttributeStatement")
        .map(|statement| {
            statement
                .find_children(NS_ASSERTION, "Attribute")
                .filter_map(|attribute| {
                    let value = attribute
                        .find_child(NS_ASSERTION, "AttributeValue")
                        .map(|v| v.text.clone().unwrap_or_default());
                    attribute_spec(attribute).map(|spec| spec.resolve(value))
                })
                .collect::<Vec<Attribute>>()
        })
        .unwrap_or_default();

    Ok(ParsedResponse {
        issuer,
        response: Response::Attributes(AttributeResponse {
            outcome,
            subject_id: child_text(assertion, &["Subject", "NameID"])
                .ok_or(DecodeError::MissingElement("Subject/NameID"))?,
            attributes,
            audience: child_text(conditions, &["AudienceRestriction", "Audience"])
                .ok_or(DecodeError::MissingElement("Audience"))?,
            not_before: instant("NotBefore")?,
            not_on_or_after: instant("NotOnOrAfter")?,
        }),
        signature,
        assertion_signature: XmlSignature::extract(assertion)
            .map_err(|e| DecodeError::Malformed(e.to_string()))?,
    })
}

fn status_codes(response: &Element) -> Result<Vec<StatusCode>, DecodeError> {
    let mut codes = Vec::new();
    let mut current = response.find_path(NS_PROTOCOL, &["Status", "StatusCode"]);
    while let Some(code) = current {
        let uri = code
            .attribute("Value")
            .ok_or(DecodeError::MissingElement("StatusCode/@Value"))?;
        codes.push(
            StatusCode::from_uri(uri)
                .ok_or_else(|| DecodeError::Malformed(format!("unknown status code {}", uri)))?,
        );
        current = code.find_child(NS_PROTOCOL, "StatusCode");
    }
    if codes.is_empty() {
        return Err(DecodeError::MissingElement("Status/StatusCode"));
    }
    Ok(codes)
}

fn attribute_spec(attribute: &Element) -> Option<AttributeSpec> {
    let name = attribute.attribute("Name").filter(|n| !n.trim().is_empty())?;
    let mut spec = AttributeSpec::new(name.trim());
    if let Some(format) = attribute.attribute("NameFormat") {
        spec = spec.with_name_format(format);
    }
    if let Some(friendly_name) = attribute.attribute("FriendlyName") {
        spec = spec.with_friendly_name(friendly_name);
    }
    Some(spec)
}

/// Trimmed text at a path of assertion-namespace children.
fn child_text(element: &Element, path: &[&str]) -> Option<String> {
    element
        .find_path(NS_ASSERTION, path)
        .and_then(Element::text_value)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::xml::to_fragment;

    fn query_element() -> Element {
        Element::samlp("AttributeQuery")
            .attr("ID", "_q1")
            .attr("Version", "2.0")
            .child(Element::saml("Issuer").text("https://sp.example.org"))
            .child(Element::saml("Subject").child(Element::saml("NameID").text("johndoe")))
            .child(
                Element::saml("Attribute")
                    .attr("Name", "email")
                    .attr("FriendlyName", "mail"),
            )
    }

    #[test]
    fn test_decode_soap_query() {
        let payload = encode_query(&query_element(), Binding::Soap).unwrap();
        assert_eq!(payload.content_type, SOAP_CONTENT_TYPE);

        let query = decode_query(payload.body.as_bytes(), Binding::Soap).unwrap();
        assert_eq!(query.id.as_deref(), Some("_q1"));
        assert_eq!(query.issuer.as_deref(), Some("https://sp.example.org"));
        assert_eq!(query.subject_id.as_deref(), Some("johndoe"));
        assert_eq!(query.attributes, vec![AttributeSpec::new("email")]);
        assert_eq!(query.attributes[0].friendly_name.as_deref(), Some("mail"));
        assert!(query.signature.is_none());
        assert_eq!(query.embedded_assertion.unwrap_err(), AssertionDefect::Absent);
    }

    #[test]
    fn test_decode_soap_uses_first_query_only() {
        let second = query_element().attr("ID", "_q2");
        let envelope = Element::soap("Envelope").child(
            Element::soap("Body")
                .child(Element::new("", "", "Other"))
                .child(query_element())
                .child(second),
        );
        let raw = to_document(&envelope).unwrap();

        let query = decode_query(raw.as_bytes(), Binding::Soap).unwrap();
        assert_eq!(query.id.as_deref(), Some("_q1"));
    }

    #[test]
    fn test_decode_soap_matches_namespaces_not_prefixes() {
        let raw = format!(
            r#"<e:Envelope xmlns:e="{}"><e:Body><q:AttributeQuery xmlns:q="{}" xmlns:a="{}" ID="_q9"><a:Issuer>https://sp.example.org</a:Issuer><q:Issuer>ignored</q:Issuer></q:AttributeQuery></e:Body></e:Envelope>"#,
            NS_SOAP11, NS_PROTOCOL, NS_ASSERTION
        );
        let query = decode_query(raw.as_bytes(), Binding::Soap).unwrap();
        assert_eq!(query.id.as_deref(), Some("_q9"));
        assert_eq!(query.issuer.as_deref(), Some("https://sp.example.org"));

        // right local name, wrong namespace
        let foreign = format!(
            r#"<soap:Envelope xmlns:soap="{}"><soap:Body><AttributeQuery xmlns="urn:other"/></soap:Body></soap:Envelope>"#,
            NS_SOAP11
        );
        assert!(matches!(
            decode_query(foreign.as_bytes(), Binding::Soap),
            Err(DecodeError::MissingElement("AttributeQuery"))
        ));
    }

    #[test]
    fn test_decode_post_query() {
        let payload = encode_query(&query_element(), Binding::Post).unwrap();
        assert_eq!(payload.content_type, FORM_CONTENT_TYPE);
        assert!(payload.body.starts_with("SAMLRequest="));

        let query = decode_query(payload.body.as_bytes(), Binding::Post).unwrap();
        assert_eq!(query.id.as_deref(), Some("_q1"));
    }

    #[test]
    fn test_decode_post_accepts_plus_for_space() {
        // base64 wrapped with a line break, form-encoded by a browser
        let encoded = encode_base64(to_document(&query_element()).unwrap().as_bytes());
        let wrapped = format!("{} {}", &encoded[..20], &encoded[20..]);
        let body =
            serde_urlencoded::to_string([("RelayState", "abc"), ("SAMLRequest", wrapped.as_str())])
                .unwrap();
        assert!(body.contains('+'));

        let query = decode_query(body.as_bytes(), Binding::Post).unwrap();
        assert_eq!(query.subject_id.as_deref(), Some("johndoe"));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode_query(b"not xml at all <", Binding::Soap),
            Err(DecodeError::Xml(_))
        ));
        assert!(matches!(
            decode_query(to_fragment(&query_element()).unwrap().as_bytes(), Binding::Soap),
            Err(DecodeError::UnexpectedElement { expected: "Envelope", .. })
        ));
        assert!(matches!(
            decode_query(b"RelayState=abc", Binding::Post),
            Err(DecodeError::MissingElement(SAML_REQUEST_FIELD))
        ));
        assert!(matches!(
            decode_query(b"SAMLRequest=%%%", Binding::Post),
            Err(DecodeError::Base64(_))
        ));

        let empty_body = Element::soap("Envelope").child(Element::soap("Body"));
        assert!(matches!(
            decode_query(to_document(&empty_body).unwrap().as_bytes(), Binding::Soap),
            Err(DecodeError::MissingElement("AttributeQuery"))
        ));
    }

    #[test]
    fn test_missing_fields_are_left_empty() {
        let bare = Element::samlp("AttributeQuery");
        let payload = encode_query(&bare, Binding::Soap).unwrap();
        let query = decode_query(payload.body.as_bytes(), Binding::Soap).unwrap();
        assert!(query.id.is_none());
        assert!(query.issuer.is_none());
        assert!(query.subject_id.is_none());
        assert!(query.attributes.is_empty());
    }

    #[test]
    fn test_embedded_assertion_rules() {
        let assertion = Element::saml("Assertion")
            .attr("ID", "_a1")
            .child(Element::saml("Issuer").text("https://idp.example.org"))
            .child(Element::saml("Subject").child(Element::saml("NameID").text("johndoe")))
            .child(
                Element::saml("Conditions")
                    .attr("NotBefore", "2024-05-01T12:00:00.000Z")
                    .attr("NotOnOrAfter", "2024-05-01T12:10:00.000Z"),
            );

        // no AuthnStatement
        let query = query_element().child(Element::samlp("Extensions").child(assertion.clone()));
        assert_eq!(
            embedded_assertion(&query).unwrap_err(),
            AssertionDefect::NoAuthnStatement
        );

        // first assertion wins, later extensions ignored
        let complete = assertion.clone().child(Element::saml("AuthnStatement"));
        let query = query_element().child(
            Element::samlp("Extensions")
                .child(complete)
                .child(Element::saml("Assertion")),
        );
        let parsed = embedded_assertion(&query).unwrap();
        assert_eq!(parsed.subject_id, "johndoe");
        assert_eq!(parsed.issuer, "https://idp.example.org");
        assert_eq!(parsed.id, "_a1");

        // bad timestamp
        let mut broken = assertion.child(Element::saml("AuthnStatement"));
        broken.children[2].set_attribute("NotOnOrAfter", "soon");
        let query = query_element().child(Element::samlp("Extensions").child(broken));
        assert!(matches!(
            embedded_assertion(&query),
            Err(AssertionDefect::InvalidTimestamp { field: "NotOnOrAfter", .. })
        ));
    }
}
