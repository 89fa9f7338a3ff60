// src/models/query.rs
//! Attribute query and the authentication assertion it may carry.

use crate::models::attribute::AttributeSpec;
use crate::saml::signature::XmlSignature;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

/// A query as it came off the wire, before structural validation.
///
/// Every field the sender is expected to supply is optional here; the
/// pipeline decides what a missing value means.
#[derive(Debug, Clone)]
pub struct InboundQuery {
    pub id: Option<String>,
    pub issuer: Option<String>,
    pub subject_id: Option<String>,
    pub signature: Option<XmlSignature>,
    pub attributes: Vec<AttributeSpec>,
    pub embedded_assertion: Result<Assertion, AssertionDefect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("query is missing required field '{0}'")]
pub struct MissingField(pub &'static str);

/// A structurally valid attribute query.
#[derive(Debug, Clone)]
pub struct Query {
    pub id: String,
    pub issuer: String,
    pub subject_id: String,
    pub signature: Option<XmlSignature>,
    /// Requested attributes, unique by name, in order of first occurrence
    pub attributes: Vec<AttributeSpec>,
    pub embedded_assertion: Result<Assertion, AssertionDefect>,
}

impl InboundQuery {
    /// Checks that id, issuer and subject are present and non-empty.
    ///
    /// # Returns
    /// - `Ok(Query)` with duplicate attribute names collapsed (first wins)
    /// - `Err(MissingField)` naming the first absent field
    pub fn into_query(self) -> Result<Query, MissingField> {
        let id = required(self.id, "ID")?;
        let issuer = required(self.issuer, "Issuer")?;
        let subject_id = required(self.subject_id, "Subject/NameID")?;

        let mut seen = HashSet::new();
        let attributes = self
            .attributes
            .into_iter()
            .filter(|spec| seen.insert(spec.name.clone()))
            .collect();

        Ok(Query {
            id,
            issuer,
            subject_id,
            signature: self.signature,
            attributes,
            embedded_assertion: self.embedded_assertion,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, MissingField> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(MissingField(field))
}

/// Why no usable authentication assertion could be taken from a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssertionDefect {
    #[error("query carries no embedded assertion")]
    Absent,

    #[error("embedded assertion has no AuthnStatement")]
    NoAuthnStatement,

    #[error("embedded assertion is missing {0}")]
    MissingField(&'static str),

    #[error("embedded assertion has an invalid {field}: {value}")]
    InvalidTimestamp { field: &'static str, value: String },
}

/// Authentication evidence embedded in a query's extensions.
#[derive(Debug, Clone)]
pub struct Assertion {
    pub id: String,
    pub issuer: String,
    pub subject_id: String,
    pub signature: Option<XmlSignature>,
    pub not_before: DateTime<Utc>,
    pub not_on_or_after: DateTime<Utc>,
}

impl Assertion {
    /// Whether `t` falls inside `[not_before, not_on_or_after)`.
    pub fn is_valid_at(&self, t: DateTime<Utc>) -> bool {
        t >= self.not_before && t < self.not_on_or_after
    }
}
