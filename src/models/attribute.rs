// src/models/attribute.rs
//! Attribute data model.
//!
//! An [`AttributeSpec`] is what a requester asks for; an [`Attribute`] is the
//! same spec after resolution against the directory.

use std::fmt;

/// Name format for attribute names given as URIs.
pub const NAME_FORMAT_URI: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:uri";

/// A requested attribute: name plus optional descriptive metadata.
///
/// Two specs are the same attribute when their names match; format and
/// friendly name are carried along but play no part in identity.
#[derive(Debug, Clone, Eq)]
pub struct AttributeSpec {
    /// Attribute name as it appears on the wire
    pub name: String,

    /// Optional `NameFormat` URI
    pub name_format: Option<String>,

    /// Optional human-readable name
    pub friendly_name: Option<String>,
}

impl AttributeSpec {
    /// Creates a spec with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            name_format: None,
            friendly_name: None,
        }
    }

    pub fn with_name_format(mut self, format: impl Into<String>) -> Self {
        self.name_format = Some(format.into());
        self
    }

    pub fn with_friendly_name(mut self, friendly_name: impl Into<String>) -> Self {
        self.friendly_name = Some(friendly_name.into());
        self
    }

    /// Binds a resolved value to this spec.
    pub fn resolve(self, value: Option<String>) -> Attribute {
        Attribute { spec: self, value }
    }
}

impl PartialEq for AttributeSpec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl std::hash::Hash for AttributeSpec {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A resolved attribute.
///
/// `value` is `None` when nothing was resolved, which is serialized as an
/// `Attribute` element without any `AttributeValue` child. An empty string is
/// a resolved (empty) value and is serialized as an empty `AttributeValue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub spec: AttributeSpec,
    pub value: Option<String>,
}

impl Attribute {
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spec.name)?;
        if let Some(friendly) = &self.spec.friendly_name {
            write!(f, " ({})", friendly)?;
        }
        match &self.value {
            Some(value) => write!(f, " = '{}'", value),
            None => write!(f, " = <unresolved>"),
        }
    }
}
