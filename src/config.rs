// src/config.rs
//! Service configuration.
//!
//! Settings are read once at startup and never change afterwards. Sources,
//! later ones overriding earlier ones:
//! 1. Built-in defaults (see the `Default` impls below)
//! 2. The file named by `AA_CONFIG` (default `aa.toml`, optional)
//! 3. Environment variables prefixed with `AA`, `__` separating sections,
//!    e.g. `AA__SAML__BINDING=post`
//!
//! A `.env` file in the working directory is loaded first so its entries take
//! part in step 3.

use crate::models::attribute::AttributeSpec;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "AA_CONFIG";

/// Transport binding used for inbound queries and outbound responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    /// SOAP 1.1 envelope carrying the message in its body
    Soap,
    /// HTML form post carrying the base64-encoded message
    Post,
}

impl Default for Binding {
    fn default() -> Self {
        Binding::Soap
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub saml: SamlSettings,
    pub verification: VerificationSettings,
    pub credentials: CredentialSettings,
    pub directory: DirectorySettings,
    pub attribute_mapper: AttributeMapperSettings,
    pub eligibility: EligibilitySettings,
    pub query_sender: QuerySenderSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamlSettings {
    /// Entity ID this authority uses as `Issuer`
    pub issuer: String,
    pub name_id_format: String,
    /// Lifetime of issued attribute assertions
    pub assertion_validity_minutes: i64,
    pub binding: Binding,
}

impl Default for SamlSettings {
    fn default() -> Self {
        Self {
            issuer: "https://aa.example.org".to_string(),
            name_id_format: "urn:oasis:names:tc:SAML:2.0:nameid-format:unspecified".to_string(),
            assertion_validity_minutes: 10,
            binding: Binding::Soap,
        }
    }
}

/// Switches for the optional validation gates.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub query_signature: bool,
    pub authn_statement: bool,
    pub authn_signature: bool,
    pub authn_timespan: bool,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            query_signature: true,
            authn_statement: true,
            authn_signature: true,
            authn_timespan: true,
        }
    }
}

/// A trusted peer key, looked up by alias (the peer's issuer value).
#[derive(Debug, Clone, Deserialize)]
pub struct TrustedKey {
    pub alias: String,
    /// Base64 SEC1-encoded secp256k1 public key
    pub public_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    pub signing_alias: String,
    /// Base64 32-byte secp256k1 secret scalar
    pub signing_key: Option<String>,
    pub trusted: Vec<TrustedKey>,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            signing_alias: "stiam-aa".to_string(),
            signing_key: None,
            trusted: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryKind {
    Property,
    Ldap,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectorySettings {
    pub kind: DirectoryKind,
    pub property_file: PathBuf,
    pub ldap: LdapSettings,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            kind: DirectoryKind::Property,
            property_file: PathBuf::from("property-directory.json"),
            ldap: LdapSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LdapSettings {
    pub url: String,
    pub bind_dn: String,
    pub bind_password: String,
    pub base_dn: String,
    /// Search filter; `%s` is replaced by the escaped subject identifier
    pub filter: String,
    pub timeout_secs: u64,
}

impl Default for LdapSettings {
    fn default() -> Self {
        Self {
            url: "ldap://localhost:389".to_string(),
            bind_dn: "cn=manager".to_string(),
            bind_password: String::new(),
            base_dn: String::new(),
            filter: "(uid=%s)".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttributeMapperSettings {
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EligibilitySettings {
    pub file: Option<PathBuf>,
    /// `accept` or `deny`
    pub default_policy: String,
}

impl Default for EligibilitySettings {
    fn default() -> Self {
        Self {
            file: None,
            default_policy: "deny".to_string(),
        }
    }
}

/// Settings of the `query-sender` test client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuerySenderSettings {
    pub url: Option<String>,
    pub binding: Binding,
    pub subject_id: String,
    /// Requested attributes
    pub attributes: Vec<RequestedAttribute>,
    pub embed_assertion: bool,
    pub assurance_level: String,
    pub subject_confirmation_method: String,
}

impl Default for QuerySenderSettings {
    fn default() -> Self {
        Self {
            url: None,
            binding: Binding::Soap,
            subject_id: "johndoe".to_string(),
            attributes: Vec::new(),
            embed_assertion: true,
            assurance_level: "http://assurance.example.org/level1".to_string(),
            subject_confirmation_method: "urn:oasis:names:tc:SAML:2.0:cm:bearer".to_string(),
        }
    }
}

impl QuerySenderSettings {
    /// The configured attributes as request specs, in configuration order.
    pub fn attribute_specs(&self) -> anyhow::Result<Vec<AttributeSpec>> {
        self.attributes.iter().map(RequestedAttribute::to_spec).collect()
    }
}

/// One requested attribute: either a bare name or a
/// `[name, name_format, friendly_name]` triplet in which empty strings
/// stand for absent values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RequestedAttribute {
    Name(String),
    Triplet(Vec<String>),
}

impl RequestedAttribute {
    pub fn to_spec(&self) -> anyhow::Result<AttributeSpec> {
        let fields: Vec<&str> = match self {
            RequestedAttribute::Name(name) => vec![name.as_str()],
            RequestedAttribute::Triplet(fields) => fields.iter().map(String::as_str).collect(),
        };
        if fields.len() > 3 {
            anyhow::bail!("requested attribute {:?} has more than three fields", fields);
        }
        let name = fields.first().map(|n| n.trim()).unwrap_or_default();
        if name.is_empty() {
            anyhow::bail!("requested attribute {:?} has no name", fields);
        }

        let mut spec = AttributeSpec::new(name);
        if let Some(format) = fields.get(1).filter(|f| !f.is_empty()) {
            spec = spec.with_name_format(*format);
        }
        if let Some(friendly_name) = fields.get(2).filter(|f| !f.is_empty()) {
            spec = spec.with_friendly_name(*friendly_name);
        }
        Ok(spec)
    }
}

impl Settings {
    /// Loads settings from `.env`, the configuration file and the environment.
    ///
    /// # Returns
    /// Fully populated settings, or an error when a source is malformed
    pub fn load() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| "aa.toml".to_string());
        Self::load_from(&path)
    }

    /// Loads settings using an explicit file path (the file may be absent).
    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("AA").separator("__"))
            .build()?
            .try_deserialize::<Settings>()?;

        if settings.saml.assertion_validity_minutes <= 0 {
            anyhow::bail!("saml.assertion_validity_minutes must be positive");
        }
        Ok(settings)
    }
}
