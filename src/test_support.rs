// src/test_support.rs
//! Shared fixtures for pipeline and server tests.

use crate::config::{Binding, QuerySenderSettings, SamlSettings, Settings, VerificationSettings};
use crate::credentials::{CredentialStore, KeyStore, SigningCredential};
use crate::directory::{AttributeNameMapper, Directory, DirectoryError};
use crate::eligibility::EligibilityGate;
use crate::models::attribute::AttributeSpec;
use crate::saml::codec::encode_query;
use crate::saml::query_builder::QueryBuilder;
use crate::services::attribute_service::AttributeService;
use crate::services::verifier::Verifier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SP_ISSUER: &str = "https://sp.example.org";

/// How the recording directory answers.
pub enum Backend {
    Values(HashMap<String, String>),
    NotFound,
    Down,
}

impl Backend {
    pub fn values(pairs: &[(&str, &str)]) -> Self {
        Backend::Values(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Directory stub that counts calls and remembers the names it was asked for.
pub struct RecordingDirectory {
    backend: Backend,
    calls: AtomicUsize,
    last_names: Mutex<Vec<String>>,
}

impl RecordingDirectory {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_names(&self) -> Vec<String> {
        self.last_names.lock().unwrap().clone()
    }
}

#[async_trait]
impl Directory for RecordingDirectory {
    async fn fetch_attributes(
        &self,
        subject_id: &str,
        names: &[String],
    ) -> Result<HashMap<String, String>, DirectoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_names.lock().unwrap() = names.to_vec();
        match &self.backend {
            Backend::Values(values) => Ok(names
                .iter()
                .map(|name| (name.clone(), values.get(name).cloned().unwrap_or_default()))
                .collect()),
            Backend::NotFound => Err(DirectoryError::SubjectNotFound(subject_id.to_string())),
            Backend::Down => Err(DirectoryError::Backend("connection refused".to_string())),
        }
    }
}

pub struct CountingEligibility {
    eligible: bool,
    calls: AtomicUsize,
}

impl CountingEligibility {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EligibilityGate for CountingEligibility {
    fn is_eligible(&self, _subject_id: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.eligible
    }
}

/// An authority (`stiam-aa`) that trusts one requester ([`SP_ISSUER`]).
pub struct Fixture {
    pub settings: Settings,
    pub directory: Arc<RecordingDirectory>,
    pub eligibility: Arc<CountingEligibility>,
    pub mapper: AttributeNameMapper,
    sp: KeyStore,
    aa: KeyStore,
}

impl Fixture {
    pub fn new(backend: Backend, eligible: bool) -> Self {
        let sp = KeyStore::generate(SP_ISSUER);
        let sp_key = sp
            .signing_credential()
            .map(|credential| credential.verifying_key())
            .unwrap();
        let aa = KeyStore::generate("stiam-aa").trust(SP_ISSUER, sp_key);

        Self {
            settings: Settings::default(),
            directory: Arc::new(RecordingDirectory {
                backend,
                calls: AtomicUsize::new(0),
                last_names: Mutex::new(Vec::new()),
            }),
            eligibility: Arc::new(CountingEligibility {
                eligible,
                calls: AtomicUsize::new(0),
            }),
            mapper: AttributeNameMapper::default(),
            sp,
            aa,
        }
    }

    pub fn with_mapping(mut self, pairs: &[(&str, &str)]) -> Self {
        self.mapper = AttributeNameMapper::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn service(&self) -> AttributeService {
        AttributeService::new(
            &self.settings,
            Arc::new(self.aa.clone()),
            self.eligibility.clone(),
            self.directory.clone(),
            self.mapper.clone(),
        )
    }

    pub fn service_with(&self, verification: VerificationSettings) -> AttributeService {
        let settings = Settings {
            verification,
            ..self.settings.clone()
        };
        AttributeService::new(
            &settings,
            Arc::new(self.aa.clone()),
            self.eligibility.clone(),
            self.directory.clone(),
            self.mapper.clone(),
        )
    }

    /// Query builder acting as the trusted requester.
    pub fn sp_builder(&self) -> QueryBuilder {
        let saml = SamlSettings {
            issuer: SP_ISSUER.to_string(),
            ..SamlSettings::default()
        };
        QueryBuilder::new(&saml, &QuerySenderSettings::default(), Arc::new(self.sp.clone()))
    }

    pub fn sp_credential(&self) -> SigningCredential {
        self.sp.signing_credential().unwrap()
    }

    /// Verifier trusting the authority's own key.
    pub fn aa_verifier(&self) -> Verifier {
        Verifier::new(Arc::new(self.aa.clone()))
    }

    /// A signed SOAP query body from the trusted requester.
    pub fn query(&self, subject_id: &str, names: &[&str], embed: bool, now: DateTime<Utc>) -> String {
        let specs: Vec<AttributeSpec> = names.iter().map(|name| AttributeSpec::new(*name)).collect();
        let query = self.sp_builder().build(subject_id, &specs, embed, now).unwrap();
        encode_query(&query, Binding::Soap).unwrap().body
    }
}
