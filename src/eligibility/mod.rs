// src/eligibility/mod.rs
//! Eligibility gate: may attributes about a subject be released at all?

pub mod policy;

use crate::config::EligibilitySettings;
use std::sync::Arc;

pub use policy::PolicyEligibility;

/// Boolean release policy over subject identifiers.
///
/// Implementations decide from local state only and never fail; anything
/// they cannot decide is answered by their default.
pub trait EligibilityGate: Send + Sync {
    fn is_eligible(&self, subject_id: &str) -> bool;
}

/// Builds the configured eligibility gate.
pub fn from_settings(settings: &EligibilitySettings) -> anyhow::Result<Arc<dyn EligibilityGate>> {
    Ok(Arc::new(PolicyEligibility::from_settings(settings)?))
}
