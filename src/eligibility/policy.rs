// src/eligibility/policy.rs
//! Per-subject accept/deny list with a default policy.

use crate::config::EligibilitySettings;
use crate::eligibility::EligibilityGate;
use crate::utils::serialization::load_json_file;
use log::{debug, info, warn};
use std::collections::HashMap;

/// Eligibility decided by a JSON object of `subject -> "accept" | "deny"`.
///
/// Values are compared case-insensitively. Subjects that are missing, or
/// whose value is empty or anything else, get the default policy.
#[derive(Debug, Clone)]
pub struct PolicyEligibility {
    policies: HashMap<String, String>,
    default_accept: bool,
}

impl PolicyEligibility {
    pub fn new(policies: HashMap<String, String>, default_accept: bool) -> Self {
        Self {
            policies,
            default_accept,
        }
    }

    /// Loads the policy file named in `settings`, if any.
    pub fn from_settings(settings: &EligibilitySettings) -> anyhow::Result<Self> {
        let default_accept = match parse_policy(&settings.default_policy) {
            Some(accept) => accept,
            None => {
                warn!(
                    "Unknown default eligibility policy '{}', denying by default",
                    settings.default_policy
                );
                false
            }
        };

        let policies = match &settings.file {
            Some(path) => {
                let policies: HashMap<String, String> = load_json_file(path)?;
                info!("Loaded {} eligibility policies from {}", policies.len(), path.display());
                policies
            }
            None => {
                info!("No eligibility file configured; every subject gets the default policy");
                HashMap::new()
            }
        };

        Ok(Self::new(policies, default_accept))
    }
}

impl EligibilityGate for PolicyEligibility {
    fn is_eligible(&self, subject_id: &str) -> bool {
        match self.policies.get(subject_id).and_then(|p| parse_policy(p)) {
            Some(eligible) => {
                debug!("Is {} eligible? {}", subject_id, eligible);
                eligible
            }
            None => {
                debug!(
                    "No policy for '{}', returning default: {}",
                    subject_id, self.default_accept
                );
                self.default_accept
            }
        }
    }
}

fn parse_policy(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("accept") {
        Some(true)
    } else if value.eq_ignore_ascii_case("deny") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policies() -> HashMap<String, String> {
        [("johndoe", "ACCEPT"), ("janedoe", "deny"), ("blank", ""), ("odd", "maybe")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_explicit_policies() {
        let gate = PolicyEligibility::new(policies(), false);
        assert!(gate.is_eligible("johndoe"));
        assert!(!gate.is_eligible("janedoe"));
    }

    #[test]
    fn test_default_policy_applies_to_unknown_values() {
        let deny = PolicyEligibility::new(policies(), false);
        let accept = PolicyEligibility::new(policies(), true);
        for subject in ["blank", "odd", "nobody"] {
            assert!(!deny.is_eligible(subject));
            assert!(accept.is_eligible(subject));
        }
        assert!(!accept.is_eligible("janedoe"));
    }

    #[test]
    fn test_from_settings() {
        let path = std::env::temp_dir().join(format!("aa-eligibility-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"johndoe": "accept"}"#).unwrap();

        let gate = PolicyEligibility::from_settings(&EligibilitySettings {
            file: Some(path.clone()),
            default_policy: "Deny".to_string(),
        })
        .unwrap();
        assert!(gate.is_eligible("johndoe"));
        assert!(!gate.is_eligible("janedoe"));

        std::fs::remove_file(&path).unwrap();
    }
}
