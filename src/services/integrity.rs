use regex::Regex;

use crate::models::CustomerProfile;

/// Result of the data-completeness barrier. Never blocks the turn; the flag
/// only switches the prompt into data-collection mode.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityReport {
    pub is_data_complete: bool,
    pub missing: Vec<&'static str>,
    pub error: Option<String>,
}

pub struct IntegrityGate {
    require_email: bool,
    email_re: Regex,
}

impl IntegrityGate {
    pub fn new(require_email: bool) -> Result<Self, regex::Error> {
        Ok(Self {
            require_email,
            email_re: Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")?,
        })
    }

    pub fn requires_email(&self) -> bool {
        self.require_email
    }

    pub fn is_valid_email(&self, email: &str) -> bool {
        self.email_re.is_match(email.trim())
    }

    pub fn check(&self, profile: Option<&CustomerProfile>) -> IntegrityReport {
        let Some(profile) = profile else {
            return IntegrityReport {
                is_data_complete: false,
                missing: vec!["name"],
                error: Some("customer profile missing".to_string()),
            };
        };

        let error = profile
            .phone
            .trim()
            .is_empty()
            .then(|| "customer profile has no phone".to_string());

        let mut missing = Vec::new();
        let has_name = profile
            .name
            .as_deref()
            .map(|n| n.trim().chars().count() > 1)
            .unwrap_or(false);
        if !has_name {
            missing.push("name");
        }
        if self.require_email {
            let has_email = profile
                .email
                .as_deref()
                .map(|e| self.is_valid_email(e))
                .unwrap_or(false);
            if !has_email {
                missing.push("email");
            }
        }

        IntegrityReport {
            is_data_complete: missing.is_empty() && error.is_none(),
            missing,
            error,
        }
    }

    /// Copy of the profile with the derived flag recomputed.
    pub fn apply(&self, profile: Option<&CustomerProfile>) -> (Option<CustomerProfile>, IntegrityReport) {
        let report = self.check(profile);
        let profile = profile.map(|p| CustomerProfile {
            is_data_complete: report.is_data_complete,
            ..p.clone()
        });
        (profile, report)
    }
}
