use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::UserId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdentityError {
    #[error("email address is malformed")]
    InvalidEmail,

    #[error("name is required")]
    EmptyName,

    #[error("PIN must be 4 digits")]
    InvalidPin,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProfileError {
    #[error("child name is required")]
    EmptyChildName,

    #[error("birth year {0} is out of range")]
    InvalidBirthYear(i32),
}

//
// ─── IDENTITY ──────────────────────────────────────────────────────────────────
//

/// External identity a caller presents before any progress lookup.
///
/// Email identities come from verified sign-in; legacy identities are the
/// older name + 4-digit PIN pairs. Both collapse into a single storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Identity {
    Email(String),
    Legacy { name: String, pin: String },
}

impl Identity {
    #[must_use]
    pub fn email(email: impl Into<String>) -> Self {
        Self::Email(email.into())
    }

    #[must_use]
    pub fn legacy(name: impl Into<String>, pin: impl Into<String>) -> Self {
        Self::Legacy {
            name: name.into(),
            pin: pin.into(),
        }
    }

    /// Normalized unique key used to look the user up in storage.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError` if the email, name or PIN is malformed.
    pub fn key(&self) -> Result<String, IdentityError> {
        match self {
            Identity::Email(email) => Ok(format!("email:{}", normalize_email(email)?)),
            Identity::Legacy { name, pin } => {
                let name = name.trim().to_lowercase();
                if name.is_empty() {
                    return Err(IdentityError::EmptyName);
                }
                if pin.len() != 4 || !pin.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(IdentityError::InvalidPin);
                }
                Ok(format!("legacy:{name}:{pin}"))
            }
        }
    }

    /// Normalized email for email identities, `None` for legacy ones.
    #[must_use]
    pub fn normalized_email(&self) -> Option<String> {
        match self {
            Identity::Email(email) => normalize_email(email).ok(),
            Identity::Legacy { .. } => None,
        }
    }

    /// Display name derived from the identity when the caller supplies none.
    #[must_use]
    pub fn fallback_display_name(&self) -> String {
        match self {
            Identity::Email(email) => email
                .trim()
                .split('@')
                .next()
                .unwrap_or_default()
                .to_owned(),
            Identity::Legacy { name, .. } => name.trim().to_owned(),
        }
    }
}

fn normalize_email(raw: &str) -> Result<String, IdentityError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
        {
            Ok(email)
        }
        _ => Err(IdentityError::InvalidEmail),
    }
}

//
// ─── CHILD PROFILE ─────────────────────────────────────────────────────────────
//

/// Onboarding details about the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildProfile {
    pub child_name: String,
    pub birth_year: i32,
    pub school_name: Option<String>,
}

impl ChildProfile {
    /// Validates and normalizes onboarding input.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` if the name is blank or the birth year lies
    /// outside `1900..=now.year()`.
    pub fn new(
        child_name: &str,
        birth_year: i32,
        school_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, ProfileError> {
        let child_name = child_name.trim();
        if child_name.is_empty() {
            return Err(ProfileError::EmptyChildName);
        }
        if !(1900..=now.year()).contains(&birth_year) {
            return Err(ProfileError::InvalidBirthYear(birth_year));
        }
        let school_name = school_name
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        Ok(Self {
            child_name: child_name.to_owned(),
            birth_year,
            school_name,
        })
    }
}

//
// ─── USER ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub identity_key: String,
    pub display_name: String,
    pub profile: Option<ChildProfile>,
    pub onboarded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn email_identity_key_is_case_insensitive() {
        let a = Identity::email(" Parent@Example.com ").key().unwrap();
        let b = Identity::email("parent@example.com").key().unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "email:parent@example.com");
    }

    #[test]
    fn malformed_email_is_rejected() {
        for raw in ["", "no-at-sign", "@example.com", "a@", "a@b@c"] {
            assert_eq!(
                Identity::email(raw).key().unwrap_err(),
                IdentityError::InvalidEmail,
                "{raw}"
            );
        }
    }

    #[test]
    fn legacy_identity_normalizes_name() {
        let key = Identity::legacy("  Maya ", "0042").key().unwrap();
        assert_eq!(key, "legacy:maya:0042");
    }

    #[test]
    fn legacy_identity_requires_four_digit_pin() {
        assert_eq!(
            Identity::legacy("maya", "12a4").key().unwrap_err(),
            IdentityError::InvalidPin
        );
        assert_eq!(
            Identity::legacy("maya", "12345").key().unwrap_err(),
            IdentityError::InvalidPin
        );
        assert_eq!(
            Identity::legacy("  ", "1234").key().unwrap_err(),
            IdentityError::EmptyName
        );
    }

    #[test]
    fn fallback_display_name_uses_local_part() {
        assert_eq!(
            Identity::email("sam@example.com").fallback_display_name(),
            "sam"
        );
        assert_eq!(Identity::legacy(" Sam ", "1111").fallback_display_name(), "Sam");
    }

    #[test]
    fn profile_validates_inputs() {
        let now = fixed_now();
        let profile = ChildProfile::new(" Ada ", 2014, Some("  "), now).unwrap();
        assert_eq!(profile.child_name, "Ada");
        assert_eq!(profile.school_name, None);

        assert_eq!(
            ChildProfile::new(" ", 2014, None, now).unwrap_err(),
            ProfileError::EmptyChildName
        );
        assert_eq!(
            ChildProfile::new("Ada", 2999, None, now).unwrap_err(),
            ProfileError::InvalidBirthYear(2999)
        );
    }
}
