//! Failure classification for the two provisioning steps.
//!
//! Each classifier prefers a structured discriminant (an error code) and only then falls back to
//! matching on the provider's message text. The text fallback is fragile against provider wording
//! changes and can be switched off with [`ClassifierConfig::match_messages`].

use serde::{Deserialize, Serialize};

use crate::backend::{AuthApiError, PostgrestError};
use crate::errors::{ConflictTarget, Error, MatchedBy};

/// SQLSTATE `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";

const USERNAME_CONSTRAINT: &str = "profiles_username_key";
const EMAIL_CONSTRAINT: &str = "profiles_email_key";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Fall back to substring matching on provider messages when no structured code decides
    pub match_messages: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { match_messages: true }
    }
}

/// Classify a rejection from the identity service.
pub fn classify_identity_error(err: &AuthApiError, config: &ClassifierConfig) -> Error {
    let details = err.raw.clone();
    let provider_message = err.message.clone();

    match err.code.as_deref() {
        Some("email_exists" | "user_already_exists") => return Error::DuplicateEmail { provider_message, details },
        Some("weak_password") => return Error::WeakPassword { provider_message, details },
        _ => {}
    }

    if config.match_messages {
        let message = err.message.to_lowercase();
        if message.contains("unique constraint") && message.contains("email") {
            return Error::DuplicateEmail { provider_message, details };
        }
        if message.contains("password should be at least 6 characters") {
            return Error::WeakPassword { provider_message, details };
        }
    }

    Error::IdentityService {
        provider_message,
        status: err.status,
        details,
    }
}

/// Classify a failed profile update for the freshly created identity `user_id`.
pub fn classify_profile_error(err: &PostgrestError, user_id: &str, config: &ClassifierConfig) -> Error {
    let details = err.raw.clone();
    let message = err.message.as_deref().unwrap_or_default().to_lowercase();

    let conflict = |target, matched_by| Error::ProfileConflict {
        user_id: user_id.to_string(),
        target,
        matched_by,
        details: details.clone(),
    };

    match err.code.as_deref() {
        Some(UNIQUE_VIOLATION) => {
            let detail = err.details.as_deref().unwrap_or_default().to_lowercase();
            let target = if message.contains(USERNAME_CONSTRAINT) || detail.contains("username") {
                ConflictTarget::Username
            } else if message.contains(EMAIL_CONSTRAINT) || detail.contains("email") {
                ConflictTarget::Email
            } else {
                ConflictTarget::Unknown
            };
            conflict(target, MatchedBy::Code)
        }
        None if config.match_messages && message.contains("unique constraint") => {
            if message.contains(USERNAME_CONSTRAINT) || message.contains("username") {
                conflict(ConflictTarget::Username, MatchedBy::Message)
            } else if message.contains(EMAIL_CONSTRAINT) || message.contains("email") {
                conflict(ConflictTarget::Email, MatchedBy::Message)
            } else {
                generic_profile_error(err, user_id)
            }
        }
        _ => generic_profile_error(err, user_id),
    }
}

fn generic_profile_error(err: &PostgrestError, user_id: &str) -> Error {
    Error::ProfileUpdate {
        user_id: user_id.to_string(),
        provider_message: err.message.clone(),
        code: err.code.clone(),
        status: err.status,
        details: err.raw.clone(),
    }
}
