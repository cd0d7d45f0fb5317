use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error as ThisError;

use crate::api::models::users::ErrorBody;

/// Appended to every profile-step failure: the auth identity exists at that point and is not
/// rolled back, so the caller must be told.
pub const PARTIAL_FAILURE_NOTE: &str =
    "L'utilisateur a été créé dans l'authentification mais la mise à jour du profil a échoué.";

/// Which unique value collided when the profile row was updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictTarget {
    Username,
    Email,
    Unknown,
}

/// How a profile conflict was recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    /// The store reported the canonical unique-violation code
    Code,
    /// No code was present; the message text named the constraint
    Message,
}

#[derive(ThisError, Debug)]
pub enum Error {
    /// Backend credentials are absent; every request is rejected until they are configured
    #[error("Server configuration error: {message}")]
    Configuration { message: String },

    /// Caller did not present the admin credential
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Malformed or incomplete request
    #[error("{message}")]
    Validation { message: String },

    #[error("Email already registered: {provider_message}")]
    DuplicateEmail { provider_message: String, details: Value },

    #[error("Password rejected by identity service: {provider_message}")]
    WeakPassword { provider_message: String, details: Value },

    /// Any other identity service rejection
    #[error("Auth error: {provider_message}")]
    IdentityService {
        provider_message: String,
        status: Option<u16>,
        details: Value,
    },

    /// The identity service reported success but sent no identity
    #[error("User creation failed: No user object returned from auth.")]
    InternalInconsistency,

    /// Unique constraint hit while updating the profile row
    #[error("Profile conflict ({target:?}, matched by {matched_by:?}) for user {user_id}")]
    ProfileConflict {
        user_id: String,
        target: ConflictTarget,
        matched_by: MatchedBy,
        details: Value,
    },

    /// Profile update rejected for any other reason
    #[error("Profile update failed for user {user_id}: {}", .provider_message.as_deref().unwrap_or("unknown error"))]
    ProfileUpdate {
        user_id: String,
        provider_message: Option<String>,
        code: Option<String>,
        status: Option<u16>,
        details: Value,
    },

    /// The profile update never got an answer (timeout, connection failure, unreadable body)
    #[error("Profile update failed for user {user_id}: {error:#}")]
    ProfileTransport { user_id: String, error: anyhow::Error },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn status_or(status: Option<u16>, fallback: StatusCode) -> StatusCode {
    status.and_then(|s| StatusCode::from_u16(s).ok()).unwrap_or(fallback)
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::DuplicateEmail { .. } => StatusCode::CONFLICT,
            Error::WeakPassword { .. } => StatusCode::BAD_REQUEST,
            Error::IdentityService { status, .. } => status_or(*status, StatusCode::BAD_REQUEST),
            Error::InternalInconsistency => StatusCode::INTERNAL_SERVER_ERROR,
            Error::ProfileConflict { .. } => StatusCode::CONFLICT,
            Error::ProfileUpdate { code: Some(_), status, .. } => status_or(*status, StatusCode::INTERNAL_SERVER_ERROR),
            Error::ProfileUpdate { code: None, .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::ProfileTransport { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the admin console.
    ///
    /// The two common conflict cases and the password rule are localized for end users; everything
    /// else is generic but carries the provider message.
    pub fn user_message(&self) -> String {
        match self {
            Error::Configuration { .. } => self.to_string(),
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::Validation { message } => message.clone(),
            Error::DuplicateEmail { .. } => "Cette adresse e-mail est déjà utilisée par un autre compte.".to_string(),
            Error::WeakPassword { .. } => "Le mot de passe doit contenir au moins 6 caractères.".to_string(),
            Error::IdentityService { provider_message, .. } => format!("Auth error: {provider_message}"),
            Error::InternalInconsistency => self.to_string(),
            Error::ProfileConflict { target, matched_by, .. } => {
                let base = match target {
                    ConflictTarget::Username => "Échec de la mise à jour du profil : ce nom d'utilisateur est déjà pris",
                    ConflictTarget::Email => "Échec de la mise à jour du profil : cette adresse e-mail est déjà prise dans les profils",
                    ConflictTarget::Unknown => "Échec de la mise à jour du profil : une valeur unique est déjà utilisée (code 23505)",
                };
                match matched_by {
                    MatchedBy::Code => format!("{base}. {PARTIAL_FAILURE_NOTE}"),
                    MatchedBy::Message => format!("{base} (par message). {PARTIAL_FAILURE_NOTE}"),
                }
            }
            Error::ProfileUpdate {
                provider_message,
                code: Some(code),
                ..
            } => format!(
                "Erreur de mise à jour du profil: {} (Code: {code}). {PARTIAL_FAILURE_NOTE}",
                provider_message.as_deref().unwrap_or("Erreur inconnue")
            ),
            Error::ProfileUpdate {
                provider_message, code: None, ..
            } => format!(
                "Erreur lors de la mise à jour du profil: {}. {PARTIAL_FAILURE_NOTE}",
                provider_message.as_deref().unwrap_or("Erreur inconnue")
            ),
            Error::ProfileTransport { error, .. } => {
                format!("Erreur lors de la mise à jour du profil: {error}. {PARTIAL_FAILURE_NOTE}")
            }
            Error::Internal(err) => format!("Internal server error: {err}"),
        }
    }

    /// Raw provider error (or internal error description) for the `details` field.
    pub fn details(&self) -> Option<Value> {
        match self {
            Error::DuplicateEmail { details, .. }
            | Error::WeakPassword { details, .. }
            | Error::IdentityService { details, .. }
            | Error::ProfileConflict { details, .. }
            | Error::ProfileUpdate { details, .. } => Some(details.clone()),
            Error::ProfileTransport { error: err, .. } | Error::Internal(err) => {
                Some(json!({ "message": format!("{err:#}") }))
            }
            _ => None,
        }
    }

    /// Id of the identity left without a profile, for partial failures.
    pub fn orphaned_user_id(&self) -> Option<&str> {
        match self {
            Error::ProfileConflict { user_id, .. }
            | Error::ProfileUpdate { user_id, .. }
            | Error::ProfileTransport { user_id, .. } => Some(user_id),
            _ => None,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.user_message(),
            details: self.details(),
            user_id: self.orphaned_user_id().map(str::to_string),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Configuration { .. } | Error::InternalInconsistency | Error::Internal(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::ProfileTransport { .. } => {
                tracing::error!("Partial failure, identity created without profile: {}", self);
            }
            Error::ProfileConflict { .. } | Error::ProfileUpdate { .. } => {
                tracing::warn!("Partial failure, identity created without profile: {}", self);
            }
            Error::DuplicateEmail { .. } | Error::IdentityService { .. } => {
                tracing::warn!("Identity service rejected request: {}", self);
            }
            Error::Unauthenticated { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::Validation { .. } | Error::WeakPassword { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), Json(self.to_body())).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
