//! Outbound collaborators: the hosted identity service and the profile table API.
//!
//! The provisioner only talks to these through the [`IdentityService`] and [`ProfileStore`]
//! traits. The concrete implementations in [`auth`] and [`profiles`] speak the Supabase REST
//! surface (GoTrue admin API and PostgREST) over `reqwest`.
//!
//! Both calls distinguish between the provider *answering* with an error payload (which the
//! provisioner classifies) and the request failing to produce a usable answer at all, which is
//! reported as [`IdentityError::Transport`] / [`ProfileStoreError::Transport`] and surfaces as an
//! internal error.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::api::models::users::{ProfileStatus, Role};

pub mod auth;
pub mod profiles;

pub use auth::SupabaseAuthClient;
pub use profiles::SupabaseProfileStore;

/// Identity to create. `email_confirm: false` leaves the identity unconfirmed.
#[derive(Clone, Serialize)]
pub struct NewIdentity {
    pub email: String,
    pub password: String,
    pub email_confirm: bool,
}

/// Identity returned by the identity service. Only `id` is used downstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthIdentity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Columns written onto the pre-existing profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub username: String,
    pub role: Role,
    pub status: ProfileStatus,
}

/// Error payload returned by the identity service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct AuthApiError {
    pub message: String,
    /// HTTP status reported by the provider
    pub status: Option<u16>,
    /// Structured error code (`error_code`), e.g. `email_exists` or `weak_password`
    pub code: Option<String>,
    /// The body as received
    pub raw: Value,
}

impl AuthApiError {
    /// Build from a non-success response body. GoTrue has used `msg`, `message`,
    /// `error_description` and `error` for the human-readable text across versions.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let raw = parse_body(body);
        let message = ["msg", "message", "error_description", "error"]
            .iter()
            .find_map(|key| raw.get(key).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| raw.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("identity service returned status {status}"));
        // Newer GoTrue puts the numeric HTTP status in `code` and the discriminant in `error_code`
        let code = ["error_code", "code"]
            .iter()
            .find_map(|key| raw.get(key).and_then(Value::as_str))
            .map(str::to_string);

        Self {
            message,
            status: Some(status),
            code,
            raw,
        }
    }
}

/// Error payload returned by the relational table API.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", .message.as_deref().unwrap_or("unknown profile store error"))]
pub struct PostgrestError {
    /// SQLSTATE or PostgREST code, e.g. `23505` or `PGRST116`
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
    pub status: Option<u16>,
    pub raw: Value,
}

impl PostgrestError {
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let raw = parse_body(body);
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);

        Self {
            code: text("code"),
            message: text("message").or_else(|| raw.as_str().map(str::to_string)),
            details: text("details"),
            hint: text("hint"),
            status: Some(status),
            raw,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error(transparent)]
    Api(#[from] AuthApiError),
    #[error("identity service transport failure: {0:#}")]
    Transport(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileStoreError {
    #[error(transparent)]
    Api(#[from] PostgrestError),
    #[error("profile store transport failure: {0:#}")]
    Transport(#[from] anyhow::Error),
}

/// Creates authentication identities.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Create an identity. `Ok(None)` means the provider reported success without returning
    /// an identity object.
    async fn create_identity(&self, identity: &NewIdentity) -> Result<Option<AuthIdentity>, IdentityError>;
}

/// Updates profile rows keyed by identity id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Update the existing profile row for `id`. Never inserts.
    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<(), ProfileStoreError>;
}

/// Shared HTTP client. Without a configured timeout the transport default applies.
pub(crate) fn build_client(request_timeout: Option<Duration>) -> anyhow::Result<Client> {
    let mut builder = Client::builder();
    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// Makes sure a url has a trailing slash.
///
/// `Url::join` replaces the last path segment unless the base ends in '/', so a project URL
/// mounted under a path prefix would otherwise lose it.
pub(crate) fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

/// Parse an error body as JSON, keeping non-JSON bodies as a string value.
fn parse_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}
