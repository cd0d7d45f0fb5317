//! API request/response models for user provisioning.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use utoipa::ToSchema;

use crate::errors::Error;

/// Application role written onto the profile row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Moderator, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    /// Parse the wire value. Matching is exact; the admin console sends lowercase.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == value)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile status. Provisioned users are approved immediately.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    Approved,
}

/// Raw inbound body.
///
/// Every field is optional so that a payload missing several fields produces one aggregated
/// validation error rather than a deserialization failure on the first absent key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProvisionPayload {
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub username: Option<String>,
    /// One of `user`, `moderator`, `admin`
    pub role: Option<String>,
}

/// A payload that passed validation: all five fields present and the role understood.
#[derive(Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub username: String,
    pub role: Role,
}

// Hand-written so the password never ends up in a log line.
impl fmt::Debug for ProvisionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("full_name", &self.full_name)
            .field("username", &self.username)
            .field("role", &self.role)
            .finish()
    }
}

pub const MISSING_FIELDS_MESSAGE: &str = "Missing required fields: email, password, full_name, username, role are required.";

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl ProvisionPayload {
    /// Names of required fields that are absent or empty, in declaration order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("email", &self.email),
            ("password", &self.password),
            ("full_name", &self.full_name),
            ("username", &self.username),
            ("role", &self.role),
        ]
        .into_iter()
        .filter(|(_, value)| present(value).is_none())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn validate(self) -> Result<ProvisionRequest, Error> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            tracing::debug!("Rejecting payload, missing fields: {}", missing.join(", "));
            return Err(Error::Validation {
                message: MISSING_FIELDS_MESSAGE.to_string(),
            });
        }

        let role_value = self.role.unwrap_or_default();
        let role = Role::parse(&role_value).ok_or_else(|| Error::Validation {
            message: format!("Invalid role '{role_value}': expected one of user, moderator, admin."),
        })?;

        Ok(ProvisionRequest {
            email: self.email.unwrap_or_default(),
            password: self.password.unwrap_or_default(),
            full_name: self.full_name.unwrap_or_default(),
            username: self.username.unwrap_or_default(),
            role,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ProvisionResponse {
    pub message: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Error envelope returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    /// Raw provider error, attached for operator diagnostics
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
    /// Set when the auth identity exists but its profile could not be updated
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}
