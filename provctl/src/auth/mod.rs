//! Caller authentication for the provisioning endpoint.
//!
//! The endpoint is meant for an admin console holding a service-level credential. When
//! `admin_api_key` is configured, the caller must present it either as a bearer token or in the
//! `apikey` header (the header the hosted function gateway uses). When it is not configured,
//! caller authorization is left to whatever gateway fronts the service.

use axum::http::{HeaderMap, header};
use tracing::{debug, instrument};

use crate::config::Config;
use crate::errors::{Error, Result};

/// Verify the caller against the configured admin key, if any.
#[instrument(skip_all)]
pub fn authorize_admin(config: &Config, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = config.admin_api_key.as_deref() else {
        return Ok(());
    };

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split_once(' '))
        .and_then(|(scheme, token)| scheme.eq_ignore_ascii_case("bearer").then_some(token));
    let apikey = headers.get("apikey").and_then(|value| value.to_str().ok());

    if [bearer, apikey]
        .into_iter()
        .flatten()
        .any(|presented| constant_time_eq(presented.trim().as_bytes(), expected.as_bytes()))
    {
        return Ok(());
    }

    debug!("Rejecting caller without a valid admin key");
    Err(Error::Unauthenticated {
        message: Some("A valid admin API key is required".to_string()),
    })
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
