//! Identity creation through the GoTrue admin API.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::{AuthApiError, AuthIdentity, IdentityError, IdentityService, NewIdentity, build_client, ensure_slash};
use crate::config::Credentials;

/// Service-role client for `POST /auth/v1/admin/users`.
pub struct SupabaseAuthClient {
    client: Client,
    base_url: Url,
    service_role_key: String,
}

impl SupabaseAuthClient {
    pub fn new(credentials: &Credentials) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(credentials.request_timeout)?,
            base_url: credentials.url.clone(),
            service_role_key: credentials.service_role_key.clone(),
        })
    }

    fn users_url(&self) -> anyhow::Result<Url> {
        ensure_slash(&self.base_url)
            .join("auth/v1/admin/users")
            .context("Failed to construct admin users URL")
    }
}

/// Pull the identity out of a successful response. Current GoTrue returns the user object
/// directly; some older deployments wrap it as `{"user": {...}}`.
fn identity_from_body(body: &Value) -> Option<AuthIdentity> {
    let user = body.get("user").filter(|user| user.is_object()).unwrap_or(body);
    let id = user.get("id").and_then(Value::as_str).filter(|id| !id.is_empty())?;
    Some(AuthIdentity {
        id: id.to_string(),
        email: user.get("email").and_then(Value::as_str).map(str::to_string),
    })
}

#[async_trait]
impl IdentityService for SupabaseAuthClient {
    #[instrument(skip_all, fields(email = %identity.email))]
    async fn create_identity(&self, identity: &NewIdentity) -> Result<Option<AuthIdentity>, IdentityError> {
        let url = self.users_url()?;
        debug!("Creating identity via {}", url);

        let response = self
            .client
            .post(url)
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .json(identity)
            .send()
            .await
            .context("Failed to send create user request")?;

        let status = response.status();
        let body = response.bytes().await.context("Failed to read create user response")?;

        if !status.is_success() {
            return Err(AuthApiError::from_response(status.as_u16(), &body).into());
        }

        if body.is_empty() {
            return Ok(None);
        }
        let body: Value = serde_json::from_slice(&body).context("Failed to decode create user response")?;
        Ok(identity_from_body(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_credentials;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn new_identity() -> NewIdentity {
        NewIdentity {
            email: "jane@example.com".to_string(),
            password: "hunter22".to_string(),
            email_confirm: false,
        }
    }

    #[test]
    fn test_identity_from_body_shapes() {
        let direct = json!({ "id": "abc", "email": "a@b.c", "aud": "authenticated" });
        assert_eq!(identity_from_body(&direct).unwrap().id, "abc");

        let wrapped = json!({ "user": { "id": "def" } });
        let identity = identity_from_body(&wrapped).unwrap();
        assert_eq!(identity.id, "def");
        assert_eq!(identity.email, None);

        assert!(identity_from_body(&json!({ "user": null })).is_none());
        assert!(identity_from_body(&json!({ "id": "" })).is_none());
        assert!(identity_from_body(&Value::Null).is_none());
    }

    #[tokio::test]
    async fn test_create_identity_sends_service_role_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .and(body_json(json!({
                "email": "jane@example.com",
                "password": "hunter22",
                "email_confirm": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "user-123", "email": "jane@example.com" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = SupabaseAuthClient::new(&test_credentials(&server.uri())).unwrap();
        let identity = client.create_identity(&new_identity()).await.unwrap().unwrap();
        assert_eq!(identity.id, "user-123");
        assert_eq!(identity.email.as_deref(), Some("jane@example.com"));
    }

    #[tokio::test]
    async fn test_create_identity_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "code": 422,
                "error_code": "weak_password",
                "msg": "Password should be at least 6 characters."
            })))
            .mount(&server)
            .await;

        let client = SupabaseAuthClient::new(&test_credentials(&server.uri())).unwrap();
        match client.create_identity(&new_identity()).await {
            Err(IdentityError::Api(err)) => {
                assert_eq!(err.status, Some(422));
                assert_eq!(err.code.as_deref(), Some("weak_password"));
                assert_eq!(err.message, "Password should be at least 6 characters.");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_identity_empty_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = SupabaseAuthClient::new(&test_credentials(&server.uri())).unwrap();
        assert_eq!(client.create_identity(&new_identity()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_identity_undecodable_body_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let client = SupabaseAuthClient::new(&test_credentials(&server.uri())).unwrap();
        assert!(matches!(
            client.create_identity(&new_identity()).await,
            Err(IdentityError::Transport(_))
        ));
    }
}
