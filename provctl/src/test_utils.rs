//! Test utilities: configs, servers and backend mocks shared across test modules.

use axum_test::TestServer;
use serde_json::{Value, json};
use std::sync::Once;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::{Config, Credentials, SupabaseConfig};
use crate::{AppState, build_router};

/// reqwest is built without a bundled crypto provider; `main` installs one, tests do it here.
pub fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

pub fn test_credentials(base_url: &str) -> Credentials {
    install_crypto_provider();
    Credentials {
        url: Url::parse(base_url).expect("Invalid test backend URL"),
        service_role_key: "service-key".to_string(),
        request_timeout: None,
    }
}

/// Config pointing at `backend_url`, or without credentials when `None`.
pub fn create_test_config(backend_url: Option<&str>) -> Config {
    install_crypto_provider();
    Config {
        host: "127.0.0.1".to_string(),
        supabase: SupabaseConfig {
            url: backend_url.map(str::to_string),
            service_role_key: backend_url.map(|_| "service-key".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn create_test_server(config: Config) -> TestServer {
    let state = AppState::from_config(config).expect("Failed to build app state");
    TestServer::new(build_router(state)).expect("Failed to create test server")
}

pub async fn mount_create_user_ok(server: &MockServer, user_id: &str) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/admin/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": user_id,
            "aud": "authenticated",
            "email": "jane@example.com",
            "email_confirmed_at": null
        })))
        .mount(server)
        .await;
}

pub async fn mount_create_user_error(server: &MockServer, status: u16, body: Value) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/admin/users"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_profile_ok(server: &MockServer, user_id: &str) {
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{user_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": user_id, "status": "approved" })))
        .expect(1)
        .mount(server)
        .await;
}

pub async fn mount_profile_error(server: &MockServer, status: u16, body: Value) {
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}
