use axum::{Json, extract::State, http::HeaderMap, http::StatusCode};
use bytes::Bytes;

use crate::{
    AppState,
    api::models::users::{ErrorBody, ProvisionPayload, ProvisionResponse},
    auth::authorize_admin,
    errors::Error,
};

pub const CREATED_MESSAGE: &str = "User created and profile updated successfully";

/// Create a user: auth identity first, then its profile row
///
/// The body is read as raw bytes so that a misconfigured server rejects the request before
/// anything is parsed.
#[utoipa::path(
    post,
    path = "/create-user-admin",
    request_body = ProvisionPayload,
    tag = "users",
    responses(
        (status = 201, description = "Identity created and profile updated", body = ProvisionResponse),
        (status = 400, description = "Invalid or incomplete payload, or identity service rejection", body = ErrorBody),
        (status = 401, description = "Admin API key required", body = ErrorBody),
        (status = 409, description = "Email or username already in use; `userId` set for profile conflicts", body = ErrorBody),
        (status = 500, description = "Configuration, provider or profile update failure", body = ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_user_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ProvisionResponse>), Error> {
    let Some(provisioner) = state.provisioner.as_ref() else {
        return Err(Error::Configuration {
            message: "Missing Supabase credentials.".to_string(),
        });
    };

    authorize_admin(&state.config, &headers)?;

    let payload: ProvisionPayload = serde_json::from_slice(&body).map_err(|e| Error::Validation {
        message: format!("Invalid JSON payload: {e}"),
    })?;

    let user = provisioner.provision(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(ProvisionResponse {
            message: CREATED_MESSAGE.to_string(),
            user_id: user.user_id,
        }),
    ))
}

/// CORS pre-flight. Answered regardless of configuration state.
#[utoipa::path(
    options,
    path = "/create-user-admin",
    tag = "users",
    responses((status = 200, description = "Pre-flight accepted", body = String))
)]
pub async fn preflight() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        create_test_config, create_test_server, mount_create_user_error, mount_create_user_ok, mount_profile_error, mount_profile_ok,
    };
    use axum::http::{HeaderName, HeaderValue};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PATH: &str = "/create-user-admin";

    fn body() -> serde_json::Value {
        json!({
            "email": "jane@example.com",
            "password": "hunter22",
            "full_name": "Jane Doe",
            "username": "jdoe",
            "role": "user"
        })
    }

    fn assert_cors(response: &axum_test::TestResponse) {
        assert_eq!(response.header("access-control-allow-origin"), "*");
        assert_eq!(response.header("access-control-allow-methods"), "POST, OPTIONS");
        assert_eq!(
            response.header("access-control-allow-headers"),
            "authorization, x-client-info, apikey, content-type"
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_create_user_success() {
        let backend = MockServer::start().await;
        mount_create_user_ok(&backend, "user-123").await;
        mount_profile_ok(&backend, "user-123").await;

        let server = create_test_server(create_test_config(Some(&backend.uri())));
        let response = server.post(PATH).json(&body()).await;

        response.assert_status(StatusCode::CREATED);
        assert_cors(&response);
        let created: ProvisionResponse = response.json();
        assert_eq!(created.user_id, "user-123");
        assert_eq!(created.message, CREATED_MESSAGE);
    }

    #[test_log::test(tokio::test)]
    async fn test_functions_path_alias() {
        let backend = MockServer::start().await;
        mount_create_user_ok(&backend, "user-123").await;
        mount_profile_ok(&backend, "user-123").await;

        let server = create_test_server(create_test_config(Some(&backend.uri())));
        server
            .post("/functions/v1/create-user-admin")
            .json(&body())
            .await
            .assert_status(StatusCode::CREATED);
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_fields_make_no_backend_call() {
        let backend = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&backend).await;
        Mock::given(method("PATCH")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&backend).await;

        let server = create_test_server(create_test_config(Some(&backend.uri())));
        let response = server
            .post(PATH)
            .json(&json!({ "email": "jane@example.com", "password": "hunter22", "role": "user" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_cors(&response);
        let error: ErrorBody = response.json();
        assert_eq!(
            error.error,
            "Missing required fields: email, password, full_name, username, role are required."
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_invalid_json() {
        let backend = MockServer::start().await;
        let server = create_test_server(create_test_config(Some(&backend.uri())));

        let response = server
            .post(PATH)
            .add_header(HeaderName::from_static("content-type"), HeaderValue::from_static("application/json"))
            .bytes(Bytes::from_static(b"{not json"))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let error: ErrorBody = response.json();
        assert!(error.error.starts_with("Invalid JSON payload: "));
    }

    #[test_log::test(tokio::test)]
    async fn test_duplicate_email_skips_profile_update() {
        let backend = MockServer::start().await;
        mount_create_user_error(
            &backend,
            422,
            json!({ "msg": "Database error: duplicate key value violates unique constraint \"users_email_key\"" }),
        )
        .await;
        Mock::given(method("PATCH")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&backend).await;

        let server = create_test_server(create_test_config(Some(&backend.uri())));
        let response = server.post(PATH).json(&body()).await;

        response.assert_status(StatusCode::CONFLICT);
        let error: ErrorBody = response.json();
        assert_eq!(error.error, "Cette adresse e-mail est déjà utilisée par un autre compte.");
        assert!(error.details.is_some());
        assert!(error.user_id.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_weak_password() {
        let backend = MockServer::start().await;
        mount_create_user_error(&backend, 422, json!({ "msg": "Password should be at least 6 characters." })).await;

        let server = create_test_server(create_test_config(Some(&backend.uri())));
        let response = server.post(PATH).json(&body()).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let error: ErrorBody = response.json();
        assert_eq!(error.error, "Le mot de passe doit contenir au moins 6 caractères.");
    }

    #[test_log::test(tokio::test)]
    async fn test_username_conflict_reports_partial_failure() {
        let backend = MockServer::start().await;
        mount_create_user_ok(&backend, "user-123").await;
        mount_profile_error(
            &backend,
            409,
            json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint \"profiles_username_key\"",
                "details": "Key (username)=(jdoe) already exists.",
                "hint": null
            }),
        )
        .await;

        let server = create_test_server(create_test_config(Some(&backend.uri())));
        let response = server.post(PATH).json(&body()).await;

        response.assert_status(StatusCode::CONFLICT);
        let error: ErrorBody = response.json();
        assert!(error.error.contains("ce nom d'utilisateur est déjà pris"));
        assert!(error.error.contains(crate::errors::PARTIAL_FAILURE_NOTE));
        assert_eq!(error.user_id.as_deref(), Some("user-123"));
        assert_eq!(error.details.unwrap()["code"], "23505");
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_profile_row() {
        let backend = MockServer::start().await;
        mount_create_user_ok(&backend, "user-123").await;
        mount_profile_error(
            &backend,
            406,
            json!({
                "code": "PGRST116",
                "message": "JSON object requested, multiple (or no) rows returned",
                "details": "The result contains 0 rows",
                "hint": null
            }),
        )
        .await;

        let server = create_test_server(create_test_config(Some(&backend.uri())));
        let response = server.post(PATH).json(&body()).await;

        response.assert_status(StatusCode::NOT_ACCEPTABLE);
        let error: ErrorBody = response.json();
        assert!(error.error.contains("(Code: PGRST116)"));
        assert_eq!(error.user_id.as_deref(), Some("user-123"));
    }

    #[test_log::test(tokio::test)]
    async fn test_profile_timeout_reports_partial_failure() {
        let backend = MockServer::start().await;
        mount_create_user_ok(&backend, "user-123").await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&backend)
            .await;

        let mut config = create_test_config(Some(&backend.uri()));
        config.supabase.request_timeout = Some(Duration::from_millis(300));
        let server = create_test_server(config);
        let response = server.post(PATH).json(&body()).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_cors(&response);
        let error: ErrorBody = response.json();
        assert!(error.error.starts_with("Erreur lors de la mise à jour du profil: "));
        assert!(error.error.ends_with(crate::errors::PARTIAL_FAILURE_NOTE));
        assert_eq!(error.user_id.as_deref(), Some("user-123"));
        let details = error.details.unwrap();
        assert!(details["message"].as_str().unwrap().contains("Failed to send profile update request"));
    }

    #[test_log::test(tokio::test)]
    async fn test_success_without_identity_object() {
        let backend = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "user": null })))
            .mount(&backend)
            .await;

        let server = create_test_server(create_test_config(Some(&backend.uri())));
        let response = server.post(PATH).json(&body()).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let error: ErrorBody = response.json();
        assert_eq!(error.error, "User creation failed: No user object returned from auth.");
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_configuration_rejects_every_post() {
        let server = create_test_server(create_test_config(None));

        for payload in [body(), json!({})] {
            let response = server.post(PATH).json(&payload).await;
            response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
            assert_cors(&response);
            let error: ErrorBody = response.json();
            assert_eq!(error.error, "Server configuration error: Missing Supabase credentials.");
        }

        // Checked before the body is looked at
        let response = server.post(PATH).text("{not json").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test_log::test(tokio::test)]
    async fn test_options_always_succeeds() {
        for config in [create_test_config(None), create_test_config(Some("http://127.0.0.1:9"))] {
            let server = create_test_server(config);
            let response = server.method(axum::http::Method::OPTIONS, PATH).await;
            response.assert_status_ok();
            response.assert_text("ok");
            assert_cors(&response);
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_admin_api_key_enforced() {
        let backend = MockServer::start().await;
        mount_create_user_ok(&backend, "user-123").await;
        mount_profile_ok(&backend, "user-123").await;

        let mut config = create_test_config(Some(&backend.uri()));
        config.admin_api_key = Some("console-key".to_string());
        let server = create_test_server(config);

        let response = server.post(PATH).json(&body()).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_cors(&response);

        server
            .post(PATH)
            .authorization_bearer("console-key")
            .json(&body())
            .await
            .assert_status(StatusCode::CREATED);
    }
}
