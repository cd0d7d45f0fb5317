//! OpenAPI documentation for the provisioning API.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Documents the optional admin key, accepted as a bearer token or `apikey` header.
struct AdminKeyAddon;

impl Modify for AdminKeyAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("Admin API key")
                        .description(Some(
                            "Required only when the server is configured with `admin_api_key`:\n\n\
                            ```\nAuthorization: Bearer YOUR_ADMIN_KEY\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "ApiKeyHeader".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("apikey"))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::users::create_user_admin,
        api::handlers::users::preflight,
    ),
    components(schemas(
        api::models::users::ProvisionPayload,
        api::models::users::ProvisionResponse,
        api::models::users::ErrorBody,
        api::models::users::Role,
    )),
    modifiers(&AdminKeyAddon),
    tags(
        (name = "users", description = "Admin user provisioning: auth identity creation followed by profile update"),
    ),
    info(
        title = "provctl Admin API",
        description = "Creates application users for the admin console. \
            Failures after the identity was created are reported with the identity's `userId`; \
            the identity is not rolled back.",
    ),
)]
pub struct ApiDoc;
