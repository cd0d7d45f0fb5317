//! # provctl: admin user provisioning
//!
//! `provctl` is a small HTTP service that an admin console calls to create application users. A
//! user is provisioned in two strictly ordered steps against a hosted backend:
//!
//! 1. an authentication identity is created through the identity service's admin API
//!    (unconfirmed, with the given email and password), then
//! 2. the profile row that the backend creates alongside every identity is updated with the
//!    user's full name, username, role and an `approved` status.
//!
//! Every outcome is reported as a single JSON response: `201 {message, userId}` on success, or an
//! `{error, details?}` body whose status reflects a classified failure. The service owns no state.
//!
//! ## Architecture
//!
//! The HTTP layer is built on [Axum](https://github.com/tokio-rs/axum). The backend is reached with
//! `reqwest` through two traits, [`backend::IdentityService`] and [`backend::ProfileStore`], so the
//! provisioning sequence in [`provisioning::UserProvisioner`] can be exercised against in-memory
//! fakes.
//!
//! ### Partial failures
//!
//! If the identity is created but the profile update fails, the identity is **not** rolled back.
//! The response says so explicitly and includes the new identity's id (`userId`) alongside the raw
//! provider error, so an operator can finish or clean up the user by hand.
//!
//! ### Missing configuration
//!
//! A server started without backend credentials still serves: pre-flight and health requests
//! succeed, and every provisioning request is answered with a configuration error.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use provctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = provctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     provctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod errors;
mod openapi;
pub mod provisioning;
pub mod telemetry;

#[cfg(test)]
mod test_utils;

use axum::{
    Json, Router,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use std::{any::Any, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    set_header::SetResponseHeaderLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, error, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    api::handlers::users::{create_user_admin, preflight},
    backend::{SupabaseAuthClient, SupabaseProfileStore},
    errors::Error,
    openapi::ApiDoc,
    provisioning::UserProvisioner,
};

/// Application state shared across all request handlers.
///
/// `provisioner` is `None` when backend credentials are missing; handlers turn that into a
/// configuration error per request.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .maybe_provisioner(provisioner)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub provisioner: Option<Arc<UserProvisioner>>,
}

impl AppState {
    /// Wire the Supabase-backed provisioner from configuration.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let provisioner = match config.supabase.credentials() {
            Some(credentials) => {
                let identity = SupabaseAuthClient::new(&credentials)?;
                let profiles = SupabaseProfileStore::new(&credentials, &config.supabase.profiles_table)?;
                Some(Arc::new(UserProvisioner::new(
                    Arc::new(identity),
                    Arc::new(profiles),
                    config.classifier.clone(),
                )))
            }
            None => {
                error!(
                    "CRITICAL: Missing SUPABASE_URL or SUPABASE_SERVICE_ROLE_KEY. \
                     Every provisioning request will be rejected until credentials are configured."
                );
                None
            }
        };

        Ok(Self::builder().config(config).maybe_provisioner(provisioner).build())
    }
}

/// Headers attached to every response so the admin console can call cross-origin.
fn cors_headers() -> [(header::HeaderName, HeaderValue); 3] {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("authorization, x-client-info, apikey, content-type"),
        ),
        (header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("POST, OPTIONS")),
    ]
}

/// Render a handler panic as the catch-all internal error.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = err.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = err.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic".to_string()
    };
    Error::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}

/// Wrap `router` in the middleware every endpoint shares.
///
/// Layers, outermost first: request tracing, CORS headers, panic catching. The CORS headers sit
/// outside the panic handler so that even a crashed request answers with them.
fn with_middleware(router: Router) -> Router {
    let [origin, allow_headers, allow_methods] = cors_headers();

    router.layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(SetResponseHeaderLayer::overriding(origin.0, origin.1))
            .layer(SetResponseHeaderLayer::overriding(allow_headers.0, allow_headers.1))
            .layer(SetResponseHeaderLayer::overriding(allow_methods.0, allow_methods.1))
            .layer(CatchPanicLayer::custom(handle_panic)),
    )
}

/// Build the application router with all endpoints and middleware.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> Router {
    let provisioning = post(create_user_admin).options(preflight);

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/create-user-admin", provisioning.clone())
        .route("/functions/v1/create-user-admin", provisioning)
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .with_state(state);

    with_middleware(router)
}

/// Main application struct that owns the router and configuration.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting provisioning service on {}", config.bind_address());

        let state = AppState::from_config(config.clone())?;
        let router = build_router(state);

        Ok(Self { router, config })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Provisioning service listening on http://{}", bind_addr);

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        telemetry::shutdown_telemetry();
        Ok(())
    }
}
