//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `PROVCTL_CONFIG`
//! environment variable. A missing file is not an error: every value has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `PROVCTL_` override YAML values
//! 3. **SUPABASE_URL / SUPABASE_SERVICE_ROLE_KEY** - The variables the hosted function runtime
//!    provides, mapped onto `supabase.url` and `supabase.service_role_key`
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `PROVCTL_SUPABASE__PROFILES_TABLE=user_profiles` sets the `supabase.profiles_table` field.
//!
//! ## Missing credentials
//!
//! Absent backend credentials do not stop the server from starting. The server logs the problem
//! once at startup and answers every provisioning request with a configuration error until it is
//! restarted with credentials. Use `--validate` to catch this in CI instead.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! PROVCTL_PORT=8080
//!
//! # Backend credentials
//! SUPABASE_URL="https://abcdefgh.supabase.co"
//! SUPABASE_SERVICE_ROLE_KEY="eyJhbGciOi..."
//!
//! # Require callers to present an admin key
//! PROVCTL_ADMIN_API_KEY="change-me"
//!
//! # Only classify provider errors by structured codes
//! PROVCTL_CLASSIFIER__MATCH_MESSAGES=false
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;
use crate::provisioning::ClassifierConfig;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "PROVCTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration (including backend credentials) and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Backend (identity service + profile table API) connection settings
    pub supabase: SupabaseConfig,
    /// How provider errors are classified
    pub classifier: ClassifierConfig,
    /// When set, callers must present this key as `Authorization: Bearer <key>` or `apikey: <key>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_api_key: Option<String>,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abcdefgh.supabase.co`
    pub url: Option<String>,
    /// Service-role key used for both the admin auth API and the table API
    #[serde(skip_serializing)]
    pub service_role_key: Option<String>,
    /// Table holding one profile row per auth identity
    pub profiles_table: String,
    /// Per-request timeout for backend calls. Unset means the HTTP client default.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

/// Everything needed to reach the backend, present only when fully configured.
#[derive(Clone)]
pub struct Credentials {
    pub url: Url,
    pub service_role_key: String,
    pub request_timeout: Option<Duration>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url.as_str())
            .field("service_role_key", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_role_key: None,
            profiles_table: "profiles".to_string(),
            request_timeout: None,
        }
    }
}

impl SupabaseConfig {
    /// Resolved credentials, or `None` when the URL or key is missing or empty.
    pub fn credentials(&self) -> Option<Credentials> {
        let url = self.url.as_deref().filter(|url| !url.is_empty())?;
        let service_role_key = self.service_role_key.as_deref().filter(|key| !key.is_empty())?;
        Some(Credentials {
            url: Url::parse(url).ok()?,
            service_role_key: service_role_key.to_string(),
            request_timeout: self.request_timeout,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            supabase: SupabaseConfig::default(),
            classifier: ClassifierConfig::default(),
            admin_api_key: None,
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency.
    ///
    /// Missing credentials are deliberately not an error here; see [`Config::require_credentials`].
    pub fn validate(&self) -> Result<(), Error> {
        if self.port == 0 {
            return Err(Error::Configuration {
                message: "port cannot be 0".to_string(),
            });
        }

        if self.supabase.profiles_table.trim().is_empty() {
            return Err(Error::Configuration {
                message: "supabase.profiles_table cannot be empty".to_string(),
            });
        }

        if let Some(url) = self.supabase.url.as_deref().filter(|url| !url.is_empty())
            && let Err(e) = Url::parse(url)
        {
            return Err(Error::Configuration {
                message: format!("supabase.url '{url}' is not a valid URL: {e}"),
            });
        }

        if self.supabase.request_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(Error::Configuration {
                message: "supabase.request_timeout must be positive. Remove it to use the client default."
                    .to_string(),
            });
        }

        if self.admin_api_key.as_deref().is_some_and(str::is_empty) {
            return Err(Error::Configuration {
                message: "admin_api_key cannot be empty. Remove it to disable caller authentication."
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Stricter check used by `--validate`: the server would start without credentials, but it
    /// would reject every request.
    pub fn require_credentials(&self) -> Result<Credentials, Error> {
        self.supabase.credentials().ok_or_else(|| Error::Configuration {
            message: "Missing Supabase credentials.".to_string(),
        })
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("PROVCTL_").ignore(&["config"]).split("__"))
            // Variables injected by the hosted function runtime
            .merge(Env::raw().only(&["SUPABASE_URL"]).map(|_| "supabase.url".into()))
            .merge(
                Env::raw()
                    .only(&["SUPABASE_SERVICE_ROLE_KEY"])
                    .map(|_| "supabase.service_role_key".into()),
            )
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
