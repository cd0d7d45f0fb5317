//! HTTP request handlers.
//!
//! - [`users`]: the admin provisioning endpoint and its CORS pre-flight

pub mod users;
