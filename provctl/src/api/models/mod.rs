//! API request and response data models.
//!
//! These types define the public wire contract of the provisioning endpoint. They are kept
//! separate from the backend payloads in [`crate::backend`] so the two can evolve independently.

pub mod users;
