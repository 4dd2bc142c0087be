//! REST API client module for the coin-converter service.
//!
//! This module provides the `ApiClient` for signing in, fetching the
//! signed-in user's profile and the latest exchange rates.
//!
//! Authenticated requests carry the session's bearer token; an
//! authorization failure ends the session.

pub mod client;
pub mod error;

pub use client::{ApiClient, LoginResponse};
pub use error::ApiError;
