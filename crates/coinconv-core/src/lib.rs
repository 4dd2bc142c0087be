//! Core library for coinconv.
//!
//! This crate contains everything the front ends share:
//! - `auth`: bearer token session (decode, storage, expiry, controller)
//! - `api`: HTTP client for the coin-converter REST API
//! - `cache`: on-disk cache for fetched exchange rates
//! - `config`: user configuration
//! - `converter`: exchange rate arithmetic and formatting
//! - `models`: API data types

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod converter;
pub mod models;

#[cfg(test)]
pub(crate) mod test_util;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, AuthService, Claims, SessionController, SessionSnapshot, TokenStore};
pub use config::Config;
pub use converter::{Conversion, ConvertError, RateTable};
pub use models::{Currency, CurrencyCode, CurrencyType, User};
