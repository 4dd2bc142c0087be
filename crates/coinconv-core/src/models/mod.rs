//! Data models for the coin-converter API.
//!
//! - `User`: the signed-in account's profile
//! - `Currency`, `CurrencyCode`, `CurrencyType`: supported currencies

pub mod currency;
pub mod user;

pub use currency::{Currency, CurrencyCode, CurrencyType};
pub use user::User;
