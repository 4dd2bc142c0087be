//! Local caching module for offline conversions.
//!
//! This module provides the `CacheManager` for storing the last fetched
//! exchange rates. Cached rates are considered stale after 60 minutes but
//! remain usable when the API cannot be reached.

pub mod manager;

pub use manager::{CacheManager, CachedData};
