//! Authentication module for managing the bearer token session.
//!
//! This module provides:
//! - `token`: payload decoding of compact bearer tokens (unverified)
//! - `store`: durable and session-scoped token slots, shared between contexts
//! - `expiry`: one-shot timers that end a session at token expiry
//! - `SessionController`: the session state machine built from the above
//! - `AuthService`: sign-in and profile flows over the API client

pub mod expiry;
pub mod service;
pub mod session;
pub mod store;
pub mod token;

pub use expiry::{ExpiryHandle, ExpiryScheduler};
pub use service::{AuthError, AuthService};
pub use session::{SessionController, SessionSnapshot, SessionStatus};
pub use store::{
    FileStore, KeyValueStore, KeyringStore, MemoryStore, SharedStorage, StorageBus, StorageError,
    TokenStore,
};
pub use token::Claims;
