//! Authentication module: who is logged in and how they stay logged in.
//!
//! This module provides:
//! - `SessionManager`: the session state machine (restore, login, register,
//!   logout, invalidation) with event subscriptions
//! - `CredentialStore`: durable token storage, backed by a JSON file, the OS
//!   keychain, or memory
//! - `AuthService`: the server side of authentication, implemented over HTTP
//!   by `api::ApiClient`
//!
//! Tokens have no client-side expiry; a token is dead once the server
//! rejects it, at which point the session is cleared.

pub mod credentials;
pub mod error;
pub mod manager;
pub mod service;
pub mod session;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use credentials::{
    CredentialError, CredentialStore, FileCredentialStore, KeyringCredentialStore,
    MemoryCredentialStore,
};
pub use error::{AuthError, FieldErrors};
pub use manager::{SessionManager, Subscription, SubscriptionId};
pub use service::AuthService;
pub use session::{Session, SessionChange, SessionEvent, SessionStatus};
