//! Core library for the Chyrp blogging client.
//!
//! The [`auth::SessionManager`] owns who is logged in. Everything that talks
//! to the server on a user's behalf borrows its bearer token and reports
//! token rejections back to it.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ContentClient};
pub use auth::{AuthError, SessionManager, SessionStatus};
pub use config::Config;
