//! HTTP access to the Chyrp server.
//!
//! [`ApiClient`] is the transport and implements the auth service.
//! [`ContentClient`] layers the blog endpoints over it.

pub mod client;
pub mod content;
pub mod error;

pub use client::ApiClient;
pub use content::ContentClient;
pub use error::ApiError;
