use async_trait::async_trait;

use super::AuthError;
use crate::models::{AuthResponse, LoginCredentials, RegisterData, User};

/// Remote side of authentication: issues tokens and resolves them to users.
///
/// `ApiClient` implements this over HTTP. Implementations report failures
/// already classified as `AuthError`; the session manager decides what a
/// failure does to the session.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// `POST /auth/login/`
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse, AuthError>;

    /// `POST /auth/register/`
    async fn register(&self, data: &RegisterData) -> Result<AuthResponse, AuthError>;

    /// `GET /auth/me/` with the given bearer token
    async fn current_user(&self, access_token: &str) -> Result<User, AuthError>;
}
