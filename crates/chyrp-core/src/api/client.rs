//! HTTP client for the Chyrp REST API.
//!
//! `ApiClient` owns the connection pool, the base URL and the response
//! handling shared by every endpoint. It implements `AuthService` for the
//! session manager; content endpoints live in `ContentClient`.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::{AuthError, AuthService};
use crate::config::Config;
use crate::models::{AuthResponse, LoginCredentials, RegisterData, User};

// ============================================================================
// Constants
// ============================================================================

/// Default HTTP request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) GET requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

pub(crate) const LOGIN_PATH: &str = "/auth/login/";
pub(crate) const REGISTER_PATH: &str = "/auth/register/";
pub(crate) const ME_PATH: &str = "/auth/me/";

/// API client for a Chyrp server.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for the API rooted at `base_url` (e.g. `https://blog.example.com/api`)
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Url::parse(base_url).with_context(|| format!("Invalid API base URL: {}", base_url))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::with_timeout(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// GET with bounded retry on rate limiting
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            debug!(path, "GET");
            let response = self
                .request(Method::GET, path, token)
                .query(query)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response.json().await?),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(path, retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    /// POST a JSON body. Never retried: the server may already have acted on it.
    pub(crate) async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<T, ApiError> {
        debug!(path, "POST");
        let response = self
            .request(Method::POST, path, token)
            .json(body)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        Ok(response.json().await?)
    }

    /// POST without a body
    pub(crate) async fn post_empty<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, ApiError> {
        debug!(path, "POST");
        let response = self.request(Method::POST, path, token).send().await?;
        let response = Self::check_response(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl AuthService for ApiClient {
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse, AuthError> {
        self.post(LOGIN_PATH, None, credentials)
            .await
            .map_err(AuthError::from_login)
    }

    async fn register(&self, data: &RegisterData) -> Result<AuthResponse, AuthError> {
        self.post(REGISTER_PATH, None, data)
            .await
            .map_err(AuthError::from_register)
    }

    async fn current_user(&self, access_token: &str) -> Result<User, AuthError> {
        self.get(ME_PATH, Some(access_token), &[])
            .await
            .map_err(AuthError::from_authenticated_call)
    }
}
