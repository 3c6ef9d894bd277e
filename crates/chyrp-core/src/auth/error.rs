use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use super::credentials::CredentialError;
use crate::api::ApiError;

/// Field name the server uses for errors that are not tied to one field
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Field name the server uses for a single top-level error message
pub const DETAIL: &str = "detail";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    ValidationFailed(FieldErrors),

    #[error("Unable to connect to server: {0}")]
    NetworkUnavailable(String),

    #[error("Session expired. Please log in again.")]
    TokenExpired,

    #[error("Session is no longer valid. Please log in again.")]
    TokenInvalid,

    #[error("Server error: {0}")]
    Service(String),

    #[error("Failed to persist credentials: {0}")]
    Storage(#[from] CredentialError),

    #[error("Session changed while the request was in flight")]
    Superseded,

    #[error("Session manager has been shut down")]
    Closed,
}

impl AuthError {
    /// True for errors that mean the presented token is no longer accepted
    pub fn is_token_rejection(&self) -> bool {
        matches!(self, AuthError::TokenExpired | AuthError::TokenInvalid)
    }

    /// Map a transport error from an endpoint that takes a bearer token
    pub fn from_authenticated_call(err: ApiError) -> Self {
        match err {
            ApiError::TokenExpired => AuthError::TokenExpired,
            ApiError::Unauthorized => AuthError::TokenInvalid,
            other => Self::from_transport(other),
        }
    }

    /// Map a transport error from the login endpoint
    pub fn from_login(err: ApiError) -> Self {
        match err {
            ApiError::BadRequest(body) => {
                let errors = FieldErrors::from_body(&body);
                if errors.is_general() {
                    AuthError::InvalidCredentials(errors.message())
                } else {
                    AuthError::ValidationFailed(errors)
                }
            }
            ApiError::Unauthorized | ApiError::TokenExpired => {
                AuthError::InvalidCredentials("Invalid username or password".to_string())
            }
            ApiError::AccessDenied(body) => {
                AuthError::InvalidCredentials(FieldErrors::from_body(&body).message())
            }
            other => Self::from_transport(other),
        }
    }

    /// Map a transport error from the registration endpoint
    pub fn from_register(err: ApiError) -> Self {
        match err {
            ApiError::BadRequest(body) => AuthError::ValidationFailed(FieldErrors::from_body(&body)),
            other => Self::from_transport(other),
        }
    }

    fn from_transport(err: ApiError) -> Self {
        match err {
            ApiError::NetworkError(e) if e.is_decode() => AuthError::Service(e.to_string()),
            ApiError::NetworkError(e) => AuthError::NetworkUnavailable(e.to_string()),
            ApiError::TokenExpired => AuthError::TokenExpired,
            ApiError::Unauthorized => AuthError::TokenInvalid,
            ApiError::BadRequest(body) => AuthError::ValidationFailed(FieldErrors::from_body(&body)),
            other => AuthError::Service(other.to_string()),
        }
    }
}

/// Field-level validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// True when no message is tied to a specific form field
    pub fn is_general(&self) -> bool {
        self.fields
            .keys()
            .all(|k| k == DETAIL || k == NON_FIELD_ERRORS)
    }

    /// Parse a validation error body.
    ///
    /// Accepts `{"detail": "..."}`, `{"field": ["msg", ...], ...}`, a bare
    /// string, or a bare list. Anything unparseable becomes a single
    /// non-field message.
    pub fn from_body(body: &str) -> Self {
        let mut errors = Self::new();
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => {
                for (field, value) in map {
                    for message in Self::messages(&value) {
                        errors.add(&field, message);
                    }
                }
            }
            Ok(value @ (Value::String(_) | Value::Array(_))) => {
                for message in Self::messages(&value) {
                    errors.add(NON_FIELD_ERRORS, message);
                }
            }
            _ => {
                let body = body.trim();
                if !body.is_empty() {
                    errors.add(NON_FIELD_ERRORS, body);
                }
            }
        }
        errors
    }

    fn messages(value: &Value) -> Vec<String> {
        match value {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items.iter().flat_map(Self::messages).collect(),
            Value::Object(map) => map.values().flat_map(Self::messages).collect(),
            Value::Null => Vec::new(),
            other => vec![other.to_string()],
        }
    }

    /// Single display line: `detail`, else the first non-field error,
    /// else every field message joined.
    pub fn message(&self) -> String {
        if let Some(detail) = self.get(DETAIL).first() {
            return detail.clone();
        }
        if let Some(first) = self.get(NON_FIELD_ERRORS).first() {
            return first.clone();
        }
        let joined: Vec<&str> = self
            .fields
            .values()
            .flatten()
            .map(String::as_str)
            .collect();
        if joined.is_empty() {
            "Request was rejected".to_string()
        } else {
            joined.join(", ")
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
