//! In-process stand-ins for the credential store and the auth server.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::credentials::{CredentialError, CredentialStore, MemoryCredentialStore};
use super::{AuthError, AuthService, FieldErrors};
use crate::models::{AuthResponse, LoginCredentials, RegisterData, TokenPair, User};

pub(crate) fn user(id: i64, username: &str) -> User {
    User {
        id,
        username: username.to_string(),
        email: None,
        first_name: None,
        last_name: None,
        bio: None,
        avatar: None,
        website: None,
        location: None,
        birth_date: None,
        is_verified: false,
        date_joined: None,
        last_login: None,
    }
}

#[derive(Default)]
pub(crate) struct FakeAuthService {
    accounts: Mutex<HashMap<String, (String, User)>>,
    sessions: Mutex<HashMap<String, User>>,
    calls: Mutex<Vec<&'static str>>,
    fixed_tokens: Mutex<Option<TokenPair>>,
    me_gate: Mutex<Option<Arc<Notify>>>,
    login_gate: Mutex<Option<Arc<Notify>>>,
    offline: AtomicBool,
    issued: AtomicU64,
}

impl FakeAuthService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, username: &str, password: &str) -> Self {
        let id = self.accounts.lock().unwrap().len() as i64 + 1;
        self.accounts
            .lock()
            .unwrap()
            .insert(username.to_string(), (password.to_string(), user(id, username)));
        self
    }

    /// Hand out these tokens instead of generated ones
    pub fn with_tokens(self, access: &str, refresh: &str) -> Self {
        *self.fixed_tokens.lock().unwrap() = Some(TokenPair::new(access, refresh));
        self
    }

    /// Make `token` resolve to `user` on `/auth/me/`
    pub fn accept_token(&self, token: &str, user: User) {
        self.sessions.lock().unwrap().insert(token.to_string(), user);
    }

    pub fn revoke_all(&self) {
        self.sessions.lock().unwrap().clear();
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Hold `/auth/me/` until the returned notify fires
    pub fn gate_current_user(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.me_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold login/register until the returned notify fires
    pub fn gate_login(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.login_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.calls().iter().filter(|c| **c == endpoint).count()
    }

    fn record(&self, endpoint: &'static str) {
        self.calls.lock().unwrap().push(endpoint);
    }

    fn check_network(&self) -> Result<(), AuthError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AuthError::NetworkUnavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn issue(&self, user: User) -> AuthResponse {
        let tokens = self.fixed_tokens.lock().unwrap().clone().unwrap_or_else(|| {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            TokenPair::new(format!("access-{}", n), format!("refresh-{}", n))
        });
        self.accept_token(&tokens.access, user.clone());
        AuthResponse { user, tokens }
    }

    async fn wait(gate: &Mutex<Option<Arc<Notify>>>) {
        let gate = gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl AuthService for FakeAuthService {
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse, AuthError> {
        self.record("login");
        Self::wait(&self.login_gate).await;
        self.check_network()?;
        let account = self.accounts.lock().unwrap().get(&credentials.identifier).cloned();
        match account {
            Some((password, user)) if password == credentials.secret => Ok(self.issue(user)),
            _ => Err(AuthError::InvalidCredentials("Invalid credentials.".to_string())),
        }
    }

    async fn register(&self, data: &RegisterData) -> Result<AuthResponse, AuthError> {
        self.record("register");
        Self::wait(&self.login_gate).await;
        self.check_network()?;
        let account = {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(&data.username) {
                let mut errors = FieldErrors::new();
                errors.add("username", "A user with that username already exists.");
                return Err(AuthError::ValidationFailed(errors));
            }
            let account = user(accounts.len() as i64 + 1, &data.username);
            accounts.insert(data.username.clone(), (data.password.clone(), account.clone()));
            account
        };
        Ok(self.issue(account))
    }

    async fn current_user(&self, access_token: &str) -> Result<User, AuthError> {
        self.record("me");
        Self::wait(&self.me_gate).await;
        self.check_network()?;
        self.sessions
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .ok_or(AuthError::TokenInvalid)
    }
}

/// Memory store whose writes to selected keys fail
#[derive(Default)]
pub(crate) struct FlakyStore {
    inner: MemoryCredentialStore,
    failing: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn fail_writes_to(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }
}

impl CredentialStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        if self.failing.lock().unwrap().contains(key) {
            return Err(std::io::Error::other("disk full").into());
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), CredentialError> {
        self.inner.remove(key)
    }
}
