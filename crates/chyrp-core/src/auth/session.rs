use crate::models::{TokenPair, User};

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Created, restore not yet attempted
    Uninitialized,
    /// Recovering a previous session from the credential store
    Restoring,
    Authenticated,
    Unauthenticated,
}

impl SessionStatus {
    /// True once restore has finished one way or the other
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            SessionStatus::Authenticated | SessionStatus::Unauthenticated
        )
    }
}

/// Who is logged in, and with which tokens.
///
/// Fields are private so the only reachable shapes are the ones built by
/// the constructors below: a user and a token pair exist together exactly
/// when the status is `Authenticated`.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    status: SessionStatus,
    user: Option<User>,
    tokens: Option<TokenPair>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Uninitialized,
            user: None,
            tokens: None,
        }
    }

    pub(crate) fn restoring() -> Self {
        Self {
            status: SessionStatus::Restoring,
            user: None,
            tokens: None,
        }
    }

    pub(crate) fn authenticated(user: User, tokens: TokenPair) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            user: Some(user),
            tokens: Some(tokens),
        }
    }

    pub(crate) fn unauthenticated() -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            user: None,
            tokens: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Get the bearer token if logged in
    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access.as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.refresh.as_str())
    }

    pub fn tokens(&self) -> Option<&TokenPair> {
        self.tokens.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    /// Authenticated exactly when both the user and the tokens are present
    pub fn is_consistent(&self) -> bool {
        let complete = self.user.is_some() && self.tokens.is_some();
        let empty = self.user.is_none() && self.tokens.is_none();
        if self.is_authenticated() {
            complete
        } else {
            empty
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// What caused a session transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    Restore,
    Login,
    Register,
    Logout,
    /// A server rejected the access token
    Invalidated,
}

/// Published to subscribers after every transition
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub status: SessionStatus,
    pub user: Option<User>,
    pub change: SessionChange,
}

impl SessionEvent {
    pub(crate) fn new(session: &Session, change: SessionChange) -> Self {
        Self {
            status: session.status(),
            user: session.user().cloned(),
            change,
        }
    }
}
