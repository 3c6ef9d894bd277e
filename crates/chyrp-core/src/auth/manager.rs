//! The process-wide session state machine.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::credentials::{CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use super::session::{Session, SessionChange, SessionEvent, SessionStatus};
use super::validation::{validate_login, validate_registration};
use super::{AuthError, AuthService};
use crate::models::{AuthResponse, LoginCredentials, RegisterData, TokenPair, User};

pub type SubscriptionId = u64;

/// Receiving end of a session subscription.
///
/// Events stop arriving after `SessionManager::unsubscribe` or
/// `SessionManager::close`, at which point `recv` returns `None`.
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.receiver.try_recv().ok()
    }
}

/// Single source of truth for who is logged in.
///
/// One instance exists per client and is shared by `Arc`. Operations that
/// talk to the server (`restore`, `login`, `register`) are serialized, so a
/// login issued during startup waits for `restore` to settle. `logout` and
/// `close` advance the session epoch; an in-flight operation that started
/// under an older epoch is discarded instead of committed. `invalidate` only
/// drops the session a rejected token belongs to, so a login already on its
/// way to replace that session still lands.
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    auth: Arc<dyn AuthService>,
    state: RwLock<Session>,
    epoch: AtomicU64,
    closed: AtomicBool,
    operation: tokio::sync::Mutex<()>,
    subscribers: Mutex<Vec<(SubscriptionId, mpsc::UnboundedSender<SessionEvent>)>>,
    next_subscription: AtomicU64,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, auth: Arc<dyn AuthService>) -> Self {
        Self {
            store,
            auth,
            state: RwLock::new(Session::new()),
            epoch: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            operation: tokio::sync::Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current user, if logged in. Never touches storage or the network.
    pub fn current_identity(&self) -> Option<User> {
        self.read_state().user().cloned()
    }

    pub fn status(&self) -> SessionStatus {
        self.read_state().status()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_state().is_authenticated()
    }

    /// Bearer token to attach to outbound requests
    pub fn access_token(&self) -> Option<String> {
        self.read_state().access_token().map(str::to_string)
    }

    /// Copy of the whole session
    pub fn snapshot(&self) -> Session {
        self.read_state().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Recover the previous session from the credential store.
    ///
    /// Runs once; later calls return the current status untouched. Every
    /// failure resolves to `Unauthenticated` with both stored tokens removed.
    pub async fn restore(&self) -> SessionStatus {
        let _operation = self.operation.lock().await;

        let epoch = {
            let mut state = self.write_state();
            // A dropped restore future can leave `Restoring` behind
            let resumable = matches!(
                state.status(),
                SessionStatus::Uninitialized | SessionStatus::Restoring
            );
            if self.is_closed() || !resumable {
                debug!(status = ?state.status(), "Restore skipped");
                return state.status();
            }
            *state = Session::restoring();
            self.publish(&state, SessionChange::Restore);
            self.epoch.load(Ordering::SeqCst)
        };

        let tokens = match self.load_tokens() {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                debug!("No stored session");
                return self.settle_unauthenticated(epoch);
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stored credentials");
                return self.settle_unauthenticated(epoch);
            }
        };

        match self.auth.current_user(&tokens.access).await {
            Ok(user) => {
                let mut state = self.write_state();
                if !self.is_current(epoch) {
                    debug!("Restore superseded, discarding result");
                    return state.status();
                }
                info!(user_id = user.id, username = %user.username, "Session restored");
                *state = Session::authenticated(user, tokens);
                self.publish(&state, SessionChange::Restore);
                state.status()
            }
            Err(e) => {
                warn!(error = %e, "Stored session rejected");
                self.settle_unauthenticated(epoch)
            }
        }
    }

    /// Log in with a username and password.
    ///
    /// On failure nothing is written and the session is left as it was.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<User, AuthError> {
        validate_login(credentials)?;
        let _operation = self.operation.lock().await;
        let epoch = self.begin()?;

        info!(username = %credentials.identifier, "Logging in");
        let response = match self.auth.login(credentials).await {
            Ok(response) => response,
            Err(e) => {
                warn!(username = %credentials.identifier, error = %e, "Login failed");
                return Err(e);
            }
        };
        self.commit(epoch, response, SessionChange::Login)
    }

    /// Create an account and log in as it.
    ///
    /// The payload is validated locally first; a rejected form never reaches
    /// the server.
    pub async fn register(&self, data: &RegisterData) -> Result<User, AuthError> {
        validate_registration(data)?;
        let _operation = self.operation.lock().await;
        let epoch = self.begin()?;

        info!(username = %data.username, "Registering account");
        let response = match self.auth.register(data).await {
            Ok(response) => response,
            Err(e) => {
                warn!(username = %data.username, error = %e, "Registration failed");
                return Err(e);
            }
        };
        self.commit(epoch, response, SessionChange::Register)
    }

    /// Forget the current user and tokens. Idempotent.
    pub fn logout(&self) {
        let mut state = self.write_state();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.clear_store();

        if *state == Session::unauthenticated() {
            debug!("Logout on a logged out session");
            return;
        }
        if let Some(user) = state.user() {
            info!(user_id = user.id, "Logged out");
        }
        *state = Session::unauthenticated();
        self.publish(&state, SessionChange::Logout);
    }

    /// Drop the session because a server rejected `rejected_token`.
    ///
    /// Every authenticated call routes 401 responses here. A rejection of a
    /// token that is no longer the current one (the user logged in again in
    /// the meantime) is ignored. Returns whether the session was cleared.
    pub fn invalidate(&self, rejected_token: &str) -> bool {
        let mut state = self.write_state();
        if state.access_token() != Some(rejected_token) {
            debug!("Ignoring rejection of a token that is no longer current");
            return false;
        }
        self.clear_store();
        if let Some(user) = state.user() {
            warn!(user_id = user.id, "Access token rejected, session cleared");
        }
        *state = Session::unauthenticated();
        self.publish(&state, SessionChange::Invalidated);
        true
    }

    /// Tear down. Results of in-flight operations are discarded, subscribers
    /// are disconnected and further transitions are refused.
    pub fn close(&self) {
        let _state = self.write_state();
        self.closed.store(true, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.lock_subscribers().clear();
        debug!("Session manager closed");
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Register for session events
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.is_closed() {
            self.lock_subscribers().push((id, tx));
        }
        Subscription { id, receiver: rx }
    }

    /// Stop delivering events to a subscription. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn read_state(&self) -> RwLockReadGuard<'_, Session> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, Session> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribers(
        &self,
    ) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, mpsc::UnboundedSender<SessionEvent>)>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, epoch: u64) -> bool {
        !self.is_closed() && self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Epoch an operation runs under; fails once closed
    fn begin(&self) -> Result<u64, AuthError> {
        if self.is_closed() {
            return Err(AuthError::Closed);
        }
        Ok(self.epoch.load(Ordering::SeqCst))
    }

    /// Must be called with the state write lock held.
    fn publish(&self, session: &Session, change: SessionChange) {
        debug_assert!(session.is_consistent());
        let event = SessionEvent::new(session, change);
        self.lock_subscribers()
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    fn load_tokens(&self) -> Result<Option<TokenPair>, AuthError> {
        let access = self.store.get(ACCESS_TOKEN_KEY)?;
        let refresh = self.store.get(REFRESH_TOKEN_KEY)?;
        match (access, refresh) {
            (Some(access), Some(refresh)) => Ok(Some(TokenPair { access, refresh })),
            (None, None) => Ok(None),
            _ => {
                warn!("Found only one stored token, discarding it");
                Ok(None)
            }
        }
    }

    fn clear_store(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "Failed to remove stored credential");
            }
        }
    }

    fn write_tokens(&self, tokens: &TokenPair) -> Result<(), AuthError> {
        self.store.set(ACCESS_TOKEN_KEY, &tokens.access)?;
        self.store.set(REFRESH_TOKEN_KEY, &tokens.refresh)?;
        Ok(())
    }

    fn settle_unauthenticated(&self, epoch: u64) -> SessionStatus {
        let mut state = self.write_state();
        if !self.is_current(epoch) {
            debug!("Restore superseded, discarding result");
            return state.status();
        }
        self.clear_store();
        *state = Session::unauthenticated();
        self.publish(&state, SessionChange::Restore);
        state.status()
    }

    /// Persist and apply a successful login/register. Tokens land in the
    /// store and in memory together, or not at all.
    fn commit(
        &self,
        epoch: u64,
        response: AuthResponse,
        change: SessionChange,
    ) -> Result<User, AuthError> {
        let mut state = self.write_state();
        if self.is_closed() {
            return Err(AuthError::Closed);
        }
        if !self.is_current(epoch) {
            debug!(?change, "Session changed during request, discarding result");
            return Err(AuthError::Superseded);
        }

        let AuthResponse { user, tokens } = response;
        if let Err(e) = self.write_tokens(&tokens) {
            warn!(error = %e, "Failed to persist tokens");
            // Put the store back the way the current session expects it
            match state.tokens() {
                Some(previous) => {
                    if let Err(e) = self.write_tokens(previous) {
                        warn!(error = %e, "Failed to restore previous tokens");
                    }
                }
                None => self.clear_store(),
            }
            return Err(e);
        }

        info!(user_id = user.id, username = %user.username, ?change, "Authenticated");
        *state = Session::authenticated(user.clone(), tokens);
        self.publish(&state, change);
        Ok(user)
    }
}
