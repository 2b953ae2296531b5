//! Observable authentication state for the UI.
//!
//! ```text
//! Idle ──begin_login──► LoggingIn ──login_succeeded──► Authenticated
//!                            │                             │
//!                            └──login_failed──► Failed     └──begin_logout──► LoggingOut
//!                                                                                │
//! Idle ◄──────────────────────────logout_completed───────────────────────────────┘
//! ```
//!
//! The flags are derived from the phase on every transition, so
//! `is_loading` and `is_authenticated` are never both set.

use tokio::sync::watch;
use tracing::{debug, warn};

use super::service::{AuthSessionService, Redirect};
use super::{AuthError, SESSION_EXPIRED_MESSAGE};
use crate::models::auth::{Credentials, User};

/// Where the authentication flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthPhase {
    #[default]
    Idle,
    LoggingIn,
    Authenticated,
    Failed,
    LoggingOut,
}

/// UI-visible authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthState {
    pub phase: AuthPhase,
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl AuthState {
    fn enter(&mut self, phase: AuthPhase) {
        self.phase = phase;
        self.is_loading = matches!(phase, AuthPhase::LoggingIn | AuthPhase::LoggingOut);
        self.is_authenticated = phase == AuthPhase::Authenticated;
    }

    /// Authenticated with an identity attached.
    pub fn has_identity(&self) -> bool {
        self.is_authenticated && self.user.is_some()
    }
}

/// Global, observable container for [`AuthState`].
#[derive(Debug)]
pub struct AuthStateStore {
    state: watch::Sender<AuthState>,
}

impl AuthStateStore {
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(AuthState::default()),
        }
    }

    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Start a login. The current user is left in place until the outcome is known.
    pub fn begin_login(&self) {
        self.state.send_modify(|s| {
            s.enter(AuthPhase::LoggingIn);
            s.error = None;
        });
    }

    /// Install the logged-in user. Returns `false` (and records a failure)
    /// when the user carries no token.
    pub fn login_succeeded(&self, user: User) -> bool {
        if user.token.trim().is_empty() {
            warn!(user_id = user.id, "login result without token treated as failure");
            self.login_failed("Login failed: no session token received");
            return false;
        }
        self.authenticate(user);
        true
    }

    pub fn login_failed(&self, message: impl Into<String>) {
        let message = message.into();
        self.state.send_modify(|s| {
            s.enter(AuthPhase::Failed);
            s.user = None;
            s.error = Some(message);
        });
    }

    /// Install a refreshed user. Same token guard as login.
    pub fn refresh_succeeded(&self, user: User) -> bool {
        if user.token.trim().is_empty() {
            warn!(user_id = user.id, "refresh result without token treated as failure");
            self.refresh_failed("Session refresh returned no token");
            return false;
        }
        self.authenticate(user);
        true
    }

    /// Drop authentication so callers stop retrying against a dead identity.
    pub fn refresh_failed(&self, message: impl Into<String>) {
        let message = message.into();
        self.state.send_modify(|s| {
            s.enter(AuthPhase::Failed);
            s.user = None;
            s.error = Some(message);
        });
    }

    /// Hydrate from a persisted session (bootstrap or route guard).
    pub fn session_restored(&self, user: User) -> bool {
        if user.token.trim().is_empty() {
            warn!(user_id = user.id, "restored session without token ignored");
            return false;
        }
        self.authenticate(user);
        true
    }

    /// Replace the user wholesale after a profile edit.
    pub fn profile_updated(&self, user: User) -> bool {
        if user.token.trim().is_empty() {
            warn!(user_id = user.id, "profile update without token ignored");
            return false;
        }
        self.state.send_if_modified(|s| {
            if s.phase != AuthPhase::Authenticated {
                return false;
            }
            s.user = Some(user);
            true
        })
    }

    pub fn begin_logout(&self) {
        self.state.send_modify(|s| s.enter(AuthPhase::LoggingOut));
    }

    pub fn logout_completed(&self) {
        self.state.send_modify(|s| {
            s.enter(AuthPhase::Idle);
            s.user = None;
            s.error = None;
        });
    }

    fn authenticate(&self, user: User) {
        debug!(user_id = user.id, "auth state authenticated");
        self.state.send_modify(|s| {
            s.enter(AuthPhase::Authenticated);
            s.user = Some(user);
            s.error = None;
        });
    }
}

impl Default for AuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Flows driving the store and the session service together
// ---------------------------------------------------------------------------

/// Log in and reflect the outcome in the store.
///
/// Callers must not resubmit while a login is in flight.
pub async fn login(
    store: &AuthStateStore,
    service: &AuthSessionService,
    credentials: &Credentials,
) -> Result<User, AuthError> {
    store.begin_login();
    match service.login(credentials).await {
        Ok(user) => {
            if store.login_succeeded(user.clone()) {
                Ok(user)
            } else {
                Err(AuthError::MalformedToken)
            }
        }
        Err(e) => {
            store.login_failed(e.to_string());
            Err(e)
        }
    }
}

/// Log out locally; the returned redirect is for the UI to follow.
pub fn logout(store: &AuthStateStore, service: &AuthSessionService) -> Redirect {
    store.begin_logout();
    let redirect = service.logout();
    store.logout_completed();
    redirect
}

/// Periodic refresh: renew the token when due and update the store.
pub async fn refresh(store: &AuthStateStore, service: &AuthSessionService) -> bool {
    if service.check_and_refresh_token().await {
        if let Some(user) = service.current_user() {
            return store.refresh_succeeded(user);
        }
    }
    store.refresh_failed(SESSION_EXPIRED_MESSAGE);
    false
}

/// Derive the initial state from the persisted session at startup.
pub fn bootstrap(store: &AuthStateStore, service: &AuthSessionService) -> bool {
    match service.current_user() {
        Some(user) => store.session_restored(user),
        None => false,
    }
}

/// Bring the store in line with shared storage after another tab changed it.
pub fn reconcile(store: &AuthStateStore, service: &AuthSessionService) {
    let state = store.snapshot();
    match service.current_user() {
        Some(user) if state.user.as_ref() != Some(&user) => {
            store.session_restored(user);
        }
        Some(_) => {}
        None if state.is_authenticated => store.logout_completed(),
        None => {}
    }
}
