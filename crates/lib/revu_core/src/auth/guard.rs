//! Route guard for protected views.
//!
//! One [`RouteGuard`] exists per mount of a protected view. Its phase moves
//! `Checking → Authorized | Denied` once and stays there for the lifetime of
//! the mount. The verification latch is taken before the first await, so
//! re-renders during an in-flight check never start a second one.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::service::{AuthSessionService, Redirect};
use super::state::{AuthState, AuthStateStore};
use super::{AuthError, SESSION_EXPIRED_MESSAGE};
use crate::models::auth::User;
use crate::notify::Notifier;

/// What the guard needs from the session layer.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify_session(&self) -> Result<bool, AuthError>;

    async fn load_user(&self) -> Result<Option<User>, AuthError>;

    /// Remove whatever is left of a session that failed verification.
    fn discard_session(&self);
}

#[async_trait]
impl SessionVerifier for AuthSessionService {
    async fn verify_session(&self) -> Result<bool, AuthError> {
        Ok(self.is_session_valid())
    }

    async fn load_user(&self) -> Result<Option<User>, AuthError> {
        Ok(self.current_user())
    }

    fn discard_session(&self) {
        self.clear_session();
    }
}

/// Access decision for one mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    Checking,
    Authorized,
    Denied,
}

/// Progress of the mount's single verification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verification {
    NotStarted,
    InFlight,
    Settled,
}

/// What the protected view should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardView {
    /// Still checking; show a placeholder.
    Pending,
    /// Render the protected children.
    Render,
    /// Leave for the login page, remembering where we were going.
    Redirect(Redirect),
}

#[derive(Debug)]
struct GuardInner {
    phase: GuardPhase,
    verification: Verification,
    mounted: bool,
}

/// Per-mount access guard.
#[derive(Debug)]
pub struct RouteGuard {
    requested: String,
    login_path: String,
    inner: Mutex<GuardInner>,
}

impl RouteGuard {
    /// Mount a guard for `requested` (the location the user asked for).
    pub fn mount(requested: impl Into<String>, login_path: impl Into<String>) -> Self {
        Self {
            requested: requested.into(),
            login_path: login_path.into(),
            inner: Mutex::new(GuardInner {
                phase: GuardPhase::Checking,
                verification: Verification::NotStarted,
                mounted: true,
            }),
        }
    }

    pub fn phase(&self) -> GuardPhase {
        self.lock().phase
    }

    pub fn is_mounted(&self) -> bool {
        self.lock().mounted
    }

    /// Tear down the mount. Results of an in-flight check are discarded.
    pub fn unmount(&self) {
        self.lock().mounted = false;
    }

    pub fn view(&self) -> GuardView {
        self.view_for(self.phase())
    }

    /// Adopt `Authorized` when the store reports a signed-in user while the
    /// check is still pending. Never re-runs verification.
    pub fn observe(&self, state: &AuthState) {
        let mut inner = self.lock();
        if inner.mounted && inner.phase == GuardPhase::Checking && state.has_identity() {
            debug!(location = %self.requested, "guard adopted authenticated store state");
            inner.phase = GuardPhase::Authorized;
            inner.verification = Verification::Settled;
        }
    }

    /// Evaluate the guard. Call on every render; only the first call of the
    /// mount does any work.
    pub async fn render(
        &self,
        auth: &AuthStateStore,
        verifier: &dyn SessionVerifier,
        notifier: &dyn Notifier,
    ) -> GuardView {
        {
            let mut inner = self.lock();
            if !inner.mounted || inner.verification != Verification::NotStarted {
                return self.view_for(inner.phase);
            }
            if auth.snapshot().has_identity() {
                inner.phase = GuardPhase::Authorized;
                inner.verification = Verification::Settled;
                return GuardView::Render;
            }
            inner.verification = Verification::InFlight;
        }

        let mut updates = auth.subscribe();
        let outcome = tokio::select! {
            outcome = Self::check(verifier) => Some(outcome),
            () = signed_in_elsewhere(&mut updates) => None,
        };

        let (phase, user) = match outcome {
            None => (GuardPhase::Authorized, None),
            Some(Ok(Some(user))) if !user.token.trim().is_empty() => {
                (GuardPhase::Authorized, Some(user))
            }
            Some(Ok(_)) => (GuardPhase::Denied, None),
            Some(Err(e)) => {
                warn!(location = %self.requested, "session check failed: {e}");
                (GuardPhase::Denied, None)
            }
        };

        // Decide and settle under one lock. Only the settling call may
        // touch the session or notify.
        {
            let mut inner = self.lock();
            if !inner.mounted {
                debug!(location = %self.requested, "guard unmounted during check; result discarded");
                return GuardView::Pending;
            }
            if inner.phase != GuardPhase::Checking {
                return self.view_for(inner.phase);
            }
            inner.phase = phase;
            inner.verification = Verification::Settled;
        }

        match (phase, user) {
            (GuardPhase::Denied, _) => {
                verifier.discard_session();
                notifier.error(SESSION_EXPIRED_MESSAGE);
            }
            (_, Some(user)) => {
                auth.session_restored(user);
            }
            _ => {}
        }
        debug!(location = %self.requested, ?phase, "guard settled");
        self.view_for(phase)
    }

    async fn check(verifier: &dyn SessionVerifier) -> Result<Option<User>, AuthError> {
        if !verifier.verify_session().await? {
            return Ok(None);
        }
        verifier.load_user().await
    }

    fn view_for(&self, phase: GuardPhase) -> GuardView {
        match phase {
            GuardPhase::Checking => GuardView::Pending,
            GuardPhase::Authorized => GuardView::Render,
            GuardPhase::Denied => GuardView::Redirect(
                Redirect::to(self.login_path.clone()).with_from(self.requested.clone()),
            ),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Resolves once the store holds an authenticated user.
async fn signed_in_elsewhere(updates: &mut watch::Receiver<AuthState>) {
    loop {
        let signed_in = updates.borrow_and_update().has_identity();
        if signed_in {
            return;
        }
        if updates.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
