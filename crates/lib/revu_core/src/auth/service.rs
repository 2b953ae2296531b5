//! Authentication session service.
//!
//! Login, logout, identity lookup, validity checks and refresh over the
//! persisted session, with a [`SessionCache`] in front of storage. This is
//! the only component that writes session keys.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::AuthError;
use super::cache::SessionCache;
use super::token_policy;
use super::transport::{AuthTransport, LoginGrant};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::models::auth::{Credentials, DeviceInfo, DeviceSession, SessionRecord, User};
use crate::storage::keys::{
    CSRF_TOKEN, CURRENT_SESSION, LOGIN_TIMESTAMP, REFRESH_TOKEN, SESSION_KEYS, TOKEN, USER,
};
use crate::storage::{PersistentStore, StorageArea, StoreChange, StoreError};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Values a login or refresh overwrites, kept for rollback.
struct SavedSession {
    areas: Vec<(StorageArea, Vec<(&'static str, Option<String>)>)>,
}

/// Something the UI layer should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn(User),
    /// The session was cleared; the UI should follow the redirect.
    LoggedOut(Redirect),
    Refreshed,
    /// An expired session was found and removed.
    Expired,
    /// Another tab changed the shared session; re-read before trusting state.
    StorageChanged,
}

/// Navigation the UI should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    /// Location to return to after logging in.
    pub from: Option<String>,
}

impl Redirect {
    pub fn to(path: impl Into<String>) -> Self {
        Self {
            to: path.into(),
            from: None,
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

/// Snapshot of the session for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub valid: bool,
    pub user: Option<User>,
    pub issued_at_ms: Option<i64>,
    pub remaining_ms: Option<i64>,
    pub needs_refresh: bool,
}

/// Orchestrates the client-side session.
pub struct AuthSessionService {
    store: Arc<dyn PersistentStore>,
    transport: Arc<dyn AuthTransport>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    cache: Mutex<SessionCache>,
    events: broadcast::Sender<SessionEvent>,
}

impl AuthSessionService {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        transport: Arc<dyn AuthTransport>,
        config: SessionConfig,
    ) -> Self {
        Self::with_clock(store, transport, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        store: Arc<dyn PersistentStore>,
        transport: Arc<dyn AuthTransport>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            cache: Mutex::new(SessionCache::new(config.cache_ttl_ms)),
            events: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
            store,
            transport,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Login / logout
    // -----------------------------------------------------------------------

    /// Authenticate against the remote API and persist the new session.
    ///
    /// Nothing is written when the call fails, so an existing session
    /// survives a failed re-login.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, AuthError> {
        if !credentials.is_complete() {
            return Err(AuthError::ValidationError(
                "Username and password are required".into(),
            ));
        }

        let grant = self.transport.login(credentials).await.map_err(|e| {
            warn!(username = %credentials.username, "login failed: {e}");
            AuthError::from(e)
        })?;

        if grant.user.token.trim().is_empty() {
            warn!(username = %credentials.username, "login response carried no token");
            return Err(AuthError::MalformedToken);
        }

        let now = self.clock.now_ms();
        if let Err(e) = self.persist_login(&grant, now) {
            warn!("failed to persist session: {e}");
            self.cache().invalidate();
            return Err(e);
        }
        self.cache().write(true, Some(grant.user.clone()), now);

        info!(user_id = grant.user.id, username = %grant.user.username, "login succeeded");
        self.emit(SessionEvent::LoggedIn(grant.user.clone()));
        Ok(grant.user)
    }

    /// Write the cookie, the tab copy and the durable batch.
    ///
    /// On failure every touched key is put back to its previous value, so
    /// the store holds either the new session or the old one.
    fn persist_login(&self, grant: &LoginGrant, now: i64) -> Result<(), AuthError> {
        let user_json = serde_json::to_string(&grant.user)
            .map_err(|e| AuthError::Unexpected(format!("serialize user: {e}")))?;

        let mut entries = vec![
            (TOKEN, grant.user.token.clone()),
            (LOGIN_TIMESTAMP, now.to_string()),
            (USER, user_json.clone()),
        ];
        let mut stale = Vec::new();
        match &grant.refresh_token {
            Some(refresh) => entries.push((REFRESH_TOKEN, refresh.clone())),
            None => stale.push(REFRESH_TOKEN),
        }
        match &grant.csrf_token {
            Some(csrf) => entries.push((CSRF_TOKEN, csrf.clone())),
            None => stale.push(CSRF_TOKEN),
        }

        let saved = self.save_session();
        let written = self
            .write_cookie(grant.cookie_token.as_deref())
            .and_then(|()| self.store.set(StorageArea::Ephemeral, USER, &user_json))
            .and_then(|()| self.store.set_many(StorageArea::Durable, &entries))
            .and_then(|()| {
                if stale.is_empty() {
                    Ok(())
                } else {
                    self.store.remove_many(StorageArea::Durable, &stale)
                }
            });
        if let Err(e) = written {
            self.restore_session(&saved);
            return Err(e.into());
        }
        Ok(())
    }

    /// Clear the session and tell the UI where to go.
    ///
    /// Other tabs see the removal through the store's change channel.
    pub fn logout(&self) -> Redirect {
        self.clear_session();
        info!("logged out");
        let redirect = Redirect::to(self.config.login_path.clone());
        self.emit(SessionEvent::LoggedOut(redirect.clone()));
        redirect
    }

    /// Remove every session key and invalidate the cache.
    pub fn clear_session(&self) {
        if let Err(e) = self.store.remove_many(StorageArea::Durable, &SESSION_KEYS) {
            warn!("failed to clear durable session keys: {e}");
        }
        if let Err(e) = self.store.remove(StorageArea::Ephemeral, USER) {
            warn!("failed to clear tab session data: {e}");
        }
        if let Err(e) = self.store.remove(StorageArea::Cookie, TOKEN) {
            warn!("failed to clear token cookie: {e}");
        }
        self.cache().invalidate();
    }

    // -----------------------------------------------------------------------
    // Identity and validity
    // -----------------------------------------------------------------------

    /// The signed-in user, or `None` when there is no valid session.
    pub fn current_user(&self) -> Option<User> {
        let now = self.clock.now_ms();
        let cached = self.cache().read(now).cloned();

        let checked_at = match cached {
            Some(hit) if !hit.is_valid => return None,
            Some(hit) => match hit.user {
                Some(user) => return Some(user),
                None => hit.last_checked_ms,
            },
            None => {
                if !self.is_session_valid() {
                    return None;
                }
                now
            }
        };

        match self.load_user() {
            Some(user) => {
                self.cache().write(true, Some(user.clone()), checked_at);
                Some(user)
            }
            None => {
                self.cache().write(false, None, now);
                None
            }
        }
    }

    /// Whether a live session exists. Expired sessions are removed on sight.
    pub fn is_session_valid(&self) -> bool {
        let now = self.clock.now_ms();
        let cached = self.cache().read(now).map(|hit| hit.is_valid);
        if let Some(is_valid) = cached {
            return is_valid;
        }

        let is_valid = self.compute_validity(now);
        self.cache().write(is_valid, None, now);
        is_valid
    }

    fn compute_validity(&self, now: i64) -> bool {
        let token = self.read_key(StorageArea::Durable, TOKEN);
        let issued_at = self.issued_at();

        let (token, issued_at) = match (token, issued_at) {
            (Some(token), Some(issued_at)) if !token.is_empty() => (token, issued_at),
            (None, None) => return false,
            _ => {
                debug!("incomplete session record; clearing");
                self.clear_session();
                return false;
            }
        };

        if !token_policy::is_within_lifetime(issued_at, now, self.config.session_lifetime_ms) {
            info!(issued_at, "session expired; clearing");
            self.clear_session();
            self.emit(SessionEvent::Expired);
            return false;
        }

        if let Some(cookie) = self.read_key(StorageArea::Cookie, TOKEN) {
            if !token_policy::is_well_formed(&cookie) || !token_policy::is_unexpired(&cookie, now)
            {
                debug!("cookie token rejected");
                return false;
            }
        }

        debug!(token_len = token.len(), "session valid");
        true
    }

    /// Read the user snapshot: tab copy first, then durable storage.
    fn load_user(&self) -> Option<User> {
        if let Some(raw) = self.read_key(StorageArea::Ephemeral, USER) {
            match serde_json::from_str::<User>(&raw) {
                Ok(user) => return Some(user),
                Err(e) => {
                    debug!("discarding corrupt tab user copy: {e}");
                    let _ = self.store.remove(StorageArea::Ephemeral, USER);
                }
            }
        }

        let Some(raw) = self.read_key(StorageArea::Durable, USER) else {
            return self.reconstruct_identity();
        };

        match serde_json::from_str::<User>(&raw) {
            Ok(user) => {
                if let Err(e) = self.store.set(StorageArea::Ephemeral, USER, &raw) {
                    debug!("could not cache user in tab storage: {e}");
                }
                Some(user)
            }
            Err(e) => {
                warn!("corrupt user snapshot; clearing session: {e}");
                self.clear_session();
                None
            }
        }
    }

    /// Identity for a valid token with no snapshot. Fails closed unless
    /// reconstruction from claims is enabled.
    fn reconstruct_identity(&self) -> Option<User> {
        let token = self.read_key(StorageArea::Durable, TOKEN)?;
        let claims = if self.config.reconstruct_identity {
            token_policy::decode_claims(&token)
        } else {
            None
        };

        let Some(claims) = claims else {
            warn!("{}; clearing session without user snapshot", AuthError::SessionNotFound);
            self.clear_session();
            return None;
        };

        info!(sub = %claims.sub, "reconstructed identity from token claims");
        Some(User {
            id: claims.sub.parse().unwrap_or_default(),
            username: claims.sub,
            token,
            ..User::default()
        })
    }

    /// Current state of the session for status displays.
    pub fn session_status(&self) -> SessionStatus {
        let now = self.clock.now_ms();
        let user = self.current_user();
        let issued_at = self.persisted_session().map(|record| record.issued_at_ms);
        let lifetime = self.config.session_lifetime_ms;
        SessionStatus {
            valid: user.is_some(),
            user,
            issued_at_ms: issued_at,
            remaining_ms: issued_at
                .map(|issued| token_policy::remaining_lifetime_ms(issued, now, lifetime)),
            needs_refresh: issued_at.is_some_and(|issued| {
                token_policy::needs_refresh(
                    issued,
                    now,
                    lifetime,
                    self.config.refresh_threshold_ms,
                )
            }),
        }
    }

    /// The session as stored, without validity checks or side effects.
    pub fn persisted_session(&self) -> Option<SessionRecord> {
        let token = self.read_key(StorageArea::Durable, TOKEN)?;
        let issued_at_ms = self.issued_at()?;
        let user = self
            .read_key(StorageArea::Durable, USER)
            .and_then(|raw| serde_json::from_str::<User>(&raw).ok());
        Some(SessionRecord {
            token,
            issued_at_ms,
            user,
        })
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    /// Exchange the stored refresh credential for a new token.
    ///
    /// Returns `false` without touching the session when the exchange or
    /// any write fails. The grant's cookie replaces the stored one, and a
    /// grant without a cookie removes it, as login does.
    pub async fn refresh_token(&self) -> bool {
        let Some(refresh) = self.read_key(StorageArea::Durable, REFRESH_TOKEN) else {
            debug!("no refresh credential stored");
            return false;
        };

        let grant = match self.transport.refresh(&refresh).await {
            Ok(grant) if !grant.token.trim().is_empty() => grant,
            Ok(_) => {
                warn!("refresh response carried no token");
                return false;
            }
            Err(e) => {
                warn!("token refresh failed: {e}");
                return false;
            }
        };

        let now = self.clock.now_ms();
        let user = self
            .read_key(StorageArea::Durable, USER)
            .and_then(|raw| serde_json::from_str::<User>(&raw).ok())
            .map(|user| User {
                token: grant.token.clone(),
                ..user
            });

        let mut entries = vec![
            (TOKEN, grant.token.clone()),
            (LOGIN_TIMESTAMP, now.to_string()),
        ];
        if let Some(rotated) = &grant.refresh_token {
            entries.push((REFRESH_TOKEN, rotated.clone()));
        }
        let user_json = user.as_ref().and_then(|u| serde_json::to_string(u).ok());
        if let Some(json) = &user_json {
            entries.push((USER, json.clone()));
        }

        let saved = self.save_session();
        let written = self
            .write_cookie(grant.cookie_token.as_deref())
            .and_then(|()| match &user_json {
                Some(json) => self.store.set(StorageArea::Ephemeral, USER, json),
                None => Ok(()),
            })
            .and_then(|()| self.store.set_many(StorageArea::Durable, &entries));
        if let Err(e) = written {
            warn!("failed to persist refreshed token: {e}");
            self.restore_session(&saved);
            self.cache().invalidate();
            return false;
        }

        let is_valid = self.compute_validity(now);
        self.cache().write(is_valid, user.filter(|_| is_valid), now);
        if !is_valid {
            warn!("refreshed session failed validation");
            return false;
        }

        info!("session token refreshed");
        self.emit(SessionEvent::Refreshed);
        true
    }

    /// Refresh when inside the refresh window; otherwise report whether the
    /// session is still within its lifetime. Entry point for polling.
    pub async fn check_and_refresh_token(&self) -> bool {
        let Some(issued_at) = self.issued_at() else {
            return false;
        };
        let now = self.clock.now_ms();
        let lifetime = self.config.session_lifetime_ms;

        if token_policy::needs_refresh(issued_at, now, lifetime, self.config.refresh_threshold_ms)
        {
            debug!("session inside refresh window");
            return self.refresh_token().await;
        }
        token_policy::is_within_lifetime(issued_at, now, lifetime)
    }

    /// Spawn a task that calls [`Self::check_and_refresh_token`] every `period`.
    pub fn spawn_refresh_task(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if !service.check_and_refresh_token().await {
                    debug!("background session check found no live session");
                }
            }
        })
    }

    // -----------------------------------------------------------------------
    // Cross-tab coherence
    // -----------------------------------------------------------------------

    /// React to a change of shared storage made by another tab.
    pub fn handle_storage_change(&self, change: &StoreChange) {
        if change.origin == self.store.tab_id() {
            return;
        }
        if !change
            .keys
            .iter()
            .any(|key| SESSION_KEYS.contains(&key.as_str()))
        {
            return;
        }
        debug!(keys = ?change.keys, "session changed in another tab");
        self.cache().invalidate();
        if let Err(e) = self.store.remove(StorageArea::Ephemeral, USER) {
            debug!("could not drop tab user copy: {e}");
        }
        self.emit(SessionEvent::StorageChanged);
    }

    /// Spawn a task that feeds store notifications to [`Self::handle_storage_change`].
    pub fn spawn_storage_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let mut changes = self.store.subscribe();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => service.handle_storage_change(&change),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "storage listener lagged; invalidating cache");
                        service.cache().invalidate();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    // -----------------------------------------------------------------------
    // Multi-device session registry (advisory; failures are swallowed)
    // -----------------------------------------------------------------------

    /// Register this device. `None` on any failure.
    pub async fn register_session(&self, device: &DeviceInfo) -> Option<DeviceSession> {
        let token = self.read_key(StorageArea::Durable, TOKEN)?;
        let session = match self.transport.register_session(&token, device).await {
            Ok(session) => session,
            Err(e) => {
                warn!("session registration failed: {e}");
                return None;
            }
        };
        match serde_json::to_string(&session) {
            Ok(json) => {
                if let Err(e) = self.store.set(StorageArea::Durable, CURRENT_SESSION, &json) {
                    warn!("failed to store current session: {e}");
                }
            }
            Err(e) => warn!("failed to serialize current session: {e}"),
        }
        Some(DeviceSession {
            is_current_device: true,
            ..session
        })
    }

    /// All sessions of the signed-in user; empty on any failure.
    pub async fn active_sessions(&self) -> Vec<DeviceSession> {
        let Some(token) = self.read_key(StorageArea::Durable, TOKEN) else {
            return Vec::new();
        };
        let current = self.current_session_id();
        match self.transport.list_sessions(&token).await {
            Ok(sessions) => sessions
                .into_iter()
                .map(|session| DeviceSession {
                    is_current_device: current.as_deref() == Some(session.id.as_str()),
                    ..session
                })
                .collect(),
            Err(e) => {
                warn!("listing sessions failed: {e}");
                Vec::new()
            }
        }
    }

    /// Revoke one session. Revoking this device's session also logs out locally.
    pub async fn logout_session(&self, session_id: &str) -> bool {
        let Some(token) = self.read_key(StorageArea::Durable, TOKEN) else {
            return false;
        };
        if let Err(e) = self.transport.revoke_session(&token, session_id).await {
            warn!(session_id, "revoking session failed: {e}");
            return false;
        }
        if self.current_session_id().as_deref() == Some(session_id) {
            self.logout();
        }
        true
    }

    /// Revoke every session except this device's.
    pub async fn logout_all_other_sessions(&self) -> bool {
        let (Some(token), Some(current)) = (
            self.read_key(StorageArea::Durable, TOKEN),
            self.current_session_id(),
        ) else {
            debug!("no registered session to keep");
            return false;
        };
        match self.transport.revoke_all_except(&token, &current).await {
            Ok(()) => true,
            Err(e) => {
                warn!("revoking other sessions failed: {e}");
                false
            }
        }
    }

    fn current_session_id(&self) -> Option<String> {
        self.read_key(StorageArea::Durable, CURRENT_SESSION)
            .and_then(|raw| serde_json::from_str::<DeviceSession>(&raw).ok())
            .map(|session| session.id)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn cache(&self) -> MutexGuard<'_, SessionCache> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read a key; storage failures read as absent.
    fn read_key(&self, area: StorageArea, key: &str) -> Option<String> {
        match self.store.get(area, key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, "session storage read failed: {e}");
                None
            }
        }
    }

    /// Store the grant's cookie token, or drop the old one when it has none.
    fn write_cookie(&self, cookie: Option<&str>) -> Result<(), StoreError> {
        match cookie {
            Some(cookie) => self.store.set(StorageArea::Cookie, TOKEN, cookie),
            None => self.store.remove(StorageArea::Cookie, TOKEN),
        }
    }

    fn save_session(&self) -> SavedSession {
        let read = |area: StorageArea, keys: &[&'static str]| -> Vec<(&'static str, Option<String>)> {
            keys.iter().map(|key| (*key, self.read_key(area, key))).collect()
        };
        SavedSession {
            areas: vec![
                (StorageArea::Cookie, read(StorageArea::Cookie, &[TOKEN][..])),
                (StorageArea::Ephemeral, read(StorageArea::Ephemeral, &[USER][..])),
                (StorageArea::Durable, read(StorageArea::Durable, &SESSION_KEYS[..])),
            ],
        }
    }

    /// Put saved values back. Failures are logged and skipped.
    fn restore_session(&self, saved: &SavedSession) {
        for (area, values) in &saved.areas {
            let present: Vec<(&str, String)> = values
                .iter()
                .filter_map(|(key, value)| value.clone().map(|value| (*key, value)))
                .collect();
            let absent: Vec<&str> = values
                .iter()
                .filter(|(_, value)| value.is_none())
                .map(|(key, _)| *key)
                .collect();

            if !present.is_empty() {
                if let Err(e) = self.store.set_many(*area, &present) {
                    warn!(?area, "failed to restore session keys: {e}");
                }
            }
            if !absent.is_empty() {
                if let Err(e) = self.store.remove_many(*area, &absent) {
                    warn!(?area, "failed to roll back session keys: {e}");
                }
            }
        }
    }

    fn issued_at(&self) -> Option<i64> {
        let raw = self.read_key(StorageArea::Durable, LOGIN_TIMESTAMP)?;
        match raw.trim().parse::<i64>() {
            Ok(ts) => Some(ts),
            Err(e) => {
                debug!("unparseable login timestamp: {e}");
                None
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
