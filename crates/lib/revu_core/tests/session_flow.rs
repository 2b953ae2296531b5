//! End-to-end behaviour of the session service over in-memory storage.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use revu_core::auth::service::{AuthSessionService, Redirect, SessionEvent};
use revu_core::auth::state::{self, AuthStateStore};
use revu_core::auth::transport::{AuthTransport, LoginGrant, RefreshGrant, TransportError};
use revu_core::auth::{AuthError, guard};
use revu_core::clock::ManualClock;
use revu_core::config::{DEFAULT_CACHE_TTL_MS, SessionConfig};
use revu_core::models::auth::{Credentials, DeviceInfo, DeviceSession, User};
use revu_core::notify::{NoticeLevel, Notifier};
use revu_core::storage::keys::{LOGIN_TIMESTAMP, REFRESH_TOKEN, TOKEN, USER};
use revu_core::storage::{
    MemoryStore, PersistentStore, StorageArea, StoreChange, StoreError,
};

const START: i64 = 1_700_000_000_000;
const LIFETIME: i64 = 8 * 60 * 60 * 1000;
const THRESHOLD: i64 = 15 * 60 * 1000;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Remote API double with call counters.
struct FakeApi {
    reject_login: Option<TransportError>,
    fail_refresh: bool,
    login_cookie: Option<String>,
    logins: AtomicU32,
    refreshes: AtomicU32,
}

impl FakeApi {
    fn ok() -> Self {
        Self {
            reject_login: None,
            fail_refresh: false,
            login_cookie: None,
            logins: AtomicU32::new(0),
            refreshes: AtomicU32::new(0),
        }
    }

    fn rejecting(error: TransportError) -> Self {
        Self {
            reject_login: Some(error),
            ..Self::ok()
        }
    }

    fn failing_refresh() -> Self {
        Self {
            fail_refresh: true,
            ..Self::ok()
        }
    }

    fn with_login_cookie(cookie: String) -> Self {
        Self {
            login_cookie: Some(cookie),
            ..Self::ok()
        }
    }
}

#[async_trait]
impl AuthTransport for FakeApi {
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, TransportError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.reject_login {
            return Err(error.clone());
        }
        Ok(LoginGrant {
            user: User {
                id: 1,
                username: credentials.username.clone(),
                email: "emily@example.com".into(),
                first_name: "Emily".into(),
                last_name: "Johnson".into(),
                token: "abc".into(),
                ..User::default()
            },
            refresh_token: Some("r1".into()),
            csrf_token: None,
            cookie_token: self.login_cookie.clone(),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshGrant, TransportError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh {
            return Err(TransportError::Http {
                status: 500,
                message: None,
            });
        }
        Ok(RefreshGrant {
            token: "fresh".into(),
            refresh_token: Some("r2".into()),
            cookie_token: None,
        })
    }

    async fn register_session(
        &self,
        _access_token: &str,
        _device: &DeviceInfo,
    ) -> Result<DeviceSession, TransportError> {
        Err(TransportError::Network("offline".into()))
    }

    async fn list_sessions(&self, _: &str) -> Result<Vec<DeviceSession>, TransportError> {
        Err(TransportError::Network("offline".into()))
    }

    async fn revoke_session(&self, _: &str, _: &str) -> Result<(), TransportError> {
        Err(TransportError::Network("offline".into()))
    }

    async fn revoke_all_except(&self, _: &str, _: &str) -> Result<(), TransportError> {
        Err(TransportError::Network("offline".into()))
    }
}

/// Store wrapper counting reads that reach the backend.
struct CountingStore {
    inner: MemoryStore,
    reads: AtomicU32,
}

impl CountingStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            reads: AtomicU32::new(0),
        }
    }

    fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl PersistentStore for CountingStore {
    fn tab_id(&self) -> Uuid {
        self.inner.tab_id()
    }

    fn get(&self, area: StorageArea, key: &str) -> Result<Option<String>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(area, key)
    }

    fn set_many(&self, area: StorageArea, entries: &[(&str, String)]) -> Result<(), StoreError> {
        self.inner.set_many(area, entries)
    }

    fn remove_many(&self, area: StorageArea, keys: &[&str]) -> Result<(), StoreError> {
        self.inner.remove_many(area, keys)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.subscribe()
    }
}

/// Store wrapper whose writes to one area fail while `failing` is set.
struct FailingStore {
    inner: MemoryStore,
    area: StorageArea,
    failing: AtomicBool,
}

impl FailingStore {
    fn new(area: StorageArea, failing: bool) -> Self {
        Self {
            inner: MemoryStore::new(),
            area,
            failing: AtomicBool::new(failing),
        }
    }

    fn check(&self, area: StorageArea) -> Result<(), StoreError> {
        if area == self.area && self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Persist(format!("{area:?} is read-only")));
        }
        Ok(())
    }
}

impl PersistentStore for FailingStore {
    fn tab_id(&self) -> Uuid {
        self.inner.tab_id()
    }

    fn get(&self, area: StorageArea, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(area, key)
    }

    fn set_many(&self, area: StorageArea, entries: &[(&str, String)]) -> Result<(), StoreError> {
        self.check(area)?;
        self.inner.set_many(area, entries)
    }

    fn remove_many(&self, area: StorageArea, keys: &[&str]) -> Result<(), StoreError> {
        self.check(area)?;
        self.inner.remove_many(area, keys)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.subscribe()
    }
}

#[derive(Default)]
struct Notices(std::sync::Mutex<Vec<(NoticeLevel, String)>>);

impl Notifier for Notices {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.0.lock().unwrap().push((level, message.to_string()));
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    api: Arc<FakeApi>,
    service: Arc<AuthSessionService>,
}

fn harness_with(api: FakeApi, config: SessionConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(START));
    let api = Arc::new(api);
    let service = Arc::new(AuthSessionService::with_clock(
        store.clone(),
        api.clone(),
        clock.clone(),
        config,
    ));
    Harness {
        store,
        clock,
        api,
        service,
    }
}

fn harness(api: FakeApi) -> Harness {
    harness_with(api, SessionConfig::default())
}

fn creds() -> Credentials {
    Credentials::new("emilys", "emilyspass")
}

fn durable(store: &dyn PersistentStore, key: &str) -> Option<String> {
    store.get(StorageArea::Durable, key).unwrap()
}

/// A cookie-channel JWT for user 1 expiring at `exp_ms`.
fn cookie_jwt(exp_ms: i64) -> String {
    encode(
        &Header::default(),
        &json!({"sub": "1", "iat": START / 1000, "exp": exp_ms / 1000}),
        &EncodingKey::from_secret(b"server-secret"),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn happy_path_login_persists_session() {
    let h = harness(FakeApi::ok());
    let auth = AuthStateStore::new();

    let user = state::login(&auth, &h.service, &creds()).await.unwrap();

    assert_eq!(user.token, "abc");
    assert_eq!(durable(&*h.store, TOKEN).as_deref(), Some("abc"));
    assert_eq!(
        durable(&*h.store, LOGIN_TIMESTAMP),
        Some(START.to_string())
    );
    let snapshot: User = serde_json::from_str(&durable(&*h.store, USER).unwrap()).unwrap();
    assert_eq!(snapshot, user);
    assert!(h.service.is_session_valid());
    assert!(auth.snapshot().has_identity());
    assert_eq!(h.service.current_user(), Some(user));
}

#[tokio::test]
async fn rejected_login_shows_friendly_message_and_writes_nothing() {
    let h = harness(FakeApi::rejecting(TransportError::Http {
        status: 401,
        message: Some("Invalid credentials".into()),
    }));
    let auth = AuthStateStore::new();

    let err = state::login(&auth, &h.service, &creds()).await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials));
    assert_eq!(err.to_string(), "Incorrect email or password");
    assert!(durable(&*h.store, TOKEN).is_none());
    let snapshot = auth.snapshot();
    assert!(!snapshot.is_authenticated);
    assert!(!snapshot.is_loading);
    assert_eq!(snapshot.error.as_deref(), Some("Incorrect email or password"));
}

#[tokio::test]
async fn failed_relogin_keeps_existing_session() {
    let h = harness(FakeApi::ok());
    h.service.login(&creds()).await.unwrap();

    let err = h
        .service
        .login(&Credentials::new("emilys", "  "))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::ValidationError(_)));
    assert_eq!(h.api.logins.load(Ordering::SeqCst), 1);
    assert_eq!(durable(&*h.store, TOKEN).as_deref(), Some("abc"));
}

#[tokio::test]
async fn login_that_cannot_store_the_cookie_leaves_no_session() {
    let store = Arc::new(FailingStore::new(StorageArea::Cookie, true));
    let service = AuthSessionService::with_clock(
        store.clone(),
        Arc::new(FakeApi::ok()),
        Arc::new(ManualClock::new(START)),
        SessionConfig::default(),
    );

    let err = service.login(&creds()).await.unwrap_err();

    assert!(matches!(err, AuthError::Storage(_)));
    assert!(durable(&*store, TOKEN).is_none());
    assert!(durable(&*store, LOGIN_TIMESTAMP).is_none());
    assert!(store.get(StorageArea::Ephemeral, USER).unwrap().is_none());
    assert!(!service.is_session_valid());
}

#[tokio::test]
async fn relogin_that_fails_midway_restores_previous_session() {
    let store = Arc::new(FailingStore::new(StorageArea::Durable, false));
    let cookie = cookie_jwt(START + LIFETIME);
    let service = AuthSessionService::with_clock(
        store.clone(),
        Arc::new(FakeApi::with_login_cookie(cookie.clone())),
        Arc::new(ManualClock::new(START)),
        SessionConfig::default(),
    );
    service.login(&creds()).await.unwrap();

    store.failing.store(true, Ordering::SeqCst);
    let err = service
        .login(&Credentials::new("someone-else", "pw"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Storage(_)));
    assert_eq!(durable(&*store, TOKEN).as_deref(), Some("abc"));
    assert_eq!(
        store.get(StorageArea::Cookie, TOKEN).unwrap(),
        Some(cookie)
    );
    assert!(service.is_session_valid());
    assert_eq!(service.current_user().unwrap().username, "emilys");
}

#[tokio::test]
async fn network_and_throttling_errors_are_classified() {
    let h = harness(FakeApi::rejecting(TransportError::Network("refused".into())));
    let err = h.service.login(&creds()).await.unwrap_err();
    assert!(matches!(err, AuthError::NetworkError(_)));

    let h = harness(FakeApi::rejecting(TransportError::Http {
        status: 429,
        message: None,
    }));
    let err = h.service.login(&creds()).await.unwrap_err();
    assert!(matches!(err, AuthError::RateLimited));
}

// ---------------------------------------------------------------------------
// Cache and validity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_reads_within_ttl_hit_the_cache() {
    let store = Arc::new(CountingStore::new(MemoryStore::new()));
    let clock = Arc::new(ManualClock::new(START));
    let service = AuthSessionService::with_clock(
        store.clone(),
        Arc::new(FakeApi::ok()),
        clock.clone(),
        SessionConfig::default(),
    );
    service.login(&creds()).await.unwrap();

    // let the write-through entry lapse so the first read goes to storage
    clock.advance(DEFAULT_CACHE_TTL_MS);
    let first = service.current_user();
    let reads_after_first = store.reads();
    assert!(reads_after_first > 0);

    clock.advance(DEFAULT_CACHE_TTL_MS - 1);
    let second = service.current_user();
    assert!(service.is_session_valid());

    assert_eq!(first, second);
    assert_eq!(store.reads(), reads_after_first);

    clock.advance(1);
    service.is_session_valid();
    assert!(store.reads() > reads_after_first);
}

#[tokio::test]
async fn login_writes_through_the_cache() {
    let store = Arc::new(CountingStore::new(MemoryStore::new()));
    let service = AuthSessionService::with_clock(
        store.clone(),
        Arc::new(FakeApi::ok()),
        Arc::new(ManualClock::new(START)),
        SessionConfig::default(),
    );
    service.login(&creds()).await.unwrap();
    let reads = store.reads();

    assert_eq!(service.current_user().unwrap().username, "emilys");
    assert!(service.is_session_valid());
    assert_eq!(store.reads(), reads);
}

#[tokio::test]
async fn session_expires_exactly_at_lifetime() {
    let h = harness(FakeApi::ok());
    let mut events = h.service.subscribe();
    h.service.login(&creds()).await.unwrap();

    h.clock.set(START + LIFETIME - 1);
    assert!(h.service.is_session_valid());

    h.clock.set(START + LIFETIME);
    assert!(!h.service.is_session_valid());
    assert!(durable(&*h.store, TOKEN).is_none());
    assert!(durable(&*h.store, LOGIN_TIMESTAMP).is_none());

    let mut saw_expired = false;
    while let Ok(event) = events.try_recv() {
        saw_expired |= event == SessionEvent::Expired;
    }
    assert!(saw_expired);
}

#[test]
fn stale_session_is_removed_on_read() {
    let h = harness(FakeApi::ok());
    h.store
        .set_many(
            StorageArea::Durable,
            &[
                (TOKEN, "abc".into()),
                (LOGIN_TIMESTAMP, (START - LIFETIME - 1).to_string()),
                (USER, r#"{"id":1,"username":"emilys","token":"abc"}"#.into()),
            ],
        )
        .unwrap();

    assert!(h.service.current_user().is_none());
    assert!(durable(&*h.store, TOKEN).is_none());
    assert!(durable(&*h.store, USER).is_none());
}

#[test]
fn corrupt_user_snapshot_clears_session() {
    let h = harness(FakeApi::ok());
    h.store
        .set_many(
            StorageArea::Durable,
            &[
                (TOKEN, "abc".into()),
                (LOGIN_TIMESTAMP, START.to_string()),
                (USER, "{not json".into()),
            ],
        )
        .unwrap();

    assert!(h.service.current_user().is_none());
    assert!(durable(&*h.store, USER).is_none());
    assert!(durable(&*h.store, TOKEN).is_none());
}

#[test]
fn token_without_snapshot_fails_closed() {
    let h = harness(FakeApi::ok());
    h.store
        .set_many(
            StorageArea::Durable,
            &[(TOKEN, "abc".into()), (LOGIN_TIMESTAMP, START.to_string())],
        )
        .unwrap();

    assert!(h.service.current_user().is_none());
    assert!(durable(&*h.store, TOKEN).is_none());
}

#[test]
fn token_without_snapshot_can_rebuild_identity_from_claims() {
    let config = SessionConfig {
        reconstruct_identity: true,
        ..SessionConfig::default()
    };
    let h = harness_with(FakeApi::ok(), config);
    let now_s = START / 1000;
    let token = encode(
        &Header::default(),
        &json!({"sub": "42", "iat": now_s, "exp": now_s + 3600}),
        &EncodingKey::from_secret(b"server-secret"),
    )
    .unwrap();
    h.store
        .set_many(
            StorageArea::Durable,
            &[(TOKEN, token.clone()), (LOGIN_TIMESTAMP, START.to_string())],
        )
        .unwrap();

    let user = h.service.current_user().unwrap();
    assert_eq!(user.id, 42);
    assert_eq!(user.token, token);
}

#[test]
fn rejected_cookie_token_invalidates_without_clearing() {
    let h = harness(FakeApi::ok());
    h.store
        .set_many(
            StorageArea::Durable,
            &[(TOKEN, "abc".into()), (LOGIN_TIMESTAMP, START.to_string())],
        )
        .unwrap();
    h.store
        .set(StorageArea::Cookie, TOKEN, "not-a-jwt")
        .unwrap();

    assert!(!h.service.is_session_valid());
    assert_eq!(durable(&*h.store, TOKEN).as_deref(), Some("abc"));
}

// ---------------------------------------------------------------------------
// Logout and cross-tab coherence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn logout_redirects_to_login() {
    let h = harness(FakeApi::ok());
    let auth = AuthStateStore::new();
    state::login(&auth, &h.service, &creds()).await.unwrap();

    let redirect = state::logout(&auth, &h.service);

    assert_eq!(redirect, Redirect::to("/login"));
    assert!(!auth.snapshot().is_authenticated);
    assert!(h.service.current_user().is_none());
}

#[tokio::test]
async fn logout_in_one_tab_reaches_the_other_after_ttl() {
    let tab_a = Arc::new(MemoryStore::new());
    let tab_b = Arc::new(tab_a.open_tab());
    let clock = Arc::new(ManualClock::new(START));
    let api = Arc::new(FakeApi::ok());
    let service_a =
        AuthSessionService::with_clock(tab_a, api.clone(), clock.clone(), SessionConfig::default());
    let service_b =
        AuthSessionService::with_clock(tab_b, api, clock.clone(), SessionConfig::default());

    service_a.login(&creds()).await.unwrap();
    assert!(service_b.current_user().is_some());

    service_a.logout();
    clock.advance(DEFAULT_CACHE_TTL_MS);
    assert!(service_b.current_user().is_none());
}

#[tokio::test]
async fn storage_listener_invalidates_other_tab_immediately() {
    let tab_a = Arc::new(MemoryStore::new());
    let tab_b = Arc::new(tab_a.open_tab());
    let clock = Arc::new(ManualClock::new(START));
    let api = Arc::new(FakeApi::ok());
    let service_a =
        AuthSessionService::with_clock(tab_a, api.clone(), clock.clone(), SessionConfig::default());
    let service_b = Arc::new(AuthSessionService::with_clock(
        tab_b,
        api,
        clock.clone(),
        SessionConfig::default(),
    ));

    service_a.login(&creds()).await.unwrap();
    assert!(service_b.current_user().is_some());

    let mut events = service_b.subscribe();
    let listener = service_b.spawn_storage_listener();
    service_a.logout();

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, SessionEvent::StorageChanged);
    // no clock movement: the cached verdict was dropped
    assert!(service_b.current_user().is_none());
    listener.abort();
}

#[tokio::test]
async fn reconcile_follows_login_in_another_tab() {
    let tab_a = Arc::new(MemoryStore::new());
    let tab_b = Arc::new(tab_a.open_tab());
    let clock = Arc::new(ManualClock::new(START));
    let api = Arc::new(FakeApi::ok());
    let service_a =
        AuthSessionService::with_clock(tab_a, api.clone(), clock.clone(), SessionConfig::default());
    let service_b =
        AuthSessionService::with_clock(tab_b.clone(), api, clock, SessionConfig::default());
    let auth_b = AuthStateStore::new();
    assert!(!state::bootstrap(&auth_b, &service_b));

    service_a.login(&creds()).await.unwrap();
    service_b.handle_storage_change(&StoreChange {
        area: StorageArea::Durable,
        keys: vec![TOKEN.to_string()],
        origin: Uuid::new_v4(),
    });
    state::reconcile(&auth_b, &service_b);
    assert!(auth_b.snapshot().has_identity());

    service_a.logout();
    service_b.handle_storage_change(&StoreChange {
        area: StorageArea::Durable,
        keys: vec![TOKEN.to_string()],
        origin: Uuid::new_v4(),
    });
    state::reconcile(&auth_b, &service_b);
    assert!(!auth_b.snapshot().is_authenticated);
}

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_happens_only_inside_threshold() {
    let h = harness(FakeApi::ok());
    h.service.login(&creds()).await.unwrap();

    h.clock.set(START + LIFETIME - THRESHOLD);
    assert!(h.service.check_and_refresh_token().await);
    assert_eq!(h.api.refreshes.load(Ordering::SeqCst), 0);

    h.clock.set(START + LIFETIME - THRESHOLD + 1);
    assert!(h.service.check_and_refresh_token().await);
    assert_eq!(h.api.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(durable(&*h.store, TOKEN).as_deref(), Some("fresh"));
    assert_eq!(durable(&*h.store, REFRESH_TOKEN).as_deref(), Some("r2"));

    // the new timestamp restarts the lifetime
    h.clock.set(START + LIFETIME + 1);
    assert!(h.service.is_session_valid());
}

#[tokio::test]
async fn failed_refresh_leaves_session_untouched() {
    let h = harness(FakeApi::failing_refresh());
    let auth = AuthStateStore::new();
    state::login(&auth, &h.service, &creds()).await.unwrap();
    h.clock.set(START + LIFETIME - 60_000);

    assert!(!state::refresh(&auth, &h.service).await);

    assert_eq!(durable(&*h.store, TOKEN).as_deref(), Some("abc"));
    assert_eq!(
        durable(&*h.store, LOGIN_TIMESTAMP),
        Some(START.to_string())
    );
    assert_eq!(durable(&*h.store, REFRESH_TOKEN).as_deref(), Some("r1"));
    assert!(!auth.snapshot().is_authenticated);
}

#[tokio::test]
async fn refresh_without_cookie_drops_the_expiring_one() {
    let h = harness(FakeApi::with_login_cookie(cookie_jwt(START + LIFETIME)));
    h.service.login(&creds()).await.unwrap();
    assert!(h.store.get(StorageArea::Cookie, TOKEN).unwrap().is_some());

    h.clock.set(START + LIFETIME - 10 * 60 * 1000);
    assert!(h.service.refresh_token().await);
    assert!(h.store.get(StorageArea::Cookie, TOKEN).unwrap().is_none());

    // past the old cookie's expiry, well inside the refreshed lifetime
    h.clock.set(START + LIFETIME + 60 * 1000);
    assert!(h.service.is_session_valid());
    assert_eq!(h.service.current_user().unwrap().token, "fresh");
}

#[tokio::test]
async fn refresh_that_cannot_store_the_cookie_keeps_old_session() {
    let store = Arc::new(FailingStore::new(StorageArea::Cookie, false));
    let clock = Arc::new(ManualClock::new(START));
    let service = AuthSessionService::with_clock(
        store.clone(),
        Arc::new(FakeApi::ok()),
        clock.clone(),
        SessionConfig::default(),
    );
    service.login(&creds()).await.unwrap();

    store.failing.store(true, Ordering::SeqCst);
    clock.set(START + LIFETIME - 60_000);
    assert!(!service.refresh_token().await);

    assert_eq!(durable(&*store, TOKEN).as_deref(), Some("abc"));
    assert_eq!(durable(&*store, LOGIN_TIMESTAMP), Some(START.to_string()));
    assert_eq!(durable(&*store, REFRESH_TOKEN).as_deref(), Some("r1"));
}

#[tokio::test]
async fn status_reports_refresh_window() {
    let h = harness(FakeApi::ok());
    h.service.login(&creds()).await.unwrap();
    h.clock.set(START + LIFETIME - 60_000);

    let status = h.service.session_status();
    assert!(status.valid);
    assert_eq!(status.issued_at_ms, Some(START));
    assert_eq!(status.remaining_ms, Some(60_000));
    assert!(status.needs_refresh);
}

// ---------------------------------------------------------------------------
// Route guard over the real service
// ---------------------------------------------------------------------------

#[tokio::test]
async fn guard_restores_persisted_session() {
    let h = harness(FakeApi::ok());
    h.service.login(&creds()).await.unwrap();
    let auth = AuthStateStore::new();
    let notices = Notices::default();
    let route = guard::RouteGuard::mount("/dashboard", "/login");

    let view = route.render(&auth, &*h.service, &notices).await;

    assert_eq!(view, guard::GuardView::Render);
    assert_eq!(auth.snapshot().user.unwrap().username, "emilys");
    assert!(notices.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn guard_denies_expired_session_once() {
    let h = harness(FakeApi::ok());
    h.service.login(&creds()).await.unwrap();
    h.clock.set(START + LIFETIME);
    let auth = AuthStateStore::new();
    let notices = Notices::default();
    let route = guard::RouteGuard::mount("/cv-review", "/login");

    let view = route.render(&auth, &*h.service, &notices).await;
    route.render(&auth, &*h.service, &notices).await;

    assert_eq!(
        view,
        guard::GuardView::Redirect(Redirect::to("/login").with_from("/cv-review"))
    );
    let notices = notices.0.lock().unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0, NoticeLevel::Error);
    assert!(durable(&*h.store, TOKEN).is_none());
}
