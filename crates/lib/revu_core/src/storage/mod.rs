//! Persistent key/value port for session state.
//!
//! Three areas mirror what a browser offers a single origin: durable storage
//! shared by every tab, an ephemeral per-tab area, and a cookie jar. Writes
//! to the shared areas are announced on a change channel so other tabs can
//! re-read.

pub mod file;
pub mod memory;

use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage keys used by the session manager.
pub mod keys {
    /// Bearer token (durable and cookie areas).
    pub const TOKEN: &str = "token";
    /// Epoch millis at which `token` was stored. Always paired with it.
    pub const LOGIN_TIMESTAMP: &str = "login_timestamp";
    /// Serialized user snapshot (durable and ephemeral areas).
    pub const USER: &str = "user";
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const CSRF_TOKEN: &str = "csrf_token";
    /// Serialized device descriptor of this installation's registered session.
    pub const CURRENT_SESSION: &str = "current_session";

    /// Every durable key that belongs to a session.
    pub const SESSION_KEYS: [&str; 6] = [
        TOKEN,
        LOGIN_TIMESTAMP,
        USER,
        REFRESH_TOKEN,
        CSRF_TOKEN,
        CURRENT_SESSION,
    ];
}

/// Capacity of the change channel; slow listeners lag rather than block writers.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Which storage area a key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageArea {
    /// Survives reloads; shared by every tab of the origin.
    Durable,
    /// Cleared when the tab closes; never shared.
    Ephemeral,
    /// Same-origin cookie jar; shared.
    Cookie,
}

impl StorageArea {
    /// Whether writes to this area are visible to other tabs.
    pub fn is_shared(self) -> bool {
        !matches!(self, StorageArea::Ephemeral)
    }
}

/// Notification that shared storage changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub area: StorageArea,
    pub keys: Vec<String>,
    /// Tab that performed the write.
    pub origin: Uuid,
}

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt storage: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Storage write failed: {0}")]
    Persist(String),
}

/// Key/value storage backing the session.
///
/// Batch operations are atomic: either every entry lands or none does.
pub trait PersistentStore: Send + Sync {
    /// Identity of the tab that owns this handle.
    fn tab_id(&self) -> Uuid;

    fn get(&self, area: StorageArea, key: &str) -> Result<Option<String>, StoreError>;

    fn set_many(&self, area: StorageArea, entries: &[(&str, String)]) -> Result<(), StoreError>;

    fn remove_many(&self, area: StorageArea, keys: &[&str]) -> Result<(), StoreError>;

    /// Subscribe to changes of the shared areas, including this tab's own.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;

    fn set(&self, area: StorageArea, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many(area, &[(key, value.to_string())])
    }

    fn remove(&self, area: StorageArea, key: &str) -> Result<(), StoreError> {
        self.remove_many(area, &[key])
    }
}

/// Create a change channel for a new backend.
pub(crate) fn change_channel() -> broadcast::Sender<StoreChange> {
    broadcast::channel(CHANGE_CHANNEL_CAPACITY).0
}

/// Announce a change. Having no listeners is not an error.
pub(crate) fn announce(
    changes: &broadcast::Sender<StoreChange>,
    area: StorageArea,
    keys: impl IntoIterator<Item = String>,
    origin: Uuid,
) {
    if !area.is_shared() {
        return;
    }
    let _ = changes.send(StoreChange {
        area,
        keys: keys.into_iter().collect(),
        origin,
    });
}
