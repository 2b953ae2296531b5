//! In-memory store. Tabs opened from the same store share the durable and
//! cookie areas but each gets its own ephemeral area.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use uuid::Uuid;

use super::{PersistentStore, StorageArea, StoreChange, StoreError, announce, change_channel};

#[derive(Debug, Default)]
struct SharedAreas {
    durable: HashMap<String, String>,
    cookies: HashMap<String, String>,
}

#[derive(Debug)]
struct Origin {
    areas: Mutex<SharedAreas>,
    changes: broadcast::Sender<StoreChange>,
}

/// In-memory [`PersistentStore`].
#[derive(Debug)]
pub struct MemoryStore {
    origin: Arc<Origin>,
    ephemeral: Mutex<HashMap<String, String>>,
    tab_id: Uuid,
}

impl MemoryStore {
    /// A fresh origin with a single tab.
    pub fn new() -> Self {
        Self {
            origin: Arc::new(Origin {
                areas: Mutex::new(SharedAreas::default()),
                changes: change_channel(),
            }),
            ephemeral: Mutex::new(HashMap::new()),
            tab_id: Uuid::new_v4(),
        }
    }

    /// Open another tab on the same origin.
    pub fn open_tab(&self) -> Self {
        Self {
            origin: Arc::clone(&self.origin),
            ephemeral: Mutex::new(HashMap::new()),
            tab_id: Uuid::new_v4(),
        }
    }

    fn shared(&self) -> MutexGuard<'_, SharedAreas> {
        self.origin
            .areas
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn private(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.ephemeral
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` against the map backing `area` while holding its lock.
    fn with_area<T>(
        &self,
        area: StorageArea,
        f: impl FnOnce(&mut HashMap<String, String>) -> T,
    ) -> T {
        match area {
            StorageArea::Durable => f(&mut self.shared().durable),
            StorageArea::Cookie => f(&mut self.shared().cookies),
            StorageArea::Ephemeral => f(&mut self.private()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistentStore for MemoryStore {
    fn tab_id(&self) -> Uuid {
        self.tab_id
    }

    fn get(&self, area: StorageArea, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.with_area(area, |map| map.get(key).cloned()))
    }

    fn set_many(&self, area: StorageArea, entries: &[(&str, String)]) -> Result<(), StoreError> {
        self.with_area(area, |map| {
            for (key, value) in entries {
                map.insert((*key).to_string(), value.clone());
            }
        });
        announce(
            &self.origin.changes,
            area,
            entries.iter().map(|(k, _)| (*k).to_string()),
            self.tab_id,
        );
        Ok(())
    }

    fn remove_many(&self, area: StorageArea, keys: &[&str]) -> Result<(), StoreError> {
        let removed: Vec<String> = self.with_area(area, |map| {
            keys.iter()
                .filter(|key| map.remove(**key).is_some())
                .map(|key| (*key).to_string())
                .collect()
        });
        if !removed.is_empty() {
            announce(&self.origin.changes, area, removed, self.tab_id);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.origin.changes.subscribe()
    }
}
