//! File-backed store.
//!
//! The durable and cookie areas live in one JSON document that every process
//! re-reads on access, so separate processes pointed at the same file behave
//! like tabs of one origin. Writes go to a temporary sibling file that is then
//! renamed over the original, which keeps batches atomic on disk. Each
//! read-modify-write holds an OS lock on `<file>.lock`, so concurrent
//! processes never drop each other's keys.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use super::{PersistentStore, StorageArea, StoreChange, StoreError, announce, change_channel};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    durable: BTreeMap<String, String>,
    #[serde(default)]
    cookies: BTreeMap<String, String>,
}

impl Document {
    fn area_mut(&mut self, area: StorageArea) -> Option<&mut BTreeMap<String, String>> {
        match area {
            StorageArea::Durable => Some(&mut self.durable),
            StorageArea::Cookie => Some(&mut self.cookies),
            StorageArea::Ephemeral => None,
        }
    }
}

/// [`PersistentStore`] persisted to a JSON file; the ephemeral area stays in memory.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
    ephemeral: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<StoreChange>,
    tab_id: Uuid,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            ephemeral: Mutex::new(HashMap::new()),
            changes: change_channel(),
            tab_id: Uuid::new_v4(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Document, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Document::default()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load for modification. A corrupt file is replaced rather than kept.
    fn load_for_write(&self) -> Result<Document, StoreError> {
        match self.load() {
            Err(StoreError::Corrupt(e)) => {
                warn!(path = %self.path.display(), "discarding corrupt session file: {e}");
                Ok(Document::default())
            }
            other => other,
        }
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn save(&self, doc: &Document) -> Result<(), StoreError> {
        let dir = self.dir();
        std::fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, doc)
            .map_err(|e| StoreError::Persist(format!("serialize: {e}")))?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::Persist(e.to_string()))?;
        Ok(())
    }

    /// Take the cross-process write lock. Released when the handle drops.
    fn lock_file(&self) -> Result<File, StoreError> {
        std::fs::create_dir_all(self.dir())?;
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(PathBuf::from(name))?;
        file.lock()?;
        Ok(file)
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn private(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.ephemeral
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PersistentStore for FileStore {
    fn tab_id(&self) -> Uuid {
        self.tab_id
    }

    fn get(&self, area: StorageArea, key: &str) -> Result<Option<String>, StoreError> {
        let mut doc = match area {
            StorageArea::Ephemeral => return Ok(self.private().get(key).cloned()),
            _ => self.load()?,
        };
        Ok(doc.area_mut(area).and_then(|map| map.remove(key)))
    }

    fn set_many(&self, area: StorageArea, entries: &[(&str, String)]) -> Result<(), StoreError> {
        if area == StorageArea::Ephemeral {
            let mut map = self.private();
            for (key, value) in entries {
                map.insert((*key).to_string(), value.clone());
            }
            return Ok(());
        }

        {
            let _guard = self.lock_writes();
            let _file_lock = self.lock_file()?;
            let mut doc = self.load_for_write()?;
            if let Some(map) = doc.area_mut(area) {
                for (key, value) in entries {
                    map.insert((*key).to_string(), value.clone());
                }
            }
            self.save(&doc)?;
        }
        announce(
            &self.changes,
            area,
            entries.iter().map(|(k, _)| (*k).to_string()),
            self.tab_id,
        );
        Ok(())
    }

    fn remove_many(&self, area: StorageArea, keys: &[&str]) -> Result<(), StoreError> {
        if area == StorageArea::Ephemeral {
            let mut map = self.private();
            for key in keys {
                map.remove(*key);
            }
            return Ok(());
        }

        let removed: Vec<String> = {
            let _guard = self.lock_writes();
            let _file_lock = self.lock_file()?;
            let mut doc = self.load_for_write()?;
            let removed: Vec<String> = match doc.area_mut(area) {
                Some(map) => keys
                    .iter()
                    .filter(|key| map.remove(**key).is_some())
                    .map(|key| (*key).to_string())
                    .collect(),
                None => Vec::new(),
            };
            if !removed.is_empty() {
                self.save(&doc)?;
            }
            removed
        };
        if !removed.is_empty() {
            announce(&self.changes, area, removed, self.tab_id);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
