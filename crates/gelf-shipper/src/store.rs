// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable storage for records that have not been acknowledged yet.
//!
//! Persistence is split in two layers:
//!
//! - [`KeyValueStore`] is the byte-level backend (a directory of files, an
//!   in-memory map, or whatever key-value mechanism the host offers).
//! - [`PendingStore`] reads and writes the whole pending collection under a
//!   single key, as a JSON array of `{"id": .., "record": <GELF object>}`.
//!
//! There are no partial writes: callers always save the full collection, and
//! the queue actor is the only caller, which serializes every read-modify-write.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::{decode_record, encode_record};
use crate::error::StoreError;
use crate::record::{PendingEntry, RecordId};

/// Key under which the pending collection is persisted.
pub const PENDING_KEY: &str = "LogEntries";

/// Byte-level key-value persistence.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if the key was never written.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replaces the value stored under `key`.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).set(key, value)
    }
}

/// Stores each key as a file inside a directory.
///
/// Writes go to a temporary sibling file that is then renamed over the
/// target, so readers see either the old or the new collection. Every write
/// is synced to disk before the rename, so callers on an async runtime
/// should not call it from a task that must stay responsive.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    /// Opens the store, creating `dir` if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let target = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)?;
        Ok(())
    }
}

/// In-memory backend. Clones share the same data, so a clone kept by a test
/// outlives the queue that wrote to it, which is how restarts are simulated.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    id: u64,
    record: serde_json::Value,
}

/// Typed load/save of the pending collection on top of a [`KeyValueStore`].
pub struct PendingStore {
    backend: Box<dyn KeyValueStore>,
}

impl PendingStore {
    #[must_use]
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Loads every pending entry in insertion order.
    ///
    /// Missing data yields an empty collection. Unreadable or corrupt data is
    /// logged and also treated as empty.
    #[must_use]
    pub fn load(&self) -> Vec<PendingEntry> {
        let bytes = match self.backend.get(PENDING_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Failed to read pending log entries, starting empty: {e}");
                return Vec::new();
            }
        };

        match decode_entries(&bytes) {
            Ok(entries) => {
                debug!("Loaded {} pending log entries", entries.len());
                entries
            }
            Err(e) => {
                warn!("Discarding corrupt pending log entries: {e}");
                Vec::new()
            }
        }
    }

    /// Overwrites the persisted collection with `entries`.
    pub fn save(&self, entries: &[PendingEntry]) -> Result<(), StoreError> {
        let bytes = encode_entries(entries)?;
        self.backend.set(PENDING_KEY, &bytes)
    }
}

fn encode_entries(entries: &[PendingEntry]) -> Result<Vec<u8>, StoreError> {
    let stored = entries
        .iter()
        .map(|entry| {
            let record = encode_record(&entry.record)?;
            Ok(StoredEntry {
                id: entry.id.get(),
                record: serde_json::Value::Object(record),
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
    Ok(serde_json::to_vec(&stored)?)
}

fn decode_entries(bytes: &[u8]) -> Result<Vec<PendingEntry>, Box<dyn std::error::Error>> {
    let stored: Vec<StoredEntry> = serde_json::from_slice(bytes)?;
    stored
        .into_iter()
        .map(|entry| {
            Ok(PendingEntry {
                id: RecordId(entry.id),
                record: decode_record(&entry.record)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogRecord;
    use tracing_test::traced_test;

    fn entry(id: u64, message: &str) -> PendingEntry {
        PendingEntry {
            id: RecordId(id),
            record: LogRecord::new("web-1", message)
                .with_timestamp(1_700_000_000.0 + id as f64)
                .with_field("seq", i64::try_from(id).unwrap_or_default()),
        }
    }

    #[test]
    fn test_load_empty_store() {
        let store = PendingStore::new(MemoryKeyValueStore::new());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_then_load_preserves_order() {
        let backend = MemoryKeyValueStore::new();
        let store = PendingStore::new(backend.clone());
        let entries = vec![entry(1, "first"), entry(2, "second"), entry(3, "third")];

        store.save(&entries).unwrap();

        let reopened = PendingStore::new(backend);
        assert_eq!(reopened.load(), entries);
    }

    #[test]
    fn test_save_overwrites_previous_collection() {
        let store = PendingStore::new(MemoryKeyValueStore::new());
        store.save(&[entry(1, "a"), entry(2, "b")]).unwrap();
        store.save(&[entry(2, "b")]).unwrap();

        assert_eq!(store.load(), vec![entry(2, "b")]);
    }

    #[test]
    fn test_persisted_layout_wraps_gelf_objects() {
        let backend = MemoryKeyValueStore::new();
        let store = PendingStore::new(backend.clone());
        store.save(&[entry(7, "boot")]).unwrap();

        let bytes = backend.get(PENDING_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value[0]["id"], 7);
        assert_eq!(value[0]["record"]["short_message"], "boot");
        assert_eq!(value[0]["record"]["_seq"], 7);
    }

    #[test]
    #[traced_test]
    fn test_corrupt_data_loads_as_empty() {
        let backend = MemoryKeyValueStore::new();
        backend.set(PENDING_KEY, b"{not json").unwrap();

        let store = PendingStore::new(backend);
        assert!(store.load().is_empty());
        assert!(logs_contain("Discarding corrupt pending log entries"));
    }

    #[test]
    fn test_record_missing_required_field_is_corruption() {
        let backend = MemoryKeyValueStore::new();
        backend
            .set(PENDING_KEY, br#"[{"id":1,"record":{"host":"h"}}]"#)
            .unwrap();

        assert!(PendingStore::new(backend).load().is_empty());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileKeyValueStore::open(dir.path().join("nested")).unwrap();

        assert_eq!(backend.get(PENDING_KEY).unwrap(), None);
        backend.set(PENDING_KEY, b"[]").unwrap();
        backend.set(PENDING_KEY, b"[1]").unwrap();
        assert_eq!(backend.get(PENDING_KEY).unwrap(), Some(b"[1]".to_vec()));

        let leftovers: Vec<_> = fs::read_dir(backend.dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_file_store_reopen_sees_saved_entries() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![entry(1, "a"), entry(2, "b")];

        PendingStore::new(FileKeyValueStore::open(dir.path()).unwrap())
            .save(&entries)
            .unwrap();

        let reopened = PendingStore::new(FileKeyValueStore::open(dir.path()).unwrap());
        assert_eq!(reopened.load(), entries);
    }
}
