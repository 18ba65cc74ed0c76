use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tempfile::Builder;
use tracing::{debug, warn};

use crate::domain::{MatchRecord, RecordSet, Region, SyncCursor};
use crate::error::ArenaError;

/// Bumped whenever the snapshot layout changes. Old blobs are ignored.
pub const CACHE_FORMAT_VERSION: u32 = 3;

/// Dedupes by match id (first occurrence wins, existing before incoming) and
/// orders newest first. Equal start times keep their first-seen order.
pub fn merge(existing: &RecordSet, incoming: Vec<MatchRecord>) -> RecordSet {
    let mut seen: HashSet<String> = HashSet::with_capacity(existing.len() + incoming.len());
    let mut out = Vec::with_capacity(existing.len() + incoming.len());
    for record in existing.iter().cloned().chain(incoming) {
        if seen.insert(record.match_id.clone()) {
            out.push(record);
        }
    }
    out.sort_by(|a, b| b.game_start.cmp(&a.game_start));
    RecordSet::from_sorted(out)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub format: u32,
    pub records: RecordSet,
    pub cursor: SyncCursor,
    #[serde(default)]
    pub region: Option<Region>,
    pub updated_at: i64,
}

impl CacheSnapshot {
    pub fn new(
        records: RecordSet,
        cursor: SyncCursor,
        region: Option<Region>,
        updated_at: i64,
    ) -> Self {
        Self {
            format: CACHE_FORMAT_VERSION,
            records,
            cursor,
            region,
            updated_at,
        }
    }
}

/// Flat key-value blob storage.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ArenaError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), ArenaError>;
    fn remove(&self, key: &str) -> Result<(), ArenaError>;
}

impl<B: BlobStore + ?Sized> BlobStore for &B {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ArenaError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), ArenaError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), ArenaError> {
        (**self).remove(key)
    }
}

/// One JSON file per key under `<cache_root>/snapshots`.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    cache_root: Utf8PathBuf,
}

impl FileBlobStore {
    pub fn new() -> Result<Self, ArenaError> {
        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("arena-tracker"))
                    .ok()
            })
            .ok_or_else(|| {
                ArenaError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { cache_root })
    }

    pub fn new_with_root(cache_root: Utf8PathBuf) -> Self {
        Self { cache_root }
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn blob_path(&self, key: &str) -> Utf8PathBuf {
        self.cache_root
            .join("snapshots")
            .join(format!("{}.json", file_safe(key)))
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ArenaError> {
        match fs::read(self.blob_path(key).as_std_path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ArenaError::Filesystem(err.to_string())),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), ArenaError> {
        write_bytes_atomic(&self.blob_path(key), value)
    }

    fn remove(&self, key: &str) -> Result<(), ArenaError> {
        match fs::remove_file(self.blob_path(key).as_std_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ArenaError::Filesystem(err.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys = self
            .entries
            .lock()
            .map(|entries| entries.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ArenaError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ArenaError::Filesystem("blob store poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), ArenaError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ArenaError::Filesystem("blob store poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ArenaError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ArenaError::Filesystem("blob store poisoned".to_string()))?;
        entries.remove(key);
        Ok(())
    }
}

/// Per-player snapshots on top of a [`BlobStore`]. Loading never fails and
/// saving is best effort.
#[derive(Debug, Clone)]
pub struct SnapshotStore<B: BlobStore> {
    blobs: B,
}

impl<B: BlobStore> SnapshotStore<B> {
    pub fn new(blobs: B) -> Self {
        Self { blobs }
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn key_for(identity_key: &str) -> String {
        format!("arena_cache:v{CACHE_FORMAT_VERSION}:{identity_key}")
    }

    pub fn load(&self, identity_key: &str) -> Option<CacheSnapshot> {
        let key = Self::key_for(identity_key);
        let bytes = match self.blobs.get(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                debug!(%key, error = %err, "cache read failed, treating as empty");
                return None;
            }
        };
        let snapshot: CacheSnapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                debug!(%key, error = %err, "cache unreadable, treating as empty");
                return None;
            }
        };
        if snapshot.format != CACHE_FORMAT_VERSION {
            debug!(%key, format = snapshot.format, "cache format mismatch, ignoring");
            return None;
        }
        // Re-establish ordering and uniqueness in case the blob was edited.
        let records = merge(&RecordSet::default(), snapshot.records.into_records());
        Some(CacheSnapshot {
            records,
            ..snapshot
        })
    }

    pub fn save(&self, identity_key: &str, snapshot: &CacheSnapshot) {
        let key = Self::key_for(identity_key);
        let bytes = match serde_json::to_vec(snapshot) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%key, error = %err, "failed to encode cache snapshot");
                return;
            }
        };
        if let Err(err) = self.blobs.set(&key, &bytes) {
            warn!(%key, error = %err, "failed to persist cache snapshot");
        }
    }

    pub fn clear(&self, identity_key: &str) -> Result<(), ArenaError> {
        self.blobs.remove(&Self::key_for(identity_key))
    }
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), ArenaError> {
    let parent = match path.parent() {
        Some(parent) if parent.as_str().is_empty() => Utf8Path::new("."),
        Some(parent) => parent,
        None => return Err(ArenaError::Filesystem("invalid destination path".to_string())),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| ArenaError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix("arena-tracker")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| ArenaError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| ArenaError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| ArenaError::Filesystem(err.to_string()))?;
    Ok(())
}

fn file_safe(key: &str) -> String {
    key.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_path_is_file_safe() {
        let store = FileBlobStore::new_with_root(Utf8PathBuf::from("/tmp/arena"));
        let path = store.blob_path("arena_cache:v3:abc-DEF_1");
        assert!(path.ends_with("snapshots/arena_cache_v3_abc-DEF_1.json"));
    }

    #[test]
    fn storage_key_embeds_format() {
        let key = SnapshotStore::<MemoryBlobStore>::key_for("puuid");
        assert_eq!(key, format!("arena_cache:v{CACHE_FORMAT_VERSION}:puuid"));
    }
}
