//! Local cache of last-known-good session snapshots.
//!
//! The cache is a degraded-mode fallback only: a reachable server always
//! wins over it. Writes never fail from the caller's point of view; store
//! errors are logged and dropped.

use crate::error::{ClientError, ClientResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const SNAPSHOT_PREFIX: &str = "code_";
const CURRENT_SESSION_KEY: &str = "currentSessionId";

/// A persistent string key/value store.
///
/// Values are JSON documents. Keys are arbitrary strings.
///
/// # Implementors
///
/// - [`MemoryStore`] - For testing and ephemeral clients
/// - [`FileStore`] - One file per key inside a directory
pub trait KeyValueStore: Send + Sync {
    /// Returns the value under `key`, if any.
    fn get(&self, key: &str) -> ClientResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> ClientResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> ClientResult<()>;
}

/// An in-memory key/value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// A directory-backed key/value store.
///
/// Each key maps to `<dir>/<encoded key>.json`. Writes go to a temporary
/// file that is synced and renamed over the target, so a crash leaves
/// either the old or the new value.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> ClientResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(cache_error)?;
        Ok(Self { dir })
    }

    /// Returns the directory holding the entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(cache_error(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp).map_err(cache_error)?;
        file.write_all(value.as_bytes()).map_err(cache_error)?;
        file.sync_all().map_err(cache_error)?;
        fs::rename(&tmp, &path).map_err(cache_error)
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(cache_error(e)),
        }
    }
}

fn cache_error(err: std::io::Error) -> ClientError {
    ClientError::Cache(err.to_string())
}

/// Maps a key onto a portable file name: ASCII alphanumerics, `-` and `_`
/// pass through, every other byte becomes `%XX`.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

/// Last-known-good state of one session on this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSnapshot {
    /// Session the snapshot belongs to.
    pub session_id: String,
    /// Document body.
    pub code: String,
    /// Server timestamp of the state (Unix millis).
    pub last_modified: u64,
}

impl LocalSnapshot {
    /// Creates a snapshot.
    pub fn new(session_id: impl Into<String>, code: impl Into<String>, last_modified: u64) -> Self {
        Self {
            session_id: session_id.into(),
            code: code.into(),
            last_modified,
        }
    }
}

/// Snapshot cache over a key/value store.
pub struct LocalCache<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> LocalCache<S> {
    /// Creates a cache over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reads the snapshot of a session. Unreadable entries read as absent.
    pub fn read(&self, session_id: &str) -> Option<LocalSnapshot> {
        let key = format!("{SNAPSHOT_PREFIX}{session_id}");
        let raw = match self.store.get(&key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(session_id, error = %e, "failed to read cached snapshot");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(session_id, error = %e, "discarding corrupt cached snapshot");
                None
            }
        }
    }

    /// Overwrites the snapshot of its session.
    pub fn write(&self, snapshot: &LocalSnapshot) {
        let key = format!("{SNAPSHOT_PREFIX}{}", snapshot.session_id);
        let result = serde_json::to_string(snapshot)
            .map_err(ClientError::from)
            .and_then(|raw| self.store.set(&key, &raw));

        if let Err(e) = result {
            warn!(session_id = %snapshot.session_id, error = %e, "failed to cache snapshot");
        }
    }

    /// Drops the snapshot of a session.
    pub fn clear(&self, session_id: &str) {
        if let Err(e) = self.store.remove(&format!("{SNAPSHOT_PREFIX}{session_id}")) {
            warn!(session_id, error = %e, "failed to clear cached snapshot");
        }
    }

    /// Returns the session this client last joined.
    pub fn current_session(&self) -> Option<String> {
        let raw = self.store.get(CURRENT_SESSION_KEY).ok()??;
        serde_json::from_str(&raw).ok()
    }

    /// Remembers the session this client joined.
    pub fn set_current_session(&self, session_id: &str) {
        let result = serde_json::to_string(session_id)
            .map_err(ClientError::from)
            .and_then(|raw| self.store.set(CURRENT_SESSION_KEY, &raw));

        if let Err(e) = result {
            warn!(session_id, error = %e, "failed to remember current session");
        }
    }
}
