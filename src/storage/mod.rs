//! Key-value persistence for recordings, progress and captured variables.
//!
//! The replay engine does not own a storage format. Collaborators that want
//! to persist state go through the [`KeyValueStore`] trait, which has an
//! in-memory implementation for tests and embedding, and a JSON file
//! implementation used by the CLI.
//!
//! The well-known keys are:
//! - [`RECORDED_REQUESTS_KEY`]: raw recordings as captured by a recorder
//! - [`REPLAY_PROGRESS_KEY`]: the latest progress event of a tracked run
//! - [`CAPTURED_VARIABLES_KEY`]: the variable store of the last session

use log::{debug, warn};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const RECORDED_REQUESTS_KEY: &str = "recordedRequests";
pub const REPLAY_PROGRESS_KEY: &str = "replayProgress";
pub const CAPTURED_VARIABLES_KEY: &str = "capturedVariables";

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// File I/O failed.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be serialized or deserialized.
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The storage file exists but does not hold a JSON object.
    #[error("Storage file {0} does not contain a JSON object")]
    InvalidFormat(PathBuf),

    /// No home directory to place the default storage file in.
    #[error("Could not determine home directory")]
    NoHomeDirectory,
}

/// Minimal key-value persistence interface.
pub trait KeyValueStore: Send {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<JsonValue>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: JsonValue) -> Result<(), StorageError>;

    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// Volatile store backed by a map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, JsonValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<JsonValue>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: JsonValue) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.values.remove(key);
        Ok(())
    }
}

/// Store persisted as a single JSON object in a file.
///
/// The file is read once on open and rewritten on every change. A missing
/// file starts an empty store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Map<String, JsonValue>,
}

impl JsonFileStore {
    /// Opens the store at `path`, creating parent directories as needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let values = if path.exists() {
            read_object(&path)?
        } else {
            debug!("Storage file {} does not exist yet", path.display());
            Map::new()
        };

        Ok(Self { path, values })
    }

    /// Opens the store at the default location.
    pub fn open_default() -> Result<Self, StorageError> {
        Self::open(default_storage_path()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(&self.values)?;

        // Atomic replace through a temp sibling
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.flush()?;
        fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<JsonValue>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: JsonValue) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

fn read_object(path: &Path) -> Result<Map<String, JsonValue>, StorageError> {
    let file = File::open(path)?;
    if file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
        warn!("Storage file {} is empty, starting fresh", path.display());
        return Ok(Map::new());
    }

    match serde_json::from_reader(BufReader::new(file))? {
        JsonValue::Object(map) => Ok(map),
        _ => Err(StorageError::InvalidFormat(path.to_path_buf())),
    }
}

/// Gets the default storage file path.
///
/// Returns `~/.config/request-replay/storage.json` on Unix-like systems, or
/// the equivalent under `AppData\Roaming` on Windows.
pub fn default_storage_path() -> Result<PathBuf, StorageError> {
    let config_dir = if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".config")
    } else if let Some(user_profile) = std::env::var_os("USERPROFILE") {
        PathBuf::from(user_profile).join("AppData").join("Roaming")
    } else {
        return Err(StorageError::NoHomeDirectory);
    };

    Ok(config_dir.join("request-replay").join("storage.json"))
}
