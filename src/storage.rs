//! Durable key/value storage for the persisted state subset.
//!
//! Three keys survive page sessions: the theme, the saved-article set and the
//! newsletter record, each JSON-encoded. Storage is strictly best-effort: a
//! read that fails or does not parse yields the caller's default, and a
//! failed write leaves in-memory state authoritative. Nothing in here ever
//! returns an error to the store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::state::fresh_id;

pub const THEME_KEY: &str = "theme";
pub const SAVED_KEY: &str = "saved";
pub const NEWSLETTER_KEY: &str = "newsletter";
pub const TIPS_KEY: &str = "tips";

/// Upper bound on remembered tip records, most-recent-first.
pub const TIP_CAP: usize = 50;

/// Trait for durable storage backends.
///
/// Modeled on browser local storage: string keys, string values, shared with
/// any other process pointed at the same backing data.
pub trait StateStorage: Send + Sync {
  /// Read the raw value at a key. Returns `None` when the key is missing or
  /// the backend is unavailable; implementations log and never fail.
  fn get(&self, key: &str) -> Option<String>;

  /// Best-effort write. Returns whether the value was durably stored;
  /// implementations log failures instead of propagating them.
  fn set(&self, key: &str, value: &str) -> bool;
}

/// Decode a stored JSON value, falling back to the default on any trouble.
pub fn decode_or_default<T: DeserializeOwned + Default>(raw: Option<String>) -> T {
  raw
    .and_then(|s| serde_json::from_str(&s).ok())
    .unwrap_or_default()
}

/// In-memory backend, used in tests and when no storage directory exists.
#[derive(Default)]
pub struct MemoryStorage {
  inner: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl StateStorage for MemoryStorage {
  fn get(&self, key: &str) -> Option<String> {
    match self.inner.lock() {
      Ok(map) => map.get(key).cloned(),
      Err(_) => None,
    }
  }

  fn set(&self, key: &str, value: &str) -> bool {
    match self.inner.lock() {
      Ok(mut map) => {
        map.insert(key.to_string(), value.to_string());
        true
      }
      Err(_) => false,
    }
  }
}

/// File-backed storage: one `<key>.json` file per key under a directory.
///
/// Writes go through a temp file and a rename so a concurrent reader in
/// another process never observes a half-written value.
pub struct FileStorage {
  dir: PathBuf,
}

impl FileStorage {
  /// Open storage rooted at `dir`, creating the directory if needed.
  pub fn open(dir: impl AsRef<Path>) -> color_eyre::Result<Self> {
    let dir = dir.as_ref().to_path_buf();
    std::fs::create_dir_all(&dir)
      .map_err(|e| color_eyre::eyre::eyre!("Failed to create storage directory: {}", e))?;
    Ok(Self { dir })
  }

  fn path_for(&self, key: &str) -> PathBuf {
    self.dir.join(format!("{}.json", key))
  }
}

impl StateStorage for FileStorage {
  fn get(&self, key: &str) -> Option<String> {
    match std::fs::read_to_string(self.path_for(key)) {
      Ok(value) => Some(value),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
      Err(e) => {
        warn!(key, error = %e, "failed to read storage key");
        None
      }
    }
  }

  fn set(&self, key: &str, value: &str) -> bool {
    let path = self.path_for(key);
    let tmp = path.with_extension("json.tmp");
    if let Err(e) = std::fs::write(&tmp, value) {
      warn!(key, error = %e, "failed to write storage temp file");
      return false;
    }
    if let Err(e) = std::fs::rename(&tmp, &path) {
      warn!(key, error = %e, "failed to persist storage key");
      return false;
    }
    debug!(key, "persisted storage key");
    true
  }
}

/// A locally saved reader tip: a link and/or a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tip {
  pub id: String,
  pub link: String,
  pub note: String,
  pub saved_at: DateTime<Utc>,
}

/// Prepend a tip record, keeping the list capped at [`TIP_CAP`].
///
/// Returns whether the record was durably stored.
pub fn save_tip(storage: &dyn StateStorage, link: &str, note: &str) -> bool {
  let mut tips: Vec<Tip> = decode_or_default(storage.get(TIPS_KEY));
  tips.insert(
    0,
    Tip {
      id: fresh_id(),
      link: link.to_string(),
      note: note.to_string(),
      saved_at: Utc::now(),
    },
  );
  tips.truncate(TIP_CAP);
  match serde_json::to_string(&tips) {
    Ok(encoded) => storage.set(TIPS_KEY, &encoded),
    Err(e) => {
      warn!(error = %e, "failed to serialize tips");
      false
    }
  }
}

/// List saved tips, most-recent-first.
pub fn list_tips(storage: &dyn StateStorage) -> Vec<Tip> {
  decode_or_default(storage.get(TIPS_KEY))
}
