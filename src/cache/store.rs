//! Cache store trait and SQLite implementation.
//!
//! One cache generation is a named collection of responses; exactly one
//! generation is current at a time, and superseded generations are deleted
//! wholesale on activation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::sync::Mutex;

/// A cached (or freshly fetched) HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub url: String,
  pub status: u16,
  pub content_type: String,
  pub body: Vec<u8>,
}

impl CachedResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Minimal placeholder served when neither cache nor network can answer.
  pub fn offline_placeholder(url: &str) -> Self {
    Self {
      url: url.to_string(),
      status: 503,
      content_type: "text/plain; charset=utf-8".to_string(),
      body: b"Offline.".to_vec(),
    }
  }
}

/// Trait for cache storage backends.
pub trait CacheStore: Send + Sync {
  /// Store a response in a generation, replacing any entry for the same URL.
  fn put(&self, generation: &str, response: &CachedResponse) -> Result<()>;

  /// Look up a response by URL within a generation.
  fn get(&self, generation: &str, url: &str) -> Result<Option<CachedResponse>>;

  /// Names of every generation currently holding entries.
  fn list_generations(&self) -> Result<Vec<String>>;

  /// Delete a generation and everything in it.
  fn delete_generation(&self, generation: &str) -> Result<()>;
}

impl<S: CacheStore + ?Sized> CacheStore for std::sync::Arc<S> {
  fn put(&self, generation: &str, response: &CachedResponse) -> Result<()> {
    (**self).put(generation, response)
  }

  fn get(&self, generation: &str, url: &str) -> Result<Option<CachedResponse>> {
    (**self).get(generation, url)
  }

  fn list_generations(&self) -> Result<Vec<String>> {
    (**self).list_generations()
  }

  fn delete_generation(&self, generation: &str) -> Result<()> {
    (**self).delete_generation(generation)
  }
}

/// SHA256 hash for stable, fixed-length row keys.
fn url_key(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

/// SQLite-backed cache store.
pub struct SqliteCacheStore {
  conn: Mutex<Connection>,
}

/// Schema for the response cache.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS response_cache (
    generation TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, url_hash)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_generation
    ON response_cache(generation);
"#;

impl SqliteCacheStore {
  /// Open (or create) the cache database at the given path.
  pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// In-memory cache store, used in tests.
  pub fn in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  /// When the response was stored, if present. Exposed for diagnostics.
  pub fn cached_at(&self, generation: &str, url: &str) -> Result<Option<DateTime<Utc>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT cached_at FROM response_cache WHERE generation = ? AND url_hash = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let cached_at: Option<String> = stmt
      .query_row(params![generation, url_key(url)], |row| row.get(0))
      .ok();

    cached_at.map(|s| parse_datetime(&s)).transpose()
  }
}

impl CacheStore for SqliteCacheStore {
  fn put(&self, generation: &str, response: &CachedResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (generation, url_hash, url, status, content_type, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          generation,
          url_key(&response.url),
          response.url,
          response.status,
          response.content_type,
          response.body,
        ],
      )
      .map_err(|e| eyre!("Failed to store response: {}", e))?;

    Ok(())
  }

  fn get(&self, generation: &str, url: &str) -> Result<Option<CachedResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT url, status, content_type, body FROM response_cache
         WHERE generation = ? AND url_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let result = stmt
      .query_row(params![generation, url_key(url)], |row| {
        Ok(CachedResponse {
          url: row.get(0)?,
          status: row.get(1)?,
          content_type: row.get(2)?,
          body: row.get(3)?,
        })
      })
      .ok();

    Ok(result)
  }

  fn list_generations(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT generation FROM response_cache ORDER BY generation")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names: Vec<String> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list generations: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_generation(&self, generation: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM response_cache WHERE generation = ?",
        params![generation],
      )
      .map_err(|e| eyre!("Failed to delete generation: {}", e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn response(url: &str, body: &[u8]) -> CachedResponse {
    CachedResponse {
      url: url.to_string(),
      status: 200,
      content_type: "text/html".to_string(),
      body: body.to_vec(),
    }
  }

  #[test]
  fn test_put_get_roundtrip() {
    let store = SqliteCacheStore::in_memory().unwrap();
    let res = response("http://localhost/index.html", b"<html></html>");
    store.put("gen-v1", &res).unwrap();

    let hit = store.get("gen-v1", "http://localhost/index.html").unwrap();
    assert_eq!(hit, Some(res));
    assert!(store
      .cached_at("gen-v1", "http://localhost/index.html")
      .unwrap()
      .is_some());
    assert!(store.get("gen-v2", "http://localhost/index.html").unwrap().is_none());
  }

  #[test]
  fn test_put_replaces_same_url() {
    let store = SqliteCacheStore::in_memory().unwrap();
    store.put("g", &response("http://localhost/a", b"one")).unwrap();
    store.put("g", &response("http://localhost/a", b"two")).unwrap();

    let hit = store.get("g", "http://localhost/a").unwrap().unwrap();
    assert_eq!(hit.body, b"two");
  }

  #[test]
  fn test_generation_listing_and_deletion() {
    let store = SqliteCacheStore::in_memory().unwrap();
    store.put("gen-v1", &response("http://localhost/a", b"a")).unwrap();
    store.put("gen-v2", &response("http://localhost/a", b"a")).unwrap();

    assert_eq!(
      store.list_generations().unwrap(),
      vec!["gen-v1".to_string(), "gen-v2".to_string()]
    );

    store.delete_generation("gen-v1").unwrap();
    assert_eq!(store.list_generations().unwrap(), vec!["gen-v2".to_string()]);
    assert!(store.get("gen-v1", "http://localhost/a").unwrap().is_none());
  }

  #[test]
  fn test_offline_placeholder_shape() {
    let placeholder = CachedResponse::offline_placeholder("http://localhost/missing");
    assert_eq!(placeholder.status, 503);
    assert_eq!(placeholder.content_type, "text/plain; charset=utf-8");
    assert_eq!(placeholder.body, b"Offline.");
    assert!(!placeholder.is_success());
  }
}
