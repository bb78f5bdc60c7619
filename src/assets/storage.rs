//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use super::types::{CachedEntry, CachedResponse};
use crate::db::Database;

/// Trait for named, versioned response stores.
///
/// Keys are exact request URLs, query string included.
pub trait CacheStorage: Send + Sync {
  /// Whether a cache called `name` exists.
  fn has(&self, name: &str) -> Result<bool>;

  /// Names of every existing cache.
  fn cache_names(&self) -> Result<Vec<String>>;

  /// Delete a cache and all its entries. Returns whether it existed.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Open `name` and store all entries in one step; either all land or none do.
  fn put_all(&self, name: &str, entries: &[(String, CachedResponse)]) -> Result<()>;

  /// Find `url` in any live cache.
  fn match_url(&self, url: &str) -> Result<Option<CachedEntry>>;

  /// URLs stored in the cache called `name`.
  fn urls(&self, name: &str) -> Result<Vec<String>>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteCacheStorage {
  conn: Mutex<Connection>,
}

impl SqliteCacheStorage {
  /// Open the cache storage at `path`, or at the default location when `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    Ok(Self::new(Database::open(path)?))
  }

  pub fn new(db: Database) -> Self {
    Self {
      conn: Mutex::new(db.into_connection()),
    }
  }

  pub fn in_memory() -> Result<Self> {
    Ok(Self::new(Database::in_memory()?))
  }
}

impl CacheStorage for SqliteCacheStorage {
  fn has(&self, name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let found: Option<String> = conn
      .query_row(
        "SELECT name FROM asset_caches WHERE name = ?",
        params![name],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up cache {}: {}", name, e))?;

    Ok(found.is_some())
  }

  fn cache_names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM asset_caches ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .unchecked_transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM asset_entries WHERE cache_name = ?",
      params![name],
    )
    .map_err(|e| eyre!("Failed to delete entries of cache {}: {}", name, e))?;

    let removed = tx
      .execute("DELETE FROM asset_caches WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn put_all(&self, name: &str, entries: &[(String, CachedResponse)]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Rolled back on drop if any statement fails
    let tx = conn
      .unchecked_transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO asset_caches (name, created_at) VALUES (?, datetime('now'))",
      params![name],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", name, e))?;

    for (url, response) in entries {
      let headers = serde_json::to_string(&response.headers)
        .map_err(|e| eyre!("Failed to serialize headers for {}: {}", url, e))?;

      tx.execute(
        "INSERT OR REPLACE INTO asset_entries (cache_name, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        params![name, url, response.status, headers, response.body],
      )
      .map_err(|e| eyre!("Failed to store {}: {}", url, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn match_url(&self, url: &str) -> Result<Option<CachedEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(String, u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT e.cache_name, e.status, e.headers, e.body, e.cached_at
         FROM asset_entries e
         INNER JOIN asset_caches c ON c.name = e.cache_name
         WHERE e.url = ?
         ORDER BY e.cache_name
         LIMIT 1",
        params![url],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", url, e))?;

    let Some((cache_name, status, headers, body, cached_at)) = row else {
      return Ok(None);
    };

    let headers: Vec<(String, String)> = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", url, e))?;

    Ok(Some(CachedEntry {
      cache_name,
      url: url.to_string(),
      response: CachedResponse {
        status,
        headers,
        body,
      },
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn urls(&self, name: &str) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT url FROM asset_entries WHERE cache_name = ? ORDER BY url")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let urls = stmt
      .query_map(params![name], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list entries of {}: {}", name, e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(urls)
  }
}

/// Cache storage that lives in process memory.
#[derive(Default)]
pub struct MemoryCacheStorage {
  caches: Mutex<BTreeMap<String, BTreeMap<String, CachedEntry>>>,
}

impl MemoryCacheStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStorage for MemoryCacheStorage {
  fn has(&self, name: &str) -> Result<bool> {
    let caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(caches.contains_key(name))
  }

  fn cache_names(&self) -> Result<Vec<String>> {
    let caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(caches.keys().cloned().collect())
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(caches.remove(name).is_some())
  }

  fn put_all(&self, name: &str, entries: &[(String, CachedResponse)]) -> Result<()> {
    let mut caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let cache = caches.entry(name.to_string()).or_default();
    let now = Utc::now();

    for (url, response) in entries {
      cache.insert(
        url.clone(),
        CachedEntry {
          cache_name: name.to_string(),
          url: url.clone(),
          response: response.clone(),
          cached_at: now,
        },
      );
    }

    Ok(())
  }

  fn match_url(&self, url: &str) -> Result<Option<CachedEntry>> {
    let caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(caches.values().find_map(|cache| cache.get(url).cloned()))
  }

  fn urls(&self, name: &str) -> Result<Vec<String>> {
    let caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      caches
        .get(name)
        .map(|cache| cache.keys().cloned().collect())
        .unwrap_or_default(),
    )
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

  fn shell_entries() -> Vec<(String, CachedResponse)> {
    vec![
      (
        "http://localhost/pwa/".to_string(),
        CachedResponse::new(200, "<html>").with_header("Content-Type", "text/html"),
      ),
      (
        "http://localhost/pwa/app.js?v=1".to_string(),
        CachedResponse::new(200, "console.log(1)"),
      ),
    ]
  }

  #[test]
  fn test_sqlite_put_and_match() {
    let storage = SqliteCacheStorage::in_memory().unwrap();
    storage.put_all("powerback-v1", &shell_entries()).unwrap();

    let entry = storage
      .match_url("http://localhost/pwa/")
      .unwrap()
      .expect("entry should be cached");
    assert_eq!(entry.cache_name, "powerback-v1");
    assert_eq!(entry.response.body, b"<html>".to_vec());
    assert_eq!(entry.response.header("content-type"), Some("text/html"));

    // Query strings are part of the key
    assert!(storage
      .match_url("http://localhost/pwa/app.js")
      .unwrap()
      .is_none());
    assert!(storage
      .match_url("http://localhost/pwa/app.js?v=1")
      .unwrap()
      .is_some());
  }

  #[test]
  fn test_sqlite_delete_removes_entries() {
    let storage = SqliteCacheStorage::in_memory().unwrap();
    storage.put_all("powerback-v1", &shell_entries()).unwrap();
    // An empty batch still creates the cache
    storage.put_all("powerback-v2", &[]).unwrap();

    assert_eq!(
      storage.cache_names().unwrap(),
      vec!["powerback-v1".to_string(), "powerback-v2".to_string()]
    );

    assert!(storage.delete("powerback-v1").unwrap());
    assert!(!storage.delete("powerback-v1").unwrap());
    assert!(!storage.has("powerback-v1").unwrap());
    assert!(storage.urls("powerback-v1").unwrap().is_empty());
    assert!(storage
      .match_url("http://localhost/pwa/")
      .unwrap()
      .is_none());
  }

  #[test]
  fn test_memory_storage_matches_across_caches() {
    let storage = MemoryCacheStorage::new();
    storage.put_all("a", &shell_entries()[..1]).unwrap();
    storage.put_all("b", &shell_entries()[1..]).unwrap();

    assert_eq!(
      storage
        .match_url("http://localhost/pwa/app.js?v=1")
        .unwrap()
        .map(|e| e.cache_name),
      Some("b".to_string())
    );
    assert_eq!(storage.urls("a").unwrap().len(), 1);

    storage.put_all("c", &[]).unwrap();
    assert!(storage.has("c").unwrap());
    assert!(storage.urls("c").unwrap().is_empty());
  }
}
