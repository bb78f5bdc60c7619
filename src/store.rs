//! Local persisted key-value store.
//!
//! Mirrors the browser's origin-scoped storage: string keys, string values,
//! synchronous access. Any read may come back empty, either because the key
//! was never written or because the host cleared it.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::db::Database;

/// Trait for key-value storage backends.
pub trait KeyValueStore: Send + Sync {
  /// Read the value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key`. Removing an absent key is not an error.
  fn remove(&self, key: &str) -> Result<()>;
}

/// Read and decode a JSON value.
///
/// A value that no longer decodes is treated as absent.
pub fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
  let Some(raw) = store.get(key)? else {
    return Ok(None);
  };

  match serde_json::from_str(&raw) {
    Ok(value) => Ok(Some(value)),
    Err(e) => {
      tracing::warn!(key, error = %e, "discarding undecodable stored value");
      Ok(None)
    }
  }
}

/// Encode and store a JSON value.
pub fn write_json<T: Serialize + ?Sized>(
  store: &dyn KeyValueStore,
  key: &str,
  value: &T,
) -> Result<()> {
  let raw = serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize {}: {}", key, e))?;
  store.set(key, &raw)
}

/// SQLite-based key-value store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at `path`, or at the default location when `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    Ok(Self::new(Database::open(path)?))
  }

  /// Create a store over an already migrated database.
  pub fn new(db: Database) -> Self {
    Self {
      conn: Mutex::new(db.into_connection()),
    }
  }

  /// Store backed by a private in-memory database.
  pub fn in_memory() -> Result<Self> {
    Ok(Self::new(Database::in_memory()?))
  }
}

impl KeyValueStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write {}: {}", key, e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove {}: {}", key, e))?;

    Ok(())
  }
}

/// Store that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.remove(key);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sqlite_store_set_get_remove() {
    let store = SqliteStore::in_memory().unwrap();

    assert_eq!(store.get("authToken").unwrap(), None);

    store.set("authToken", "abc").unwrap();
    store.set("authToken", "def").unwrap();
    assert_eq!(store.get("authToken").unwrap().as_deref(), Some("def"));

    store.remove("authToken").unwrap();
    store.remove("authToken").unwrap();
    assert_eq!(store.get("authToken").unwrap(), None);
  }

  #[test]
  fn test_corrupt_json_reads_as_absent() {
    let store = MemoryStore::new();
    store.set("incidents", "{not json").unwrap();

    let value: Option<Vec<u64>> = read_json(&store, "incidents").unwrap();
    assert!(value.is_none());
  }

  #[test]
  fn test_json_round_trip_through_sqlite() {
    let store = SqliteStore::in_memory().unwrap();
    write_json(&store, "ids", &vec![3u64, 2, 1]).unwrap();

    let ids: Option<Vec<u64>> = read_json(&store, "ids").unwrap();
    assert_eq!(ids, Some(vec![3, 2, 1]));
  }
}
