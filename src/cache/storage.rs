//! Cache storage trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheKey, CachedEntry};
use crate::db;
use crate::net::{Response, ResponseType};

/// Trait for cache storage backends.
///
/// Entries are namespaced by generation name. Writes are overwrite-by-key;
/// only [`CacheStorage::put_all`] spans several keys atomically.
pub trait CacheStorage: Send + Sync {
  /// Create the generation if it does not exist yet.
  fn open_generation(&self, name: &str) -> Result<()>;

  /// Names of every stored generation.
  fn generations(&self) -> Result<Vec<String>>;

  /// Delete a generation and all of its entries. Returns false if it was absent.
  fn delete_generation(&self, name: &str) -> Result<bool>;

  /// Record that a generation finished installing.
  fn mark_ready(&self, name: &str) -> Result<()>;

  fn is_ready(&self, name: &str) -> Result<bool>;

  /// Make `name` the only active generation.
  fn set_active(&self, name: &str) -> Result<()>;

  fn active_generation(&self) -> Result<Option<String>>;

  /// Store one entry, replacing any previous entry for the key.
  fn put(&self, generation: &str, key: &CacheKey, response: &Response) -> Result<()>;

  /// Store several entries in one transaction.
  fn put_all(&self, generation: &str, entries: &[(CacheKey, Response)]) -> Result<()>;

  /// Exact-key lookup.
  fn lookup(&self, generation: &str, key: &CacheKey) -> Result<Option<CachedEntry>>;

  fn entry_count(&self, generation: &str) -> Result<usize>;

  fn get_meta(&self, key: &str) -> Result<Option<String>>;

  fn set_meta(&self, key: &str, value: &str) -> Result<()>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    let conn = db::open(path, db::schema::CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = db::open_in_memory(db::schema::CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn insert_entry(
  conn: &Connection,
  generation: &str,
  key: &CacheKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (generation, url, method, status, status_text, headers, body, response_type, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        generation,
        key.url,
        key.method,
        response.status,
        response.status_text,
        headers,
        response.body,
        response.kind.as_str(),
      ],
    )
    .map_err(|e| eyre!("Failed to store cache entry {}: {}", key.url, e))?;

  Ok(())
}

fn ensure_generation(conn: &Connection, name: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to open cache generation {}: {}", name, e))?;
  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open_generation(&self, name: &str) -> Result<()> {
    let conn = self.conn()?;
    ensure_generation(&conn, name)
  }

  fn generations(&self) -> Result<Vec<String>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_generations ORDER BY created_at, name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache generations: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache generation: {}", e))?;

    Ok(names)
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE generation = ?",
      params![name],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;
    let removed = tx
      .execute(
        "DELETE FROM cache_generations WHERE name = ?",
        params![name],
      )
      .map_err(|e| eyre!("Failed to delete cache generation {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn mark_ready(&self, name: &str) -> Result<()> {
    let conn = self.conn()?;
    ensure_generation(&conn, name)?;
    conn
      .execute(
        "UPDATE cache_generations SET ready = 1 WHERE name = ?",
        params![name],
      )
      .map_err(|e| eyre!("Failed to mark {} ready: {}", name, e))?;
    Ok(())
  }

  fn is_ready(&self, name: &str) -> Result<bool> {
    let conn = self.conn()?;
    let ready: Option<bool> = conn
      .query_row(
        "SELECT ready FROM cache_generations WHERE name = ?",
        params![name],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache generation {}: {}", name, e))?;

    Ok(ready.unwrap_or(false))
  }

  fn set_active(&self, name: &str) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_generation(&tx, name)?;
    tx.execute(
      "UPDATE cache_generations SET active = (name = ?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to activate {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn active_generation(&self) -> Result<Option<String>> {
    let conn = self.conn()?;
    conn
      .query_row(
        "SELECT name FROM cache_generations WHERE active = 1 LIMIT 1",
        [],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query active generation: {}", e))
  }

  fn put(&self, generation: &str, key: &CacheKey, response: &Response) -> Result<()> {
    let conn = self.conn()?;
    ensure_generation(&conn, generation)?;
    insert_entry(&conn, generation, key, response)
  }

  fn put_all(&self, generation: &str, entries: &[(CacheKey, Response)]) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_generation(&tx, generation)?;
    for (key, response) in entries {
      insert_entry(&tx, generation, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn lookup(&self, generation: &str, key: &CacheKey) -> Result<Option<CachedEntry>> {
    let conn = self.conn()?;

    let row: Option<(u16, String, String, Vec<u8>, String, String)> = conn
      .query_row(
        "SELECT status, status_text, headers, body, response_type, cached_at
         FROM cache_entries
         WHERE generation = ? AND url = ? AND method = ?",
        params![generation, key.url, key.method],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache entry {}: {}", key.url, e))?;

    let Some((status, status_text, headers, body, kind, cached_at)) = row else {
      return Ok(None);
    };

    let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers of {}: {}", key.url, e))?;
    let kind = ResponseType::parse(&kind)
      .ok_or_else(|| eyre!("Unknown response type '{}' for {}", kind, key.url))?;

    Ok(Some(CachedEntry {
      response: Response {
        status,
        status_text,
        headers,
        body,
        kind,
      },
      cached_at: db::parse_datetime(&cached_at)?,
    }))
  }

  fn entry_count(&self, generation: &str) -> Result<usize> {
    let conn = self.conn()?;
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE generation = ?",
        params![generation],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", generation, e))?;

    Ok(count as usize)
  }

  fn get_meta(&self, key: &str) -> Result<Option<String>> {
    let conn = self.conn()?;
    conn
      .query_row(
        "SELECT value FROM worker_meta WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key, e))
  }

  fn set_meta(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO worker_meta (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write {}: {}", key, e))?;
    Ok(())
  }
}
