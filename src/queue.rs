//! Durable queue of contact-form submissions made while offline.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::db;
use crate::error::QueuePersistError;

/// A submission waiting to be replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedSubmission {
  pub id: i64,
  pub payload: Value,
  pub created_at: DateTime<Utc>,
}

/// SQLite-backed submission queue.
pub struct SubmissionQueue {
  conn: Mutex<Connection>,
}

impl SubmissionQueue {
  pub fn open(path: &Path) -> Result<Self> {
    let conn = db::open(path, db::schema::QUEUE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = db::open_in_memory(db::schema::QUEUE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Run raw SQL against the queue database.
  #[cfg(test)]
  pub fn execute_batch(&self, sql: &str) -> Result<()> {
    self
      .conn()?
      .execute_batch(sql)
      .map_err(|e| eyre!("Failed to run SQL: {}", e))
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Persist a submission and return its id.
  pub fn enqueue(&self, payload: &Value) -> Result<i64, QueuePersistError> {
    let conn = self
      .conn()
      .map_err(|e| QueuePersistError(format!("{:#}", e)))?;

    conn
      .execute(
        "INSERT INTO submissions (payload, created_at) VALUES (?, datetime('now'))",
        params![payload.to_string()],
      )
      .map_err(|e| QueuePersistError(e.to_string()))?;

    let id = conn.last_insert_rowid();
    tracing::info!(id, "Queued submission");
    Ok(id)
  }

  /// Every pending submission.
  pub fn dequeue_all(&self) -> Result<Vec<QueuedSubmission>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT id, payload, created_at FROM submissions ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query submissions: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read submission: {}", e))?;

    rows
      .into_iter()
      .map(|(id, payload, created_at)| {
        Ok(QueuedSubmission {
          id,
          payload: serde_json::from_str(&payload)
            .map_err(|e| eyre!("Failed to deserialize submission {}: {}", id, e))?,
          created_at: db::parse_datetime(&created_at)?,
        })
      })
      .collect()
  }

  /// Delete a submission. Removing an absent id is not an error.
  pub fn remove(&self, id: i64) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute("DELETE FROM submissions WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove submission {}: {}", id, e))?;
    Ok(())
  }

  pub fn len(&self) -> Result<usize> {
    let conn = self.conn()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count submissions: {}", e))?;
    Ok(count as usize)
  }
}
