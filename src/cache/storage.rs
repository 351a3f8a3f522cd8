//! Session store implementations: SQLite-backed and a no-op for disabled caching.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::traits::{CachedRecord, SessionStore};
use crate::db;

/// Store used when caching is disabled - reads always miss, writes are discarded.
pub struct NoopSessionStore;

#[async_trait]
impl SessionStore for NoopSessionStore {
  async fn load_for_partition(&self, _key: &str) -> Result<Vec<CachedRecord>> {
    Ok(Vec::new()) // Always miss
  }

  async fn replace_partition(&self, _key: &str, _records: &[CachedRecord]) -> Result<()> {
    Ok(()) // Discard
  }

  async fn clear_partition(&self, _key: &str) -> Result<()> {
    Ok(())
  }
}

/// SQLite-based session store.
///
/// The connection sits behind a mutex so a partition replace (one
/// transaction) is serialized against reads. All database work runs on the
/// blocking pool.
#[derive(Clone)]
pub struct SqliteSessionStore {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
  /// Open the store at `path`, creating the database if needed.
  pub fn open(path: &Path) -> Result<Self> {
    Ok(Self::from_connection(db::open(path)?))
  }

  /// Open a store backed by an in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    Ok(Self::from_connection(db::open_in_memory()?))
  }

  fn from_connection(conn: Connection) -> Self {
    Self {
      conn: Arc::new(Mutex::new(conn)),
    }
  }

  /// Run `f` against the locked connection on the blocking pool.
  async fn with_conn<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
  {
    let conn = Arc::clone(&self.conn);
    tokio::task::spawn_blocking(move || {
      let mut conn = conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
      f(&mut conn)
    })
    .await
    .map_err(|e| eyre!("Store task failed: {}", e))?
  }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
  async fn load_for_partition(&self, key: &str) -> Result<Vec<CachedRecord>> {
    let key = key.to_string();
    let records = self
      .with_conn(move |conn| {
        let mut stmt = conn
          .prepare(
            "SELECT id, partition_key, student_label, course_name, location_name,
                    scheduled_at, cost, contact_info
             FROM booked_sessions
             WHERE partition_key = ?
             ORDER BY position",
          )
          .map_err(|e| eyre!("Failed to prepare session query: {}", e))?;

        let records = stmt
          .query_map(params![key], |row| {
            Ok(CachedRecord {
              id: row.get(0)?,
              partition_key: row.get(1)?,
              student_label: row.get(2)?,
              course_name: row.get(3)?,
              location_name: row.get(4)?,
              scheduled_at: row.get(5)?,
              cost: row.get(6)?,
              contact_info: row.get(7)?,
            })
          })
          .map_err(|e| eyre!("Failed to query sessions: {}", e))?
          .collect::<rusqlite::Result<Vec<_>>>()
          .map_err(|e| eyre!("Failed to read cached session: {}", e))?;

        Ok(records)
      })
      .await?;

    debug!(count = records.len(), "Loaded cached sessions");
    Ok(records)
  }

  async fn replace_partition(&self, key: &str, records: &[CachedRecord]) -> Result<()> {
    let key = key.to_string();
    let records = records.to_vec();

    self
      .with_conn(move |conn| {
        let tx = conn
          .transaction()
          .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

        tx.execute(
          "DELETE FROM booked_sessions WHERE partition_key = ?",
          params![key],
        )
        .map_err(|e| eyre!("Failed to clear partition {}: {}", key, e))?;

        {
          let mut stmt = tx
            .prepare(
              "INSERT OR REPLACE INTO booked_sessions
                 (id, partition_key, position, student_label, course_name,
                  location_name, scheduled_at, cost, contact_info, cached_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
            )
            .map_err(|e| eyre!("Failed to prepare insert: {}", e))?;

          for (position, record) in records.iter().enumerate() {
            stmt
              .execute(params![
                record.id,
                key,
                position as i64,
                record.student_label,
                record.course_name,
                record.location_name,
                record.scheduled_at,
                record.cost,
                record.contact_info,
              ])
              .map_err(|e| eyre!("Failed to store session {}: {}", record.id, e))?;
          }
        }

        tx.commit()
          .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

        debug!(partition = %key, count = records.len(), "Replaced cached partition");
        Ok(())
      })
      .await
  }

  async fn clear_partition(&self, key: &str) -> Result<()> {
    let key = key.to_string();
    self
      .with_conn(move |conn| {
        conn
          .execute(
            "DELETE FROM booked_sessions WHERE partition_key = ?",
            params![key],
          )
          .map_err(|e| eyre!("Failed to clear partition {}: {}", key, e))?;
        Ok(())
      })
      .await
  }
}
