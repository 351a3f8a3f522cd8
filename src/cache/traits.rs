//! Core types and the storage contract for the session cache.

use async_trait::async_trait;
use color_eyre::Result;
use serde::{Deserialize, Serialize};

/// One booked session as persisted locally.
///
/// Rows are grouped by `partition_key` (the tutor id) and only ever replaced
/// as a whole partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
  /// Remote-assigned identifier, unique across the cache
  pub id: i64,
  /// Tutor the session belongs to
  pub partition_key: String,
  pub student_label: Option<String>,
  pub course_name: String,
  pub location_name: String,
  /// Opaque timestamp string as delivered by the API
  pub scheduled_at: String,
  pub cost: f64,
  pub contact_info: String,
}

/// Durable per-partition storage of cached records.
///
/// Implementations must make `replace_partition` atomic with respect to
/// `load_for_partition` on the same key: a reader sees either the full old
/// set or the full new set.
#[async_trait]
pub trait SessionStore: Send + Sync {
  /// Cached records for a partition, in the order they were stored.
  /// Returns an empty vec if nothing is cached.
  async fn load_for_partition(&self, key: &str) -> Result<Vec<CachedRecord>>;

  /// Replace every row of a partition with `records`.
  async fn replace_partition(&self, key: &str, records: &[CachedRecord]) -> Result<()>;

  /// Remove every row of a partition. Idempotent.
  async fn clear_partition(&self, key: &str) -> Result<()>;
}
