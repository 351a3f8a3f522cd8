use chrono::{DateTime, Utc};

use crate::cache::CachedRecord;

/// Observable state of the booked-session list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
  /// Records currently shown, fresh or cached
  pub records: Vec<CachedRecord>,
  /// A cache read or remote refresh is in progress
  pub is_loading: bool,
  /// `records` may not match the remote source
  pub is_stale: bool,
  /// Last failure, cleared by the next successful refresh or load
  pub error: Option<String>,
  /// Partition the state belongs to
  pub last_partition_key: Option<String>,
  /// When `records` last came from the remote source
  pub last_synced_at: Option<DateTime<Utc>>,
}

impl SyncState {
  /// Whether a refresh would bring the state up to date.
  pub fn needs_refresh(&self) -> bool {
    self.is_stale || self.error.is_some()
  }
}
