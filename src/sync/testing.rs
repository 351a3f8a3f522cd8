//! In-memory fakes for controller tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::{CachedRecord, SessionStore};
use crate::remote::{FetchError, RemoteSession, RemoteSource};

pub fn cached(id: i64, partition: &str) -> CachedRecord {
  CachedRecord {
    id,
    partition_key: partition.to_string(),
    student_label: Some(format!("Student {}", id)),
    course_name: "Chemistry".to_string(),
    location_name: "Online".to_string(),
    scheduled_at: "2026-10-22 18:00".to_string(),
    cost: 20.0,
    contact_info: "555-0199".to_string(),
  }
}

pub fn remote_session(id: i64, tutor: &str, student: Option<&str>) -> RemoteSession {
  RemoteSession {
    id,
    tutor_id: tutor.to_string(),
    student_name: student.map(String::from),
    course_name: "Chemistry".to_string(),
    location_name: "Online".to_string(),
    date_time: "2026-10-22 18:00".to_string(),
    cost: 20.0,
    contact_info: "555-0199".to_string(),
  }
}

/// Session store kept in a map, with switchable failures and write counting.
#[derive(Default)]
pub struct MemoryStore {
  partitions: Mutex<HashMap<String, Vec<CachedRecord>>>,
  replaces: Mutex<HashMap<String, usize>>,
  fail_reads: AtomicBool,
  fail_writes: AtomicBool,
}

impl MemoryStore {
  /// Pre-populate a partition without counting it as a write.
  pub fn seed(&self, key: &str, records: Vec<CachedRecord>) {
    self
      .partitions
      .lock()
      .unwrap()
      .insert(key.to_string(), records);
  }

  pub fn rows(&self, key: &str) -> Vec<CachedRecord> {
    self
      .partitions
      .lock()
      .unwrap()
      .get(key)
      .cloned()
      .unwrap_or_default()
  }

  pub fn replace_count(&self, key: &str) -> usize {
    self
      .replaces
      .lock()
      .unwrap()
      .get(key)
      .copied()
      .unwrap_or(0)
  }

  pub fn fail_reads(&self, fail: bool) {
    self.fail_reads.store(fail, Ordering::SeqCst);
  }

  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }
}

#[async_trait]
impl SessionStore for MemoryStore {
  async fn load_for_partition(&self, key: &str) -> Result<Vec<CachedRecord>> {
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(eyre!("disk I/O error"));
    }
    Ok(self.rows(key))
  }

  async fn replace_partition(&self, key: &str, records: &[CachedRecord]) -> Result<()> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(eyre!("database is locked"));
    }
    self
      .partitions
      .lock()
      .unwrap()
      .insert(key.to_string(), records.to_vec());
    *self
      .replaces
      .lock()
      .unwrap()
      .entry(key.to_string())
      .or_insert(0) += 1;
    Ok(())
  }

  async fn clear_partition(&self, key: &str) -> Result<()> {
    self.partitions.lock().unwrap().remove(key);
    Ok(())
  }
}

/// Remote source answering from a queue of scripted responses.
///
/// Each call takes the next response when it starts. Once the queue is empty
/// the `fail_always` error (if any) is returned.
#[derive(Default)]
pub struct ScriptedRemote {
  responses: Mutex<VecDeque<Result<Vec<RemoteSession>, FetchError>>>,
  fallback: Mutex<Option<FetchError>>,
  delay: Mutex<Duration>,
  calls: Mutex<Vec<Instant>>,
}

impl ScriptedRemote {
  pub fn push_ok(&self, sessions: Vec<RemoteSession>) {
    self.responses.lock().unwrap().push_back(Ok(sessions));
  }

  pub fn push_err(&self, err: FetchError) {
    self.responses.lock().unwrap().push_back(Err(err));
  }

  pub fn fail_always(&self, err: FetchError) {
    *self.fallback.lock().unwrap() = Some(err);
  }

  /// Simulated latency of every call.
  pub fn set_delay(&self, delay: Duration) {
    *self.delay.lock().unwrap() = delay;
  }

  pub fn call_times(&self) -> Vec<Instant> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl RemoteSource for ScriptedRemote {
  async fn fetch_all(&self) -> Result<Vec<RemoteSession>, FetchError> {
    self.calls.lock().unwrap().push(Instant::now());

    let response = self.responses.lock().unwrap().pop_front();
    let response = match response {
      Some(response) => response,
      None => Err(
        self
          .fallback
          .lock()
          .unwrap()
          .clone()
          .unwrap_or_else(|| FetchError::Unknown("no scripted response".into())),
      ),
    };

    let delay = *self.delay.lock().unwrap();
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }
    response
  }
}
