//! Keeps the cached session list of one tutor in step with the remote source.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::filter::filter_for_partition;
use super::retry::{retry_with_backoff, RetryPolicy};
use super::state::SyncState;
use crate::cache::{CachedRecord, SessionStore};
use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::remote::RemoteSource;

/// Timing knobs for a [`SyncController`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncOptions {
  pub retry: RetryPolicy,
  /// Pause after a reconnect before refreshing, so the link can stabilize
  pub settle_delay: Duration,
}

impl Default for SyncOptions {
  fn default() -> Self {
    Self {
      retry: RetryPolicy::default(),
      settle_delay: Duration::from_millis(1500),
    }
  }
}

impl From<&SyncConfig> for SyncOptions {
  fn from(config: &SyncConfig) -> Self {
    Self {
      retry: config.retry_policy(),
      settle_delay: config.settle_delay(),
    }
  }
}

/// Sync controller for booked sessions.
///
/// Serves cached records first, refreshes from the remote source when the
/// network allows, and never discards cached records because a refresh failed.
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct SyncController {
  inner: Arc<Inner>,
}

struct Inner {
  store: Arc<dyn SessionStore>,
  remote: Arc<dyn RemoteSource>,
  connectivity: Arc<dyn Connectivity>,
  options: SyncOptions,
  state: watch::Sender<SyncState>,
  /// Partitions with a load or refresh in flight
  in_flight: Mutex<HashSet<String>>,
}

fn lock_set(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
  set.lock().unwrap_or_else(|e| e.into_inner())
}

/// Marks a partition as busy until released or dropped.
struct InFlight<'a> {
  set: &'a Mutex<HashSet<String>>,
  key: Option<String>,
}

impl InFlight<'_> {
  /// Run `publish` and free the partition under the same lock, so a load
  /// joining this partition either sees the outcome or takes over the guard.
  fn release_with(mut self, publish: impl FnOnce()) {
    let mut set = lock_set(self.set);
    publish();
    if let Some(key) = self.key.take() {
      set.remove(&key);
    }
  }
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    if let Some(key) = self.key.take() {
      lock_set(self.set).remove(&key);
    }
  }
}

/// Outcome of asking to load a partition.
enum Claim<'a> {
  /// This call runs the load
  Owner(InFlight<'a>),
  /// A load of this partition is already running; the state now shows it
  Joined,
  /// A load of the partition already shown is running
  Busy,
}

impl SyncController {
  pub fn new(
    store: Arc<dyn SessionStore>,
    remote: Arc<dyn RemoteSource>,
    connectivity: Arc<dyn Connectivity>,
    options: SyncOptions,
  ) -> Self {
    let (state, _) = watch::channel(SyncState::default());
    Self {
      inner: Arc::new(Inner {
        store,
        remote,
        connectivity,
        options,
        state,
        in_flight: Mutex::new(HashSet::new()),
      }),
    }
  }

  /// Subscribe to state updates. New subscribers see the latest state at once.
  pub fn subscribe(&self) -> watch::Receiver<SyncState> {
    self.inner.state.subscribe()
  }

  /// Snapshot of the current state.
  pub fn state(&self) -> SyncState {
    self.inner.state.borrow().clone()
  }

  /// Load the sessions of `key`: publish cached rows immediately, then
  /// refresh from the remote source if the network is usable.
  ///
  /// While a load or refresh for the same key is still running this only
  /// switches the shown partition to `key`; the running one publishes into it.
  pub async fn load_booked_sessions(&self, key: &str) {
    let guard = match self.claim(key) {
      Claim::Owner(guard) => guard,
      Claim::Joined => {
        debug!(partition = %key, "Load already in flight, showing its partition");
        self.show_cached_while_loading(key).await;
        return;
      }
      Claim::Busy => {
        debug!(partition = %key, "Load already in flight");
        return;
      }
    };

    self.inner.state.send_modify(|s| {
      if s.last_partition_key.as_deref() != Some(key) {
        *s = SyncState {
          last_partition_key: Some(key.to_string()),
          ..SyncState::default()
        };
      }
      s.is_loading = true;
      s.error = None;
    });

    let (records, read_error) = self.read_cache(key).await;
    let connected = self.inner.connectivity.is_connected();
    self.publish_for(key, |s| {
      s.records = records;
      s.is_stale = !connected;
      if read_error.is_some() {
        s.error = read_error;
      }
    });

    if connected {
      self.run_refresh(key, guard).await;
    } else {
      debug!(partition = %key, "Offline, serving cached sessions");
      guard.release_with(|| self.publish_for(key, |s| s.is_loading = false));
    }
  }

  /// Re-entry check: refresh if the shown data is stale or errored, otherwise
  /// bring the flags in line with current connectivity.
  pub async fn check_for_stale_data_and_refresh_if_needed(&self) {
    if !self.inner.connectivity.is_connected() {
      self.inner.state.send_modify(|s| {
        s.is_stale = true;
        s.is_loading = false;
      });
      return;
    }

    let (key, needs_refresh) = {
      let state = self.inner.state.borrow();
      (state.last_partition_key.clone(), state.needs_refresh())
    };
    let Some(key) = key else {
      return;
    };

    if needs_refresh {
      self.refresh_partition(&key).await;
    } else {
      self.publish_for(&key, |s| {
        s.is_stale = false;
        s.is_loading = false;
      });
    }
  }

  /// React to a connectivity transition.
  ///
  /// On disconnect the shown records are kept and marked stale. On reconnect
  /// a stale or errored state is refreshed after the settle delay.
  pub async fn notify_network_status_changed(&self, connected: bool) {
    if !connected {
      self.inner.state.send_modify(|s| s.is_stale = true);
      return;
    }

    let key = {
      let state = self.inner.state.borrow();
      if !state.needs_refresh() {
        return;
      }
      state.last_partition_key.clone()
    };
    let Some(key) = key else {
      return;
    };

    tokio::time::sleep(self.inner.options.settle_delay).await;

    if !self.inner.connectivity.is_connected() {
      debug!(partition = %key, "Connection dropped again during settle delay");
      return;
    }
    let still_needed = {
      let state = self.inner.state.borrow();
      state.last_partition_key.as_deref() == Some(key.as_str()) && state.needs_refresh()
    };
    if !still_needed {
      debug!(partition = %key, "State changed during settle delay, skipping refresh");
      return;
    }
    self.refresh_partition(&key).await;
  }

  /// Refresh the current partition now, if the network is usable.
  pub async fn refresh(&self) {
    if !self.inner.connectivity.is_connected() {
      self.inner.state.send_modify(|s| s.is_stale = true);
      return;
    }

    let key = self.inner.state.borrow().last_partition_key.clone();
    if let Some(key) = key {
      self.refresh_partition(&key).await;
    }
  }

  /// Forward connectivity transitions from `rx` into
  /// [`notify_network_status_changed`](Self::notify_network_status_changed).
  ///
  /// The task ends when the sending side goes away.
  pub fn watch_connectivity(&self, mut rx: watch::Receiver<bool>) -> JoinHandle<()> {
    let controller = self.clone();
    tokio::spawn(async move {
      let mut last = *rx.borrow_and_update();
      while rx.changed().await.is_ok() {
        let connected = *rx.borrow_and_update();
        if connected == last {
          continue;
        }
        last = connected;

        // Spawned so a pending settle delay never holds up a later disconnect
        let controller = controller.clone();
        tokio::spawn(async move {
          controller.notify_network_status_changed(connected).await;
        });
      }
    })
  }

  fn begin(&self, key: &str) -> Option<InFlight<'_>> {
    let mut set = lock_set(&self.inner.in_flight);
    if !set.insert(key.to_string()) {
      return None;
    }
    Some(InFlight {
      set: &self.inner.in_flight,
      key: Some(key.to_string()),
    })
  }

  /// Take the in-flight guard for `key`, or switch the shown partition to a
  /// load of `key` that is already running.
  fn claim(&self, key: &str) -> Claim<'_> {
    let mut set = lock_set(&self.inner.in_flight);
    if set.insert(key.to_string()) {
      return Claim::Owner(InFlight {
        set: &self.inner.in_flight,
        key: Some(key.to_string()),
      });
    }

    // Under the lock: the running load cannot release between here and
    // publishing into the switched state
    let switched = self.inner.state.send_if_modified(|s| {
      if s.last_partition_key.as_deref() == Some(key) {
        return false;
      }
      *s = SyncState {
        last_partition_key: Some(key.to_string()),
        is_loading: true,
        ..SyncState::default()
      };
      true
    });
    if switched {
      Claim::Joined
    } else {
      Claim::Busy
    }
  }

  /// Fill a joined partition with its cached rows until the running load
  /// publishes its own outcome.
  async fn show_cached_while_loading(&self, key: &str) {
    let (records, read_error) = self.read_cache(key).await;
    let connected = self.inner.connectivity.is_connected();
    self.publish_for(key, |s| {
      // A refresh that already succeeded published fresher rows
      if s.last_synced_at.is_none() {
        s.records = records;
      }
      if !connected {
        s.is_stale = true;
      }
      if s.error.is_none() {
        s.error = read_error;
      }
    });
  }

  async fn read_cache(&self, key: &str) -> (Vec<CachedRecord>, Option<String>) {
    match self.inner.store.load_for_partition(key).await {
      Ok(records) => (records, None),
      Err(e) => {
        warn!(partition = %key, error = %e, "Failed to read cached sessions");
        (Vec::new(), Some(format!("Failed to read cached sessions: {}", e)))
      }
    }
  }

  async fn refresh_partition(&self, key: &str) {
    let Some(guard) = self.begin(key) else {
      debug!(partition = %key, "Refresh already in flight");
      return;
    };

    self.publish_for(key, |s| s.is_loading = true);
    self.run_refresh(key, guard).await;
  }

  /// Fetch, filter, persist and publish, then release `guard`.
  async fn run_refresh(&self, key: &str, guard: InFlight<'_>) {
    let remote = &self.inner.remote;
    let result = retry_with_backoff(&self.inner.options.retry, move || remote.fetch_all()).await;

    match result {
      Ok(sessions) => {
        let records = filter_for_partition(&sessions, key);

        let write_error = match self.inner.store.replace_partition(key, &records).await {
          Ok(()) => None,
          Err(e) => {
            warn!(partition = %key, error = %e, "Failed to cache sessions");
            Some(format!("Failed to cache sessions: {}", e))
          }
        };

        info!(
          partition = %key,
          fetched = sessions.len(),
          kept = records.len(),
          "Refreshed booked sessions"
        );

        guard.release_with(|| {
          self.publish_for(key, |s| {
            s.records = records;
            s.is_loading = false;
            s.is_stale = false;
            s.error = write_error;
            s.last_synced_at = Some(Utc::now());
          })
        });
      }
      Err(e) => {
        warn!(partition = %key, error = %e, "Refresh failed, keeping cached sessions");
        guard.release_with(|| {
          self.publish_for(key, |s| {
            s.is_loading = false;
            s.is_stale = true;
            s.error = Some(e.to_string());
          })
        });
      }
    }
  }

  /// Apply `f` only if `key` is still the partition being shown.
  fn publish_for(&self, key: &str, f: impl FnOnce(&mut SyncState)) {
    self.inner.state.send_if_modified(|s| {
      if s.last_partition_key.as_deref() != Some(key) {
        return false;
      }
      f(s);
      true
    });
  }
}
