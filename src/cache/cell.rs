use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use super::storage::{NoopSessionStore, SqliteSessionStore};
use super::traits::SessionStore;

/// Lazily opened store handle.
///
/// The database is opened at most once for the lifetime of the cell, on first
/// use; a failed open is retried by the next caller. Construct one per process
/// and hand it (or the stores it yields) to each controller.
pub struct StoreCell {
  path: Option<PathBuf>,
  store: OnceCell<Arc<dyn SessionStore>>,
}

impl StoreCell {
  /// A cell that opens an SQLite store at `path` on first use.
  pub fn sqlite(path: PathBuf) -> Self {
    Self {
      path: Some(path),
      store: OnceCell::new(),
    }
  }

  /// A cell whose store caches nothing.
  pub fn disabled() -> Self {
    Self {
      path: None,
      store: OnceCell::new(),
    }
  }

  /// Get the store, opening it if this is the first call.
  pub async fn get(&self) -> Result<Arc<dyn SessionStore>> {
    let store = self
      .store
      .get_or_try_init(|| open_store(self.path.clone()))
      .await?;

    Ok(Arc::clone(store))
  }
}

async fn open_store(path: Option<PathBuf>) -> Result<Arc<dyn SessionStore>> {
  let Some(path) = path else {
    return Ok(Arc::new(NoopSessionStore));
  };

  let store = tokio::task::spawn_blocking(move || SqliteSessionStore::open(&path))
    .await
    .map_err(|e| eyre!("Store open task failed: {}", e))??;
  info!("Opened session cache");

  Ok(Arc::new(store))
}
