use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::RetryPolicy;

const MIN_BACKOFF_MULTIPLIER: f64 = 1.0;
const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub connectivity: ConnectivityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the marketplace API
  pub url: String,
  /// Path of the booked-sessions collection, appended below the path of `url`
  #[serde(default = "default_sessions_path")]
  pub sessions_path: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// When false, nothing is persisted and every load starts empty
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Database location (defaults to $XDG_DATA_HOME/tutorsync/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  #[serde(default = "default_initial_backoff_ms")]
  pub initial_backoff_ms: u64,
  #[serde(default = "default_backoff_multiplier")]
  pub backoff_multiplier: f64,
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Pause after a reconnect before refreshing
  #[serde(default = "default_settle_delay_ms")]
  pub settle_delay_ms: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      initial_backoff_ms: default_initial_backoff_ms(),
      backoff_multiplier: default_backoff_multiplier(),
      max_retries: default_max_retries(),
      settle_delay_ms: default_settle_delay_ms(),
    }
  }
}

impl SyncConfig {
  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      initial_delay: Duration::from_millis(self.initial_backoff_ms),
      multiplier: self.backoff_multiplier,
      max_retries: self.max_retries,
    }
  }

  pub fn settle_delay(&self) -> Duration {
    Duration::from_millis(self.settle_delay_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
  /// URL probed to decide whether the network is usable (defaults to api.url)
  pub probe_url: Option<String>,
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_url: None,
      probe_interval_secs: default_probe_interval_secs(),
    }
  }
}

fn default_sessions_path() -> String {
  "/api/bookings".to_string()
}

fn default_timeout_secs() -> u64 {
  15
}

fn default_true() -> bool {
  true
}

fn default_initial_backoff_ms() -> u64 {
  1000
}

fn default_backoff_multiplier() -> f64 {
  2.0
}

fn default_max_retries() -> u32 {
  2
}

fn default_settle_delay_ms() -> u64 {
  1500
}

fn default_probe_interval_secs() -> u64 {
  10
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tutorsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tutorsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/tutorsync/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("tutorsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tutorsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  /// Parse and validate configuration from YAML text.
  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.api.url.trim().is_empty() {
      return Err(eyre!("api.url must not be empty"));
    }
    // NaN fails the range check too
    let multiplier = self.sync.backoff_multiplier;
    if !(MIN_BACKOFF_MULTIPLIER..=MAX_BACKOFF_MULTIPLIER).contains(&multiplier) {
      return Err(eyre!(
        "sync.backoff_multiplier must be between {} and {}, got {}",
        MIN_BACKOFF_MULTIPLIER,
        MAX_BACKOFF_MULTIPLIER,
        multiplier
      ));
    }
    Ok(())
  }

  /// Cache database path, falling back to the data directory.
  pub fn cache_path(&self) -> Result<PathBuf> {
    match &self.cache.path {
      Some(p) => Ok(p.clone()),
      None => crate::db::default_path(),
    }
  }

  /// Get the API token from the environment, if one is set.
  ///
  /// The token is opaque to this client and sent as a bearer credential.
  pub fn get_api_token() -> Option<String> {
    std::env::var("TUTORSYNC_API_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("api:\n  url: https://api.example.com\n").unwrap();

    assert_eq!(config.api.sessions_path, "/api/bookings");
    assert_eq!(config.api.timeout_secs, 15);
    assert!(config.cache.enabled);
    assert_eq!(config.sync.settle_delay(), Duration::from_millis(1500));
    assert_eq!(config.connectivity.probe_interval_secs, 10);

    let policy = config.sync.retry_policy();
    assert_eq!(policy.initial_delay, Duration::from_millis(1000));
    assert_eq!(policy.multiplier, 2.0);
    assert_eq!(policy.max_retries, 2);
  }

  #[test]
  fn test_overrides() {
    let yaml = r#"
api:
  url: https://api.example.com
  sessions_path: /v2/sessions
cache:
  enabled: false
sync:
  max_retries: 5
  settle_delay_ms: 200
"#;
    let config = Config::parse(yaml).unwrap();

    assert_eq!(config.api.sessions_path, "/v2/sessions");
    assert!(!config.cache.enabled);
    assert_eq!(config.sync.max_retries, 5);
    assert_eq!(config.sync.initial_backoff_ms, 1000);
    assert_eq!(config.sync.settle_delay(), Duration::from_millis(200));
  }

  #[test]
  fn test_rejects_empty_url() {
    assert!(Config::parse("api:\n  url: \"  \"\n").is_err());
  }

  #[test]
  fn test_rejects_shrinking_backoff() {
    let yaml = "api:\n  url: https://x\nsync:\n  backoff_multiplier: 0.5\n";
    assert!(Config::parse(yaml).is_err());
  }

  #[test]
  fn test_rejects_runaway_backoff() {
    for multiplier in ["1e300", ".inf", ".nan", "10.5"] {
      let yaml = format!(
        "api:\n  url: https://x\nsync:\n  backoff_multiplier: {}\n",
        multiplier
      );
      assert!(Config::parse(&yaml).is_err(), "accepted {}", multiplier);
    }

    let yaml = "api:\n  url: https://x\nsync:\n  backoff_multiplier: 10\n";
    assert_eq!(Config::parse(yaml).unwrap().sync.backoff_multiplier, 10.0);
  }
}
