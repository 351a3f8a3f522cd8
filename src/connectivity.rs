//! Network reachability tracking.
//!
//! A network only counts as connected when it both claims internet access and
//! has been validated (something actually answered). An interface merely being
//! up is not enough.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

/// Snapshot of what the current network claims to offer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkCapabilities {
  pub has_internet: bool,
  pub validated: bool,
}

impl NetworkCapabilities {
  pub const ONLINE: Self = Self {
    has_internet: true,
    validated: true,
  };
  pub const OFFLINE: Self = Self {
    has_internet: false,
    validated: false,
  };

  pub fn is_connected(&self) -> bool {
    self.has_internet && self.validated
  }
}

/// Anything that can answer "is the network usable right now".
pub trait Connectivity: Send + Sync {
  fn is_connected(&self) -> bool;
}

/// Tracks network capabilities and broadcasts connected/disconnected transitions.
pub struct NetworkMonitor {
  capabilities: watch::Sender<NetworkCapabilities>,
  connected: watch::Sender<bool>,
}

impl NetworkMonitor {
  pub fn new(initial: NetworkCapabilities) -> Self {
    let (capabilities, _) = watch::channel(initial);
    let (connected, _) = watch::channel(initial.is_connected());
    Self {
      capabilities,
      connected,
    }
  }

  /// Record new capabilities. Subscribers are only woken when the derived
  /// connected flag flips.
  pub fn set_capabilities(&self, caps: NetworkCapabilities) {
    self.capabilities.send_replace(caps);

    let now_connected = caps.is_connected();
    let flipped = self.connected.send_if_modified(|connected| {
      if *connected == now_connected {
        return false;
      }
      *connected = now_connected;
      true
    });

    if flipped {
      info!(connected = now_connected, "Connectivity changed");
    }
  }

  pub fn capabilities(&self) -> NetworkCapabilities {
    *self.capabilities.borrow()
  }

  /// Stream of connected-flag transitions. The current value is readable
  /// immediately.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.connected.subscribe()
  }
}

impl Connectivity for NetworkMonitor {
  fn is_connected(&self) -> bool {
    *self.connected.borrow()
  }
}

/// Periodically probes an HTTP endpoint and feeds the result into a
/// [`NetworkMonitor`].
pub struct HttpProbe {
  client: reqwest::Client,
  url: Url,
  interval: Duration,
}

impl HttpProbe {
  pub fn new(url: &str, interval: Duration, timeout: Duration) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid probe url '{}': {}", url, e))?;
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .redirect(reqwest::redirect::Policy::none())
      .build()
      .map_err(|e| eyre!("Failed to create probe client: {}", e))?;

    Ok(Self {
      client,
      url,
      interval,
    })
  }

  /// Probe once.
  ///
  /// Reaching a server grants internet capability; the network is validated
  /// unless that server answered with a 5xx.
  pub async fn check(&self) -> NetworkCapabilities {
    match self.client.head(self.url.clone()).send().await {
      Ok(response) => NetworkCapabilities {
        has_internet: true,
        validated: !response.status().is_server_error(),
      },
      Err(e) => {
        debug!(error = %e, "Connectivity probe failed");
        NetworkCapabilities::OFFLINE
      }
    }
  }

  /// Probe forever on the configured interval, publishing into `monitor`.
  pub fn spawn(self, monitor: Arc<NetworkMonitor>) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(self.interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let caps = self.check().await;
        monitor.set_capabilities(caps);
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  #[test]
  fn test_requires_both_capabilities() {
    let half = NetworkCapabilities {
      has_internet: true,
      validated: false,
    };
    assert!(!half.is_connected());
    assert!(NetworkCapabilities::ONLINE.is_connected());

    let monitor = NetworkMonitor::new(half);
    assert!(!monitor.is_connected());
  }

  #[tokio::test]
  async fn test_subscribers_see_only_transitions() {
    let monitor = NetworkMonitor::new(NetworkCapabilities::OFFLINE);
    let mut rx = monitor.subscribe();

    // Capability change that does not flip the flag
    monitor.set_capabilities(NetworkCapabilities {
      has_internet: true,
      validated: false,
    });
    assert!(!rx.has_changed().unwrap());
    assert!(monitor.capabilities().has_internet);

    monitor.set_capabilities(NetworkCapabilities::ONLINE);
    assert!(rx.has_changed().unwrap());
    assert!(*rx.borrow_and_update());
    assert!(monitor.is_connected());
  }

  async fn serve_status(status: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut buf = vec![0u8; 1024];
      let _ = socket.read(&mut buf).await;
      let response = format!(
        "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        status
      );
      let _ = socket.write_all(response.as_bytes()).await;
    });
    format!("http://{}/", addr)
  }

  #[tokio::test]
  async fn test_probe_reaching_server_is_connected() {
    let url = serve_status("404 Not Found").await;
    let probe = HttpProbe::new(&url, Duration::from_secs(10), Duration::from_secs(5)).unwrap();

    assert_eq!(probe.check().await, NetworkCapabilities::ONLINE);
  }

  #[tokio::test]
  async fn test_probe_server_error_is_not_validated() {
    let url = serve_status("502 Bad Gateway").await;
    let probe = HttpProbe::new(&url, Duration::from_secs(10), Duration::from_secs(5)).unwrap();

    let caps = probe.check().await;
    assert!(caps.has_internet);
    assert!(!caps.validated);
  }

  #[tokio::test]
  async fn test_probe_unreachable_is_offline() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("http://{}/", addr);
    let probe = HttpProbe::new(&url, Duration::from_secs(10), Duration::from_secs(5)).unwrap();

    assert_eq!(probe.check().await, NetworkCapabilities::OFFLINE);
  }
}
