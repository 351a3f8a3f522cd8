//! Remote source of booked sessions.

mod client;
mod types;

pub use client::HttpRemoteSource;
pub use types::RemoteSession;

use async_trait::async_trait;

/// Classified failure of a remote fetch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
  /// The request did not complete in time
  #[error("Request timed out")]
  Timeout,

  /// The server could not be reached or the connection broke mid-request
  #[error("Connection error: {0}")]
  Connection(String),

  /// The server answered with a non-success status
  #[error("Server error {status}: {message}")]
  Server { status: u16, message: String },

  /// Anything else, including undecodable responses
  #[error("Unexpected error: {0}")]
  Unknown(String),
}

impl FetchError {
  /// Whether the failure is a transient transport problem worth retrying.
  ///
  /// Server answers are never retried, whatever their status.
  pub fn is_retryable(&self) -> bool {
    matches!(self, FetchError::Timeout | FetchError::Connection(_))
  }
}

/// Source of truth for booked sessions.
#[async_trait]
pub trait RemoteSource: Send + Sync {
  /// Fetch the full, unfiltered set of sessions.
  async fn fetch_all(&self) -> Result<Vec<RemoteSession>, FetchError>;
}
