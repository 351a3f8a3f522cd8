use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::error::Error as _;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::types::{RemoteSession, SessionsResponse};
use super::{FetchError, RemoteSource};
use crate::config::Config;

/// Longest server error body carried into an error message
const MAX_ERROR_BODY: usize = 200;

/// HTTP client for the booked-sessions endpoint.
#[derive(Clone)]
pub struct HttpRemoteSource {
  client: reqwest::Client,
  endpoint: Url,
}

impl HttpRemoteSource {
  pub fn new(config: &Config) -> Result<Self> {
    let endpoint = endpoint_url(&config.api.url, &config.api.sessions_path)?;

    Self::with_endpoint(
      endpoint,
      Duration::from_secs(config.api.timeout_secs),
      Config::get_api_token(),
    )
  }

  /// Build a client for an explicit endpoint URL.
  pub fn with_endpoint(endpoint: Url, timeout: Duration, token: Option<String>) -> Result<Self> {
    let mut headers = HeaderMap::new();
    if let Some(token) = token {
      let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| eyre!("API token is not a valid header value: {}", e))?;
      headers.insert(AUTHORIZATION, value);
    }

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, endpoint })
  }
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
  async fn fetch_all(&self) -> Result<Vec<RemoteSession>, FetchError> {
    // No tutor filter is sent: the endpoint only serves the full collection
    let response = self
      .client
      .get(self.endpoint.clone())
      .send()
      .await
      .map_err(classify)?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(FetchError::Server {
        status: status.as_u16(),
        message: truncate_body(&body, status.canonical_reason()),
      });
    }

    let bytes = response.bytes().await.map_err(classify)?;
    let parsed: SessionsResponse = serde_json::from_slice(&bytes)
      .map_err(|e| FetchError::Unknown(format!("Failed to parse sessions: {}", e)))?;

    let sessions = parsed.into_sessions();
    debug!(count = sessions.len(), "Fetched booked sessions");
    Ok(sessions)
  }
}

/// Map a reqwest failure onto the fetch taxonomy.
/// Append `path` below the path of `base`, so a base like `https://host/v1`
/// keeps its prefix even when `path` starts with a slash.
fn endpoint_url(base: &str, path: &str) -> Result<Url> {
  let mut url = Url::parse(base).map_err(|e| eyre!("Invalid api.url '{}': {}", base, e))?;
  if !url.path().ends_with('/') {
    let prefixed = format!("{}/", url.path());
    url.set_path(&prefixed);
  }
  url
    .join(path.trim_start_matches('/'))
    .map_err(|e| eyre!("Invalid api.sessions_path '{}': {}", path, e))
}

fn classify(err: reqwest::Error) -> FetchError {
  if err.is_timeout() {
    return FetchError::Timeout;
  }
  if err.is_connect() || err.is_request() || err.is_body() {
    return FetchError::Connection(err.to_string());
  }
  if err.is_decode() {
    return FetchError::Unknown(err.to_string());
  }

  // Anything surfacing as a raw I/O failure is treated as transport-level
  let mut source = err.source();
  while let Some(inner) = source {
    if inner.downcast_ref::<std::io::Error>().is_some() {
      return FetchError::Connection(err.to_string());
    }
    source = inner.source();
  }

  FetchError::Unknown(err.to_string())
}

fn truncate_body(body: &str, reason: Option<&str>) -> String {
  let body = body.trim();
  if body.is_empty() {
    return reason.unwrap_or("no response body").to_string();
  }
  match body.char_indices().nth(MAX_ERROR_BODY) {
    Some((idx, _)) => format!("{}...", &body[..idx]),
    None => body.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;
  use tokio::sync::oneshot;

  /// Serve one canned HTTP response and report the request line received.
  async fn serve_once(
    status: &'static str,
    body: &'static str,
    delay: Duration,
  ) -> (Url, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut buf = vec![0u8; 4096];
      let n = socket.read(&mut buf).await.unwrap();
      let request = String::from_utf8_lossy(&buf[..n]).to_string();
      let request_line = request.lines().next().unwrap_or_default().to_string();
      let _ = tx.send(request_line);

      tokio::time::sleep(delay).await;
      let response = format!(
        "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
      );
      let _ = socket.write_all(response.as_bytes()).await;
    });

    let url = Url::parse(&format!("http://{}/api/bookings", addr)).unwrap();
    (url, rx)
  }

  fn source(url: Url, timeout: Duration) -> HttpRemoteSource {
    HttpRemoteSource::with_endpoint(url, timeout, None).unwrap()
  }

  #[tokio::test]
  async fn test_fetches_full_collection_without_filter() {
    let body = r#"[{"id":1,"tutorId":"5","studentName":"A"},{"id":3,"tutorId":"9","studentName":"B"}]"#;
    let (url, request_line) = serve_once("200 OK", body, Duration::ZERO).await;

    let sessions = source(url, Duration::from_secs(5)).fetch_all().await.unwrap();

    assert_eq!(sessions.len(), 2);
    assert_eq!(request_line.await.unwrap(), "GET /api/bookings HTTP/1.1");
  }

  #[tokio::test]
  async fn test_server_error_is_classified_with_status() {
    let (url, _) = serve_once("503 Service Unavailable", "maintenance", Duration::ZERO).await;

    let err = source(url, Duration::from_secs(5))
      .fetch_all()
      .await
      .unwrap_err();

    assert_eq!(
      err,
      FetchError::Server {
        status: 503,
        message: "maintenance".into()
      }
    );
    assert!(!err.is_retryable());
  }

  #[tokio::test]
  async fn test_malformed_body_is_unknown() {
    let (url, _) = serve_once("200 OK", "{not json", Duration::ZERO).await;

    let err = source(url, Duration::from_secs(5))
      .fetch_all()
      .await
      .unwrap_err();

    assert!(matches!(err, FetchError::Unknown(_)));
  }

  #[tokio::test]
  async fn test_slow_server_times_out() {
    let (url, _) = serve_once("200 OK", "[]", Duration::from_secs(2)).await;

    let err = source(url, Duration::from_millis(100))
      .fetch_all()
      .await
      .unwrap_err();

    assert_eq!(err, FetchError::Timeout);
  }

  #[tokio::test]
  async fn test_refused_connection_is_retryable() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("http://{}/api/bookings", addr)).unwrap();
    let err = source(url, Duration::from_secs(5))
      .fetch_all()
      .await
      .unwrap_err();

    assert!(matches!(err, FetchError::Connection(_)));
    assert!(err.is_retryable());
  }

  #[test]
  fn test_endpoint_keeps_base_path_prefix() {
    let url = endpoint_url("https://host.example/v1", "/api/bookings").unwrap();
    assert_eq!(url.as_str(), "https://host.example/v1/api/bookings");

    let url = endpoint_url("https://host.example/v1/", "api/bookings").unwrap();
    assert_eq!(url.as_str(), "https://host.example/v1/api/bookings");

    let url = endpoint_url("https://api.example.com", "/api/bookings").unwrap();
    assert_eq!(url.as_str(), "https://api.example.com/api/bookings");
  }

  #[test]
  fn test_endpoint_rejects_bad_base() {
    assert!(endpoint_url("not a url", "/api/bookings").is_err());
  }

  #[test]
  fn test_truncate_body() {
    assert_eq!(truncate_body("  ", Some("Not Found")), "Not Found");
    let long = "x".repeat(500);
    assert_eq!(truncate_body(&long, None).len(), MAX_ERROR_BODY + 3);
  }
}
