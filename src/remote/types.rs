use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A booked session as returned by the API.
///
/// The endpoint returns every session in the system; nothing here is scoped
/// to a tutor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSession {
  pub id: i64,
  /// Tutor the session belongs to. Some deployments send this as a number.
  #[serde(alias = "tutor_id", deserialize_with = "deserialize_id_string")]
  pub tutor_id: String,
  /// Booking student; null while the slot is unassigned
  #[serde(default, alias = "student_name")]
  pub student_name: Option<String>,
  #[serde(default, alias = "course_name")]
  pub course_name: String,
  #[serde(default, alias = "location_name")]
  pub location_name: String,
  #[serde(default, alias = "date_time")]
  pub date_time: String,
  #[serde(default)]
  pub cost: f64,
  #[serde(default, alias = "contact_info")]
  pub contact_info: String,
}

/// Response body of the sessions endpoint: either a bare array or wrapped in
/// a `data` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SessionsResponse {
  Bare(Vec<RemoteSession>),
  Envelope { data: Vec<RemoteSession> },
}

impl SessionsResponse {
  pub(crate) fn into_sessions(self) -> Vec<RemoteSession> {
    match self {
      SessionsResponse::Bare(sessions) => sessions,
      SessionsResponse::Envelope { data } => data,
    }
  }
}

/// Accept an identifier given either as a JSON string or a JSON number.
fn deserialize_id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!(
      "expected string or number id, got {}",
      other
    ))),
  }
}
