use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of the random part of a session id when none is configured.
pub const DEFAULT_SESSION_ID_LENGTH: usize = 16;

/// A client generated session, confirmed by the server on join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle of the push stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generates an opaque session id: `session_<random>_<unix millis>`.
///
/// The random part is alphanumeric and `length` characters long.
pub fn generate_session_id(length: usize) -> String {
    let mut random = String::with_capacity(length);
    while random.len() < length {
        let chunk = Uuid::new_v4().simple().to_string();
        let needed = length - random.len();
        random.push_str(&chunk[..needed.min(chunk.len())]);
    }

    format!("session_{}_{}", random, Utc::now().timestamp_millis())
}

/// Generates a request correlation id, sent as `X-Request-ID`.
pub fn generate_request_id() -> String {
    format!("req_{}", Uuid::now_v7().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id(DEFAULT_SESSION_ID_LENGTH);
        let parts: Vec<&str> = id.split('_').collect();

        assert_eq!(parts.len(), 3, "unexpected session id: {id}");
        assert_eq!(parts[0], "session");
        assert_eq!(parts[1].len(), DEFAULT_SESSION_ID_LENGTH);
        assert!(parts[1].chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(parts[2].parse::<i64>().is_ok());
    }

    #[test]
    fn test_session_id_longer_than_uuid() {
        let id = generate_session_id(40);
        let random = id.split('_').nth(1).unwrap();
        assert_eq!(random.len(), 40);
    }

    #[test]
    fn test_session_ids_unique() {
        let ids: HashSet<String> = (0..500).map(|_| generate_session_id(16)).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_request_id_prefix() {
        let id = generate_request_id();
        assert!(id.starts_with("req_"));
        assert_eq!(id.len(), 4 + 32);
    }

    #[test]
    fn test_connection_state_serde() {
        let json = serde_json::to_string(&ConnectionState::Reconnecting).unwrap();
        assert_eq!(json, "\"reconnecting\"");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Failed.to_string(), "failed");
    }
}
