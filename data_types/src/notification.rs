use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Action labels understood by the notification center.
pub mod actions {
    pub const CLOSE: &str = "Close";
    pub const OK: &str = "OK";
    pub const RETRY: &str = "Retry";
    pub const RELOAD: &str = "Reload";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Error,
    Warning,
    Success,
    Info,
}

/// User-facing descriptor of an error or recovery event.
///
/// Rendering is up to the consumer. A zero `duration_ms` means the
/// notification stays until dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub duration_ms: u64,
    pub actions: Vec<String>,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().simple().to_string(),
            kind,
            title: title.into(),
            message: message.into(),
            duration_ms: 0,
            actions: Vec::new(),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    #[inline]
    pub fn is_sticky(&self) -> bool {
        self.duration_ms == 0
    }

    #[inline]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}
