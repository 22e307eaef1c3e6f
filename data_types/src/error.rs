use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};

/// Failure bucket assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Connectivity lost or host unreachable.
    Network,
    /// Session invalid or expired.
    Session,
    /// Caller side bad input (4xx).
    Validation,
    /// 5xx or anything unrecognised.
    Server,
    /// Request exceeded its deadline.
    Timeout,
    /// Nothing to classify on (no message, no status).
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::Network,
        ErrorKind::Session,
        ErrorKind::Validation,
        ErrorKind::Server,
        ErrorKind::Timeout,
        ErrorKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Session => "SESSION",
            Self::Validation => "VALIDATION",
            Self::Server => "SERVER",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Classification result for a single failure. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub retryable: bool,
    pub user_message: String,
}

/// The classifier's view of a raw failure.
///
/// Carries the error name (a type-ish label such as `"TimeoutError"`), the
/// display message and, for HTTP failures, the response status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Failure {
    pub name: Cow<'static, str>,
    pub message: String,
    pub status: Option<u16>,
}

impl Failure {
    pub fn new(name: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Failure that only carries a message, named `"Error"`.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.name, status, self.message),
            None => write!(f, "{}: {}", self.name, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_serde_matches_display() {
        for kind in ErrorKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn test_failure_display() {
        let failure = Failure::new("HttpError", "HTTP 503: Service Unavailable").with_status(503);
        assert_eq!(
            failure.to_string(),
            "HttpError (503): HTTP 503: Service Unavailable"
        );
        assert_eq!(Failure::message("boom").to_string(), "Error: boom");
    }
}
