use std::{borrow::Cow, time::Duration};

use data_types::Failure;

/// A single HTTP exchange failed.
///
/// Variants describe what happened on the wire; the bucket it belongs to
/// is decided by `recovery::classify` on [`RequestError::to_failure`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RequestError {
    /// No response within the per-request deadline.
    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Connect, send or body transfer failed.
    #[error("network error: {message}")]
    Network { message: Cow<'static, str> },

    /// Non-2xx response.
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: Cow<'static, str> },

    /// Body was not the JSON we expected.
    #[error("invalid response body: {message}")]
    Decode { message: Cow<'static, str> },

    /// The request could not be built (bad URL, header, ...).
    #[error("invalid request: {message}")]
    Build { message: Cow<'static, str> },
}

impl RequestError {
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    pub fn network(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn status(status: u16, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::Status {
            status,
            reason: reason.into(),
        }
    }

    pub fn decode(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn build(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }

    /// Map a transport level error, `timeout` being the deadline in force.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::timeout(timeout)
        } else if err.is_builder() {
            Self::build(err.to_string())
        } else if err.is_decode() {
            Self::decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::status(status.as_u16(), status.canonical_reason().unwrap_or("Unknown"))
        } else {
            Self::network(err.to_string())
        }
    }

    pub fn from_middleware(err: reqwest_middleware::Error, timeout: Duration) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => Self::from_reqwest(e, timeout),
            reqwest_middleware::Error::Middleware(e) => Self::network(format!("{e:#}")),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The classifier's view of this error.
    pub fn to_failure(&self) -> Failure {
        let name = match self {
            Self::Timeout { .. } => "TimeoutError",
            Self::Network { .. } => "NetworkError",
            Self::Status { .. } => "HttpError",
            Self::Decode { .. } => "DecodeError",
            Self::Build { .. } => "BuildError",
        };
        let failure = Failure::new(name, self.to_string());
        match self.status_code() {
            Some(status) => failure.with_status(status),
            None => failure,
        }
    }
}
