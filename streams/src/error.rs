use std::{borrow::Cow, time::Duration};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The stream endpoint could not be reached.
    #[error("failed to connect to '{url}': {message}")]
    Connect {
        url: String,
        message: Cow<'static, str>,
    },

    /// Handshake did not complete within the connection timeout.
    #[error("stream handshake timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The endpoint answered, but not with a stream.
    #[error("stream endpoint returned HTTP {status}")]
    Status { status: u16 },

    /// Error while reading an open stream.
    #[error("stream error: {message}")]
    Stream { message: Cow<'static, str> },

    #[error("invalid stream url '{url}': {message}")]
    InvalidUrl {
        url: String,
        message: Cow<'static, str>,
    },
}

impl TransportError {
    pub fn connect(url: impl Into<String>, message: impl Into<Cow<'static, str>>) -> Self {
        Self::Connect {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    pub fn status(status: u16) -> Self {
        Self::Status { status }
    }

    pub fn stream(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    pub fn invalid_url(url: impl Into<String>, message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }
}
