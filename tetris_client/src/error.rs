use std::borrow::Cow;

use http_client::RequestError;
use streams::TransportError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The operation needs a session and none was started.
    #[error("no active session, start one first")]
    NoSession,

    /// The server answered with `{"success": false}`.
    #[error("{operation} rejected by server: {message}")]
    Rejected {
        operation: Cow<'static, str>,
        message: Cow<'static, str>,
    },
}

impl ClientError {
    pub fn rejected(operation: impl Into<Cow<'static, str>>, message: impl Into<Cow<'static, str>>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// HTTP status behind the error, if there was a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Request(e) => e.status_code(),
            Self::Transport(TransportError::Status { status }) => Some(*status),
            _ => None,
        }
    }
}
