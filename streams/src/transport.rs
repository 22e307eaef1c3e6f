use crate::TransportError;

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// SSE `event:` field, `"message"` when the server sent none.
    pub event: String,
    pub data: String,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    /// Untagged frame, as most of the server's progress updates are.
    pub fn message(data: impl Into<String>) -> Self {
        Self::new(crate::constants::DEFAULT_SSE_EVENT, data)
    }
}

/// Opens push channels. Implemented over SSE in production and by scripted
/// fakes in tests.
#[async_trait::async_trait]
pub trait EventTransport: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn EventChannel>, TransportError>;
}

/// A single open push connection.
#[async_trait::async_trait]
pub trait EventChannel: Send {
    /// Next frame. `Some(Err)` is a read error that may or may not have
    /// killed the channel (check [`EventChannel::is_alive`]); `None` means
    /// the server closed it.
    ///
    /// Must be cancel safe: the caller polls it inside `select!`.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Cheap liveness check used by the heartbeat.
    fn is_alive(&self) -> bool;

    fn close(&mut self);
}
