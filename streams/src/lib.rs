//! Push stream handling: a transport abstraction, the SSE implementation
//! and the [`StreamManager`] state machine that keeps one connection per
//! session alive.

pub mod constants;
pub mod dispatch;
pub mod error;
pub mod manager;
#[cfg(feature = "sse")]
pub mod sse;
pub mod transport;

pub use error::TransportError;
pub use manager::{StateSnapshot, StreamManager, StreamSettings};
#[cfg(feature = "sse")]
pub use sse::SseTransport;
pub use transport::{EventChannel, EventTransport, Frame};
