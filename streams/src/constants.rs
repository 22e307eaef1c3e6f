/// Query parameter carrying the session id on the stream URL.
pub const SESSION_QUERY_PARAM: &str = "session_id";

/// Default max reconnection attempts
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default initial reconnection delay in milliseconds
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// Maximum reconnection delay in milliseconds (30 seconds)
pub const MAX_RECONNECT_DELAY_MS: u64 = 30000;

/// Default liveness check interval in milliseconds
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30000;

/// Default deadline for the stream handshake in milliseconds
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 15000;

/// SSE event name browsers report for untagged frames
pub const DEFAULT_SSE_EVENT: &str = "message";

/// Frame `event` value the server sends as a handshake ack
pub const HANDSHAKE_EVENT: &str = "connected";

/// Server side `event` value re-keyed before publishing
pub const SERVER_ERROR_EVENT: &str = "error";
