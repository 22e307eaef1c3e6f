//! Event names shared by producers and consumers.

pub const CONNECTED: &str = "connected";
pub const DISCONNECTED: &str = "disconnected";
pub const RECONNECTING: &str = "reconnecting";
pub const STATE_CHANGED: &str = "state_changed";
pub const CONNECTION_RESTORED: &str = "connection_restored";
pub const MAX_RECONNECT_ATTEMPTS_REACHED: &str = "max_reconnect_attempts_reached";
pub const ERROR: &str = "error";

/// Default key for stream frames without an `event` tag.
pub const PROGRESS_UPDATE: &str = "progress_update";

pub const REQUEST_SUCCESS: &str = "request_success";
pub const REQUEST_ERROR: &str = "request_error";
pub const UPLOAD_SUCCESS: &str = "upload_success";
pub const UPLOAD_ERROR: &str = "upload_error";

pub const SESSION_STARTED: &str = "session_started";
pub const NETWORK_ONLINE: &str = "network_online";
pub const NETWORK_OFFLINE: &str = "network_offline";
pub const PERFORMANCE_UPDATE: &str = "performance_update";

pub const NOTIFICATION: &str = "notification";
pub const NOTIFICATION_DISMISSED: &str = "notification_dismissed";
pub const RETRY_REQUESTED: &str = "retry_requested";
pub const RELOAD_REQUESTED: &str = "reload_requested";

/// Frames tagged `error` by the server are re-keyed so they never collide
/// with client-side [`ERROR`] events.
pub const SSE_ERROR: &str = "sse_error";
/// Emitted after every dispatched frame with `{event_type, data}`.
pub const SSE_MESSAGE: &str = "sse_message";

pub const INITIALIZED: &str = "initialized";
pub const FILE_UPLOADED: &str = "file_uploaded";
pub const STEP_ANALYSIS_STARTED: &str = "step_analysis_started";
pub const SYSTEM_RESET: &str = "system_reset";
pub const STATUS_RECEIVED: &str = "status_received";
pub const HARDWARE_TRIGGERED: &str = "hardware_triggered";
