use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod loader;
pub mod logging;
pub mod profile;
pub mod validate;

pub use loader::{HttpSource, load_config, load_config_async};
pub use logging::{FileLogConfig, LogFormat, LoggingConfig};
pub use profile::DeviceProfile;

// re-export for convenience
pub use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};

/// Top level client configuration.
///
/// Every section has defaults, so a config file only needs the keys it
/// overrides. Validated once by [`TetrisConfig::validate`]; read-only after
/// the optional [`DeviceProfile`] adjustment.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct TetrisConfig {
    pub api: ApiConfig,
    pub stream: StreamConfig,
    pub polling: PollingIntervals,
    pub session: SessionConfig,
    pub endpoints: Endpoints,
    pub messages: Messages,
    pub logging: LoggingConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Absolute base URL every endpoint path is joined to.
    pub base_url: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_ms: 30_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub heartbeat_interval_ms: u64,
    pub connection_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: 5,
            reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            heartbeat_interval_ms: 30_000,
            connection_timeout_ms: 15_000,
        }
    }
}

impl StreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

/// Poll delay per system state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingIntervals {
    pub active_ms: u64,
    pub idle_ms: u64,
    pub error_ms: u64,
}

impl Default for PollingIntervals {
    fn default() -> Self {
        Self {
            active_ms: 2_000,
            idle_ms: 10_000,
            error_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub id_length: usize,
    /// Value sent as `type` when joining a session.
    pub kind: String,
    /// How long an abandoned retry record is kept.
    pub retry_record_ttl_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            id_length: 16,
            kind: "desktop".to_string(),
            retry_record_ttl_ms: 600_000,
        }
    }
}

impl SessionConfig {
    pub fn retry_record_ttl(&self) -> Duration {
        Duration::from_millis(self.retry_record_ttl_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Endpoints {
    pub join_session: String,
    pub status: String,
    pub status_stream: String,
    pub progress_stream: String,
    pub reset: String,
    pub sessions: String,
    pub trigger_hardware: String,
    pub step_analysis: String,
    pub upload: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            join_session: "/desktop/api/join_session".to_string(),
            status: "/desktop/api/status".to_string(),
            status_stream: "/desktop/api/status_stream".to_string(),
            progress_stream: "/desktop/api/progress_stream".to_string(),
            reset: "/desktop/api/reset".to_string(),
            sessions: "/desktop/api/sessions".to_string(),
            trigger_hardware: "/desktop/api/trigger_hardware".to_string(),
            step_analysis: "/desktop/api/step_analysis".to_string(),
            upload: "/mobile/api/upload".to_string(),
        }
    }
}

/// User-facing copy used by the recovery coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Messages {
    pub network: String,
    pub network_offline: String,
    pub session_expired: String,
    pub session_restored: String,
    pub server_error: String,
    pub validation_error: String,
    pub timeout: String,
    pub connection_lost: String,
    pub connection_restored: String,
    pub generic: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            network: "Please check your network connection.".to_string(),
            network_offline: "Check your internet connection and try again.".to_string(),
            session_expired: "Your session has expired. Please reload the page.".to_string(),
            session_restored: "Your session was restored automatically.".to_string(),
            server_error: "A server error occurred. Please try again shortly.".to_string(),
            validation_error: "Please check your input.".to_string(),
            timeout: "The request timed out.".to_string(),
            connection_lost: "Lost connection to the server.".to_string(),
            connection_restored: "Connection to the server restored.".to_string(),
            generic: "An error occurred.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 60_000,
        }
    }
}

impl DiagnosticsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl TetrisConfig {
    /// Load from an optional file, then validate.
    ///
    /// Without a path the defaults are used as-is.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config: Self = match path {
            Some(path) => load_config(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Fetch from a remote endpoint, then validate.
    pub async fn load_remote(uri: &str, format: FileFormat) -> Result<Self, ConfigError> {
        let config: Self = load_config_async(uri, format).await?;
        config.validate()?;
        Ok(config)
    }

    /// Absolute URL for an endpoint path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api.base_url.trim_end_matches('/'), path)
    }
}
