use config::ConfigError;

use crate::TetrisConfig;

const MIN_TIMEOUT_MS: u64 = 1_000;
const MAX_TIMEOUT_MS: u64 = 60_000;

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Message(message.into())
}

impl TetrisConfig {
    /// Fail fast on values the client cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let api = &self.api;
        let url = reqwest::Url::parse(&api.base_url)
            .map_err(|e| invalid(format!("api.base_url '{}': {e}", api.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "api.base_url must be http(s), got '{}'",
                url.scheme()
            )));
        }

        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&api.timeout_ms) {
            return Err(invalid(format!(
                "api.timeout_ms must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}, got {}",
                api.timeout_ms
            )));
        }
        check_backoff(
            "api",
            api.retry_delay_ms,
            api.max_retry_delay_ms,
            api.backoff_multiplier,
        )?;

        let stream = &self.stream;
        check_backoff(
            "stream",
            stream.reconnect_delay_ms,
            stream.max_reconnect_delay_ms,
            stream.backoff_multiplier,
        )?;
        if stream.heartbeat_interval_ms == 0 {
            return Err(invalid("stream.heartbeat_interval_ms must be positive"));
        }
        if stream.connection_timeout_ms == 0 {
            return Err(invalid("stream.connection_timeout_ms must be positive"));
        }

        let polling = &self.polling;
        if polling.active_ms == 0 {
            return Err(invalid("polling.active_ms must be positive"));
        }
        if !(polling.active_ms <= polling.idle_ms && polling.idle_ms <= polling.error_ms) {
            return Err(invalid(format!(
                "polling intervals must satisfy active <= idle <= error, got {}/{}/{}",
                polling.active_ms, polling.idle_ms, polling.error_ms
            )));
        }

        if self.session.id_length == 0 {
            return Err(invalid("session.id_length must be positive"));
        }

        for (name, path) in [
            ("join_session", &self.endpoints.join_session),
            ("status", &self.endpoints.status),
            ("progress_stream", &self.endpoints.progress_stream),
            ("reset", &self.endpoints.reset),
            ("trigger_hardware", &self.endpoints.trigger_hardware),
            ("upload", &self.endpoints.upload),
        ] {
            if !path.starts_with('/') {
                return Err(invalid(format!(
                    "endpoints.{name} must start with '/', got '{path}'"
                )));
            }
        }

        if self.diagnostics.enabled && self.diagnostics.interval_ms == 0 {
            return Err(invalid("diagnostics.interval_ms must be positive"));
        }

        Ok(())
    }
}

fn check_backoff(section: &str, base_ms: u64, max_ms: u64, multiplier: f64) -> Result<(), ConfigError> {
    if base_ms == 0 {
        return Err(invalid(format!("{section} base delay must be positive")));
    }
    if max_ms < base_ms {
        return Err(invalid(format!(
            "{section} max delay ({max_ms}) is below the base delay ({base_ms})"
        )));
    }
    if !multiplier.is_finite() || multiplier < 1.0 {
        return Err(invalid(format!(
            "{section} backoff multiplier must be >= 1, got {multiplier}"
        )));
    }
    Ok(())
}
