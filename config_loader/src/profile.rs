use crate::TetrisConfig;

/// Runtime environment adjustment applied once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    Standard,
    /// Low-power kiosk hardware: slower heartbeat and idle polling.
    Constrained,
    /// Served from loopback: short timeouts, verbose logs.
    Development,
}

const CONSTRAINED_MAX_CPUS: usize = 4;
const CONSTRAINED_HEARTBEAT_MS: u64 = 60_000;
const CONSTRAINED_IDLE_POLL_MS: u64 = 15_000;
const DEVELOPMENT_TIMEOUT_MS: u64 = 10_000;

impl DeviceProfile {
    /// Detect the profile for this process and the configured server.
    pub fn detect(config: &TetrisConfig) -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::classify(&config.api.base_url, std::env::consts::OS, cpus)
    }

    pub fn classify(base_url: &str, os: &str, cpus: usize) -> Self {
        let host = reqwest::Url::parse(base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned));

        match host.as_deref() {
            Some("localhost") | Some("127.0.0.1") | Some("[::1]") => Self::Development,
            _ if os == "linux" && cpus <= CONSTRAINED_MAX_CPUS => Self::Constrained,
            _ => Self::Standard,
        }
    }
}

impl TetrisConfig {
    /// Apply a device profile. Consumes the config so the adjustment
    /// happens before anything holds on to it.
    pub fn with_profile(mut self, profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Standard => {}
            DeviceProfile::Constrained => {
                self.stream.heartbeat_interval_ms = CONSTRAINED_HEARTBEAT_MS;
                self.polling.idle_ms = CONSTRAINED_IDLE_POLL_MS;
            }
            DeviceProfile::Development => {
                self.api.timeout_ms = DEVELOPMENT_TIMEOUT_MS;
                self.logging.level = "debug".to_string();
            }
        }
        self
    }
}
