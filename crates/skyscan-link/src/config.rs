use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` the operator console connects to.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:5000".into() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Land the vehicle when the client has not acked for this long.
    /// Unset disables the check.
    pub ack_timeout_s: Option<u64>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { interval_ms: 1000, heartbeat_interval_ms: 2000, ack_timeout_s: None }
    }
}

impl TelemetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn ack_timeout(&self) -> Option<Duration> {
        self.ack_timeout_s.map(Duration::from_secs)
    }
}
