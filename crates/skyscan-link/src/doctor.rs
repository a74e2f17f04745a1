use anyhow::{Context, Result};

use crate::config::{ServerConfig, TelemetryConfig};

pub fn check_server(server: &ServerConfig) -> Result<()> {
    let (host, port) = server.bind.rsplit_once(':').context("server.bind must be host:port")?;
    anyhow::ensure!(!host.is_empty(), "server.bind host is empty");
    port.parse::<u16>().with_context(|| format!("server.bind port invalid: {}", port))?;
    Ok(())
}

pub fn check_telemetry(cfg: &TelemetryConfig) -> Result<()> {
    anyhow::ensure!(cfg.interval_ms >= 100, "telemetry.interval_ms too small; set >= 100");
    anyhow::ensure!(cfg.heartbeat_interval_ms >= 100, "telemetry.heartbeat_interval_ms too small; set >= 100");
    if let Some(t) = cfg.ack_timeout_s {
        anyhow::ensure!(
            t * 1000 > cfg.heartbeat_interval_ms,
            "telemetry.ack_timeout_s ({}s) must be longer than the heartbeat interval",
            t
        );
    }
    Ok(())
}
