pub mod autodetect;
pub mod geo;
pub mod handle;
pub mod mav;
pub mod mode;
pub mod safety;
pub mod sim;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

pub use handle::{ManualAxis, TelemetryProbe, VehicleHandle, VehicleLink};
pub use mode::{FlightMode, GpsFixQuality};

use autodetect::{autodetect_fc, default_candidate_bauds, default_candidate_devs, AutodetectResult};
use mav::{MavIds, MavVehicle};
use sim::{SimConfig, SimVehicle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Serial,
    Tcp,
    Sim,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub connection: ConnectionKind,

    /// If true, probe candidate serial ports/bauds and pick the first that
    /// yields a MAVLink HEARTBEAT.
    pub autodetect: bool,

    /// When autodetect=false: fixed port config
    pub serial_dev: Option<String>,
    pub baud: u32,

    pub candidate_devs: Option<Vec<String>>,
    pub candidate_bauds: Option<Vec<u32>>,

    /// Heartbeat wait per probe attempt
    pub heartbeat_timeout_ms: Option<u64>,

    /// SITL or telemetry bridge, `host:port`
    pub tcp_address: String,

    /// MAVLink ids we use (ground station side)
    pub sys_id: u8,
    pub comp_id: u8,

    /// target system/component (FC side). 1/1 is common for ArduPilot.
    pub target_sys: u8,
    pub target_comp: u8,

    /// Companion heartbeat send rate. Default 1 Hz.
    pub send_heartbeat_hz: Option<f32>,

    /// Minimum spacing of manual nudges on the same axis.
    pub manual_min_interval_ms: u64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionKind::Serial,
            autodetect: false,
            serial_dev: Some("/dev/ttyACM0".into()),
            baud: 115200,
            candidate_devs: None,
            candidate_bauds: None,
            heartbeat_timeout_ms: None,
            tcp_address: "127.0.0.1:5760".into(),
            sys_id: 255,
            comp_id: 190,
            target_sys: 1,
            target_comp: 1,
            send_heartbeat_hz: None,
            manual_min_interval_ms: 200,
        }
    }
}

impl VehicleConfig {
    fn ids(&self) -> MavIds {
        MavIds {
            sys_id: self.sys_id,
            comp_id: self.comp_id,
            target_sys: self.target_sys,
            target_comp: self.target_comp,
        }
    }
}

pub fn run_fc_autodetect(cfg: &VehicleConfig) -> AutodetectResult {
    let devs = cfg.candidate_devs.clone().unwrap_or_else(default_candidate_devs);
    let bauds = cfg.candidate_bauds.clone().unwrap_or_else(default_candidate_bauds);
    let timeout = Duration::from_millis(cfg.heartbeat_timeout_ms.unwrap_or(1500));
    autodetect_fc(&devs, &bauds, timeout)
}

pub fn resolve_fc_port(cfg: &VehicleConfig) -> Result<(String, u32)> {
    if cfg.autodetect {
        let res = run_fc_autodetect(cfg);
        if let Some((dev, baud)) = res.chosen {
            return Ok((dev, baud));
        }
        anyhow::bail!("fc autodetect failed: no heartbeat found");
    }
    let dev = cfg.serial_dev.clone().context("vehicle.serial_dev missing (autodetect=false)")?;
    Ok((dev, cfg.baud))
}

/// Open the configured vehicle link. Serial autodetect blocks for up to
/// one heartbeat timeout per candidate, so call this off the async runtime.
pub fn open_vehicle(cfg: &VehicleConfig, sim: &SimConfig) -> Result<VehicleLink> {
    let hb_hz = cfg.send_heartbeat_hz.unwrap_or(1.0);
    let manual_gap = Duration::from_millis(cfg.manual_min_interval_ms);
    match cfg.connection {
        ConnectionKind::Serial => {
            let (dev, baud) = resolve_fc_port(cfg)?;
            let v = MavVehicle::open_serial(&dev, baud, cfg.ids(), hb_hz, manual_gap)?;
            Ok(VehicleLink::new(Arc::new(v), format!("{} @ {}", dev, baud)))
        }
        ConnectionKind::Tcp => {
            let url = format!("tcpout:{}", cfg.tcp_address);
            let v = MavVehicle::open_url(&url, cfg.ids(), hb_hz, manual_gap)?;
            Ok(VehicleLink::new(Arc::new(v), url))
        }
        ConnectionKind::Sim => {
            info!("fc: using simulated vehicle at ({}, {})", sim.home_lat, sim.home_lon);
            Ok(VehicleLink::new(Arc::new(SimVehicle::new(sim.clone())), "sim"))
        }
    }
}
