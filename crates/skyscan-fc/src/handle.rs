use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use skyscan_proto::telemetry::{AttitudeData, BatteryStatus, GpsData, ImuData, NavData, SystemStatus};

use crate::mode::FlightMode;

/// Stick axes that can be nudged through RC override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManualAxis {
    Roll,
    Pitch,
    Throttle,
    Yaw,
}

impl ManualAxis {
    /// RC input channel (1-based) on a default ArduPilot channel map.
    pub fn rc_channel(self) -> u8 {
        match self {
            ManualAxis::Roll => 1,
            ManualAxis::Pitch => 2,
            ManualAxis::Throttle => 3,
            ManualAxis::Yaw => 4,
        }
    }
}

/// Command and state access to one connected vehicle.
///
/// Implementations serialize writes on the underlying link; callers may share
/// a handle between tasks.
#[async_trait]
pub trait VehicleHandle: Send + Sync {
    async fn mode(&self) -> Result<FlightMode>;
    async fn request_mode(&self, mode: &FlightMode) -> Result<()>;

    async fn gps_fix_type(&self) -> Result<u8>;
    async fn altitude_relative(&self) -> Result<f64>;
    async fn position(&self) -> Result<(f64, f64)>;

    async fn request_takeoff(&self, altitude_m: f64) -> Result<()>;
    async fn request_goto(&self, lat: f64, lon: f64, alt_m: f64) -> Result<()>;
    async fn set_groundspeed(&self, mps: f64) -> Result<()>;

    /// Returns whether the autopilot reported itself armed afterwards.
    async fn arm(&self) -> Result<bool>;
    /// Returns whether the autopilot reported itself disarmed afterwards.
    async fn disarm(&self) -> Result<bool>;
    async fn is_armed(&self) -> Result<bool>;

    async fn send_manual(&self, axis: ManualAxis, pwm: u16) -> Result<()>;

    /// Release the link. Further calls may fail.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Decoders for the six telemetry channels. Each one fails independently.
#[async_trait]
pub trait TelemetryProbe: Send + Sync {
    async fn nav(&self) -> Result<NavData>;
    async fn attitude(&self) -> Result<AttitudeData>;
    async fn gps(&self) -> Result<GpsData>;
    async fn system(&self) -> Result<SystemStatus>;
    async fn battery(&self) -> Result<BatteryStatus>;
    async fn imu(&self) -> Result<ImuData>;
}

/// A connected vehicle seen through both of its faces.
#[derive(Clone)]
pub struct VehicleLink {
    pub handle: Arc<dyn VehicleHandle>,
    pub probe: Arc<dyn TelemetryProbe>,
    pub label: String,
}

impl VehicleLink {
    pub fn new<V>(vehicle: Arc<V>, label: impl Into<String>) -> Self
    where
        V: VehicleHandle + TelemetryProbe + 'static,
    {
        Self { handle: vehicle.clone(), probe: vehicle, label: label.into() }
    }
}

impl std::fmt::Debug for VehicleLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VehicleLink").field("label", &self.label).finish()
    }
}
