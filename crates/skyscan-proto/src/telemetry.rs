use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavData {
    pub lat: f64,
    pub lon: f64,
    pub alt_rel_m: f32,
    pub groundspeed_mps: f32,
    pub heading_deg: f32,
    pub climb_mps: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttitudeData {
    pub roll_deg: f32,
    pub pitch_deg: f32,
    pub yaw_deg: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsData {
    pub fix_type: u8,
    pub satellites: u8,
    pub hdop: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub mode: String,
    pub armed: bool,
    pub state: String,
    pub heartbeat_age_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    pub voltage: Option<f32>,  // Volts
    pub current: Option<f32>,  // Amps
    pub remaining: Option<u8>, // Percent 0-100
}

/// Raw IMU counts as reported by the autopilot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuData {
    pub xacc: i16,
    pub yacc: i16,
    pub zacc: i16,
    pub xgyro: i16,
    pub ygyro: i16,
    pub zgyro: i16,
}

/// One telemetry channel: either a decoded value or the reason it could not be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Channel<T> {
    Ok { value: T },
    Fault { error: String },
}

impl<T> Channel<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Channel::Ok { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Channel::Ok { value } => Some(value),
            Channel::Fault { .. } => None,
        }
    }

    pub fn fault(&self) -> Option<&str> {
        match self {
            Channel::Ok { .. } => None,
            Channel::Fault { error } => Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub ts_unix_ms: i64,
    pub nav: Channel<NavData>,
    pub attitude: Channel<AttitudeData>,
    pub gps: Channel<GpsData>,
    pub system: Channel<SystemStatus>,
    pub battery: Channel<BatteryStatus>,
    pub imu: Channel<ImuData>,
}

impl TelemetrySnapshot {
    /// Channel names paired with their fault text, in collection order.
    pub fn faults(&self) -> Vec<(&'static str, &str)> {
        [
            ("nav", self.nav.fault()),
            ("attitude", self.attitude.fault()),
            ("gps", self.gps.fault()),
            ("system", self.system.fault()),
            ("battery", self.battery.fault()),
            ("imu", self.imu.fault()),
        ]
        .into_iter()
        .filter_map(|(name, fault)| fault.map(|f| (name, f)))
        .collect()
    }

    pub fn ok_count(&self) -> usize {
        6 - self.faults().len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub seq: u64,
    pub ts_unix_ms: i64,
    pub connected: bool,
    pub arm_state: String,
    pub phase: Option<String>,
}
