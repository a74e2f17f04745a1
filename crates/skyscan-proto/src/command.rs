use serde::{Deserialize, Serialize};

use crate::telemetry::{Heartbeat, TelemetrySnapshot};

/// Client requests, one JSON object per line, discriminated by `event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Request {
    #[serde(rename = "connection")]
    Connect,
    #[serde(rename = "disconnection")]
    Disconnect,
    #[serde(rename = "arm")]
    Arm,
    #[serde(rename = "disarm")]
    Disarm,
    #[serde(rename = "throttleup")]
    ThrottleUp,
    #[serde(rename = "throttledown")]
    ThrottleDown,
    #[serde(rename = "rollright")]
    RollRight,
    #[serde(rename = "rollleft")]
    RollLeft,
    #[serde(rename = "pitchforward")]
    PitchForward,
    #[serde(rename = "pitchbackward")]
    PitchBackward,
    #[serde(rename = "yawclock")]
    YawClockwise,
    #[serde(rename = "yawanticlock")]
    YawAnticlockwise,
    #[serde(rename = "setalt")]
    SetAltitude { height: f64 },
    #[serde(rename = "land")]
    Land,
    #[serde(rename = "mode_switch")]
    ModeSwitch { mode: String },
    /// Waypoints stay as loose lists here; arity is checked by the mission layer.
    #[serde(rename = "start_scan")]
    StartScan { waypoints: Vec<Vec<f64>>, speed: f64 },
    #[serde(rename = "telemetry")]
    Telemetry,
    /// Answered once, when the vehicle link goes down.
    #[serde(rename = "monitoring")]
    Monitoring,
    #[serde(rename = "ack")]
    Ack { message: String },
}

impl Request {
    /// Name of the response event a client should wait for.
    pub fn response_name(&self) -> &'static str {
        match self {
            Request::Connect => "connection_response",
            Request::Disconnect => "disconnection_response",
            Request::Arm => "arm_response",
            Request::Disarm => "disarm_response",
            Request::ThrottleUp => "throttleup_response",
            Request::ThrottleDown => "throttledown_response",
            Request::RollRight => "rollright_response",
            Request::RollLeft => "rollleft_response",
            Request::PitchForward => "pitchforward_response",
            Request::PitchBackward => "pitchbackward_response",
            Request::YawClockwise => "yawclock_response",
            Request::YawAnticlockwise => "yawanticlock_response",
            Request::SetAltitude { .. } => "setalt_response",
            Request::Land => "land_response",
            Request::ModeSwitch { .. } => "mode_switch_response",
            Request::StartScan { .. } => "start_scan_response",
            Request::Telemetry => "telemetry_response",
            Request::Monitoring => "monitoring_response",
            Request::Ack { .. } => "ack_response",
        }
    }
}

/// Everything the server pushes to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Outbound {
    Response { name: String, success: bool, detail: String },
    Error { error: String },
    Telemetry(TelemetrySnapshot),
    Heartbeat(Heartbeat),
}

impl Outbound {
    pub fn response(req: &Request, success: bool, detail: impl Into<String>) -> Self {
        Outbound::Response { name: req.response_name().to_string(), success, detail: detail.into() }
    }
}
