use std::fmt;

use skyscan_fc::VehicleLink;
use skyscan_nav::{FlightPhase, FlightPlanner};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    Disarmed,
    Arming,
    Armed,
    Disarming,
}

impl fmt::Display for ArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArmState::Disarmed => "disarmed",
            ArmState::Arming => "arming",
            ArmState::Armed => "armed",
            ArmState::Disarming => "disarming",
        };
        f.write_str(s)
    }
}

/// Arm state with the planner living inside `Armed`, so a planner exists
/// exactly while the vehicle is armed.
pub(crate) enum ArmSlot {
    Disarmed,
    Arming,
    Armed(FlightPlanner),
    Disarming,
}

impl ArmSlot {
    pub(crate) fn state(&self) -> ArmState {
        match self {
            ArmSlot::Disarmed => ArmState::Disarmed,
            ArmSlot::Arming => ArmState::Arming,
            ArmSlot::Armed(_) => ArmState::Armed,
            ArmSlot::Disarming => ArmState::Disarming,
        }
    }

    pub(crate) fn planner(&self) -> Option<&FlightPlanner> {
        match self {
            ArmSlot::Armed(p) => Some(p),
            _ => None,
        }
    }
}

/// Read-only view of the session for telemetry and heartbeat tasks, so they
/// never wait behind a command in flight.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub link: Option<VehicleLink>,
    pub arm_state: ArmState,
    /// Present while a planner exists.
    pub phase: Option<watch::Receiver<FlightPhase>>,
    pub mission_active: bool,
}

impl SessionStatus {
    pub(crate) fn offline() -> Self {
        Self { link: None, arm_state: ArmState::Disarmed, phase: None, mission_active: false }
    }

    pub fn connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn flight_phase(&self) -> Option<FlightPhase> {
        self.phase.as_ref().map(|rx| *rx.borrow())
    }
}
