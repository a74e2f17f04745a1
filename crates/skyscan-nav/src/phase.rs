use std::fmt;

use skyscan_fc::FlightMode;

use crate::error::FlightError;

/// Where the vehicle is in a flight, as far as the planner has commanded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightPhase {
    Grounded,
    Climbing,
    Holding,
    Transiting,
    Landing,
    ReturningHome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    TakeoffCommanded,
    AltitudeReached,
    GotoCommanded,
    Arrived,
    HoldCommanded,
    LandCommanded,
    ReturnCommanded,
}

impl FlightPhase {
    /// Next phase after `event`, or `IllegalTransition` if the event makes no
    /// sense from here (e.g. a goto before the vehicle has climbed).
    pub fn on(self, event: PhaseEvent) -> Result<FlightPhase, FlightError> {
        use FlightPhase::*;
        use PhaseEvent::*;

        let next = match (self, event) {
            (_, LandCommanded) => Some(Landing),
            (_, ReturnCommanded) => Some(ReturningHome),
            (_, TakeoffCommanded) => Some(Climbing),
            (_, AltitudeReached) => Some(Holding),
            // a goto overrides a descent or return already under way
            (Holding | Transiting | Landing | ReturningHome, GotoCommanded) => Some(Transiting),
            (Transiting, Arrived) => Some(Holding),
            (Climbing | Holding | Transiting | Landing | ReturningHome, HoldCommanded) => Some(Holding),
            _ => None,
        };
        next.ok_or(FlightError::IllegalTransition { from: self, event })
    }

    /// Phase once `mode` has been confirmed outside the planner's own
    /// sequences, e.g. an operator mode switch.
    pub fn after_mode(self, mode: &FlightMode) -> FlightPhase {
        match mode {
            FlightMode::Land => FlightPhase::Landing,
            FlightMode::ReturnToLaunch => FlightPhase::ReturningHome,
            _ if self == FlightPhase::Grounded => FlightPhase::Grounded,
            _ => FlightPhase::Holding,
        }
    }

    /// Phase left behind when a climb or transit is abandoned mid-way.
    pub fn settled(self) -> FlightPhase {
        match self {
            FlightPhase::Climbing | FlightPhase::Transiting => FlightPhase::Holding,
            other => other,
        }
    }
}

impl fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlightPhase::Grounded => "grounded",
            FlightPhase::Climbing => "climbing",
            FlightPhase::Holding => "holding",
            FlightPhase::Transiting => "transiting",
            FlightPhase::Landing => "landing",
            FlightPhase::ReturningHome => "returning home",
        };
        f.write_str(s)
    }
}

impl fmt::Display for PhaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseEvent::TakeoffCommanded => "take off",
            PhaseEvent::AltitudeReached => "reach altitude",
            PhaseEvent::GotoCommanded => "go to a waypoint",
            PhaseEvent::Arrived => "arrive at a waypoint",
            PhaseEvent::HoldCommanded => "hold position",
            PhaseEvent::LandCommanded => "land",
            PhaseEvent::ReturnCommanded => "return to launch",
        };
        f.write_str(s)
    }
}
