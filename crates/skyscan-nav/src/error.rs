use skyscan_fc::FlightMode;
use thiserror::Error;

use crate::phase::{FlightPhase, PhaseEvent};

/// Why a flight or mission operation did not complete.
#[derive(Debug, Error)]
pub enum FlightError {
    #[error("no vehicle connected")]
    NotConnected,

    #[error("vehicle is not armed")]
    NotArmed,

    #[error("mode switch to {requested} not confirmed, vehicle reports {reported}")]
    ModeSwitchTimeout { requested: FlightMode, reported: FlightMode },

    #[error("{target} not reached: {detail}")]
    ArrivalNotReached { target: String, detail: String },

    #[error("invalid mission: {0}")]
    InvalidMission(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Another long-running flight operation (scan mission, altitude hold)
    /// still owns the vehicle.
    #[error("{0} already in progress")]
    Busy(String),

    #[error("cannot {event} while {from}")]
    IllegalTransition { from: FlightPhase, event: PhaseEvent },

    #[error("operation cancelled")]
    Cancelled,

    #[error("vehicle fault: {0:#}")]
    UnexpectedFault(#[from] anyhow::Error),
}

impl FlightError {
    /// Stable identifier for logs and wire responses.
    pub fn kind(&self) -> &'static str {
        match self {
            FlightError::NotConnected => "NotConnected",
            FlightError::NotArmed => "NotArmed",
            FlightError::ModeSwitchTimeout { .. } => "ModeSwitchTimeout",
            FlightError::ArrivalNotReached { .. } => "ArrivalNotReached",
            FlightError::InvalidMission(_) => "InvalidMission",
            FlightError::InvalidCommand(_) => "InvalidCommand",
            FlightError::Busy(_) => "Busy",
            FlightError::IllegalTransition { .. } => "IllegalTransition",
            FlightError::Cancelled => "Cancelled",
            FlightError::UnexpectedFault(_) => "UnexpectedFault",
        }
    }
}

pub type FlightResult<T> = Result<T, FlightError>;
