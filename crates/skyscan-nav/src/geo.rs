use serde::{Deserialize, Serialize};

pub use skyscan_fc::geo::{planar_distance_m, METERS_PER_DEGREE};

use crate::error::FlightError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

impl Waypoint {
    pub fn new(latitude: f64, longitude: f64, altitude_m: f64) -> Self {
        Self { latitude, longitude, altitude_m }
    }

    /// Build from a loose `[lat, lon, alt]` list as sent by clients.
    /// `index` is zero-based and only used in the error message.
    pub fn from_triple(index: usize, raw: &[f64]) -> Result<Self, FlightError> {
        match raw {
            [lat, lon, alt] => Ok(Self::new(*lat, *lon, *alt)),
            _ => Err(FlightError::InvalidMission(format!(
                "waypoint {} has {} fields, expected [lat, lon, alt]",
                index + 1,
                raw.len()
            ))),
        }
    }
}

pub fn waypoints_from_triples(raw: &[Vec<f64>]) -> Result<Vec<Waypoint>, FlightError> {
    raw.iter().enumerate().map(|(i, t)| Waypoint::from_triple(i, t)).collect()
}
