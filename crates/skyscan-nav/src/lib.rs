pub mod config;
pub mod doctor;
pub mod error;
pub mod geo;
pub mod mission;
pub mod phase;
pub mod planner;

#[cfg(test)]
mod testing;

pub use config::PlannerConfig;
pub use error::{FlightError, FlightResult};
pub use geo::{planar_distance_m, waypoints_from_triples, Waypoint};
pub use mission::{validate_mission, MissionReport, MissionRunner};
pub use phase::{FlightPhase, PhaseEvent};
pub use planner::FlightPlanner;
