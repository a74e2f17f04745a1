use std::time::Duration;

use serde::Deserialize;

/// Polling and threshold knobs for `FlightPlanner`. Defaults reproduce the
/// field-tested behaviour; deadlines are off unless configured.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub mode_confirm_delay_ms: u64,
    pub altitude_poll_ms: u64,
    pub waypoint_poll_ms: u64,
    pub arrival_radius_m: f64,
    /// Fraction of the target altitude that counts as "reached" on takeoff.
    pub climb_arrival_ratio: f64,
    pub takeoff_deadline_s: Option<u64>,
    pub goto_deadline_s: Option<u64>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            mode_confirm_delay_ms: 2000,
            altitude_poll_ms: 500,
            waypoint_poll_ms: 1000,
            arrival_radius_m: 1.0,
            climb_arrival_ratio: 0.95,
            takeoff_deadline_s: None,
            goto_deadline_s: None,
        }
    }
}

impl PlannerConfig {
    pub fn mode_confirm_delay(&self) -> Duration {
        Duration::from_millis(self.mode_confirm_delay_ms)
    }

    pub fn altitude_poll(&self) -> Duration {
        Duration::from_millis(self.altitude_poll_ms)
    }

    pub fn waypoint_poll(&self) -> Duration {
        Duration::from_millis(self.waypoint_poll_ms)
    }

    pub fn takeoff_deadline(&self) -> Option<Duration> {
        self.takeoff_deadline_s.map(Duration::from_secs)
    }

    pub fn goto_deadline(&self) -> Option<Duration> {
        self.goto_deadline_s.map(Duration::from_secs)
    }
}
