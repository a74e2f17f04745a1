use anyhow::Result;

use crate::config::PlannerConfig;
use crate::geo::Waypoint;
use crate::mission::validate_mission;

pub fn check_planner(cfg: &PlannerConfig) -> Result<()> {
    anyhow::ensure!(cfg.arrival_radius_m > 0.0 && cfg.arrival_radius_m <= 25.0, "planner.arrival_radius_m should be (0, 25]");
    anyhow::ensure!(cfg.climb_arrival_ratio >= 0.5 && cfg.climb_arrival_ratio <= 1.0, "planner.climb_arrival_ratio should be 0.5..1.0");
    anyhow::ensure!(cfg.altitude_poll_ms >= 50 && cfg.waypoint_poll_ms >= 50, "planner poll intervals too short (< 50 ms)");
    anyhow::ensure!(
        cfg.mode_confirm_delay_ms >= 100 && cfg.mode_confirm_delay_ms <= 10_000,
        "planner.mode_confirm_delay_ms should be 100..10000"
    );
    if let Some(s) = cfg.goto_deadline_s {
        anyhow::ensure!(s >= 5, "planner.goto_deadline_s too short; a retry would fire mid-transit");
    }
    Ok(())
}

pub fn check_mission(waypoints: &[Waypoint], groundspeed: f64) -> Result<()> {
    validate_mission(waypoints, groundspeed)?;
    anyhow::ensure!(groundspeed <= 20.0, "groundspeed {} m/s exceeds 20 m/s", groundspeed);
    Ok(())
}
