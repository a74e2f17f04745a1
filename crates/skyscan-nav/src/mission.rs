use std::time::Duration;

use skyscan_fc::FlightMode;
use tracing::{error, info, warn};

use crate::error::{FlightError, FlightResult};
use crate::geo::Waypoint;
use crate::planner::FlightPlanner;

/// Attempts per waypoint before the mission is abandoned.
pub const MAX_ATTEMPTS: u32 = 3;
/// Pause after a failed attempt, once the vehicle has been told to hold.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct MissionReport {
    pub waypoints_reached: usize,
    /// Attempts used per reached waypoint, in flight order.
    pub attempts: Vec<u32>,
    /// Mode engaged by the terminal return/land, if it was confirmed.
    pub terminal_mode: Option<FlightMode>,
}

/// Reject anything that should not get as far as a takeoff.
pub fn validate_mission(mission: &[Waypoint], groundspeed: f64) -> FlightResult<()> {
    if mission.is_empty() {
        return Err(FlightError::InvalidMission("no waypoints".into()));
    }
    if !(groundspeed.is_finite() && groundspeed > 0.0) {
        return Err(FlightError::InvalidMission(format!("groundspeed must be positive, got {}", groundspeed)));
    }
    for (i, wp) in mission.iter().enumerate() {
        let finite = wp.latitude.is_finite() && wp.longitude.is_finite() && wp.altitude_m.is_finite();
        if !finite || wp.latitude.abs() > 90.0 || wp.longitude.abs() > 180.0 {
            return Err(FlightError::InvalidMission(format!(
                "waypoint {} has invalid coordinates ({}, {}, {})",
                i + 1,
                wp.latitude,
                wp.longitude,
                wp.altitude_m
            )));
        }
        if wp.altitude_m <= 0.0 {
            return Err(FlightError::InvalidMission(format!(
                "waypoint {} altitude must be above launch, got {} m",
                i + 1,
                wp.altitude_m
            )));
        }
    }
    Ok(())
}

/// Flies an ordered waypoint list: takeoff to the first waypoint's altitude,
/// visit each waypoint with per-waypoint retries, then return and land.
pub struct MissionRunner {
    planner: FlightPlanner,
}

impl MissionRunner {
    /// `planner` should carry the mission's cancellation token.
    pub fn new(planner: FlightPlanner) -> Self {
        Self { planner }
    }

    pub fn planner(&self) -> &FlightPlanner {
        &self.planner
    }

    pub async fn run(&self, mission: &[Waypoint], groundspeed: f64) -> FlightResult<MissionReport> {
        validate_mission(mission, groundspeed)?;
        info!(waypoints = mission.len(), groundspeed, "Starting scan mission");

        let takeoff_alt = mission[0].altitude_m;
        info!("Taking off and holding at {} m before starting mission...", takeoff_alt);
        if let Err(e) = self.planner.takeoff_and_hold(takeoff_alt).await {
            error!("Takeoff failed ({}). Aborting mission.", e);
            return Err(e);
        }

        let mut report = MissionReport { waypoints_reached: 0, attempts: Vec::new(), terminal_mode: None };
        for (index, wp) in mission.iter().enumerate() {
            info!("Navigating to waypoint {}/{}", index + 1, mission.len());
            match self.visit(index, mission.len(), wp, groundspeed).await {
                Ok(attempts) => {
                    report.waypoints_reached += 1;
                    report.attempts.push(attempts);
                }
                Err(FlightError::Cancelled) => {
                    warn!("Mission cancelled at waypoint {}", index + 1);
                    return Err(FlightError::Cancelled);
                }
                Err(e) => {
                    error!("{}. Returning home...", e);
                    self.land_or_log().await;
                    return Err(e);
                }
            }
        }

        info!("Scan mission complete. Returning to launch...");
        report.terminal_mode = self.land_or_log().await;
        Ok(report)
    }

    /// Try one waypoint up to `MAX_ATTEMPTS` times. Returns attempts used.
    async fn visit(&self, index: usize, total: usize, wp: &Waypoint, groundspeed: f64) -> FlightResult<u32> {
        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.planner.goto_waypoint(wp, groundspeed).await {
                Ok(()) => {
                    info!("Reached waypoint {}", index + 1);
                    return Ok(attempt);
                }
                Err(FlightError::Cancelled) => return Err(FlightError::Cancelled),
                Err(e) => {
                    warn!("Failed attempt {}/{} for waypoint {}: {}", attempt, MAX_ATTEMPTS, index + 1, e);
                    last_err = Some(e);
                }
            }

            // stop and reset before retrying
            if let Err(e) = self.planner.hold().await {
                warn!("hold before retry failed: {}", e);
            }
            tokio::select! {
                _ = self.planner.cancel_token().cancelled() => return Err(FlightError::Cancelled),
                _ = tokio::time::sleep(RETRY_BACKOFF) => {}
            }
        }

        Err(FlightError::ArrivalNotReached {
            target: format!("waypoint {}/{}", index + 1, total),
            detail: format!(
                "{} attempts failed, last: {}",
                MAX_ATTEMPTS,
                last_err.map(|e| e.to_string()).unwrap_or_default()
            ),
        })
    }

    async fn land_or_log(&self) -> Option<FlightMode> {
        match self.planner.emergency_land().await {
            Ok(mode) => Some(mode),
            Err(e) => {
                error!("return/land not confirmed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::config::PlannerConfig;
    use crate::phase::FlightPhase;
    use crate::testing::{Cmd, ScriptedVehicle};

    fn runner(v: &Arc<ScriptedVehicle>, cfg: PlannerConfig) -> MissionRunner {
        MissionRunner::new(FlightPlanner::new(v.clone(), cfg))
    }

    fn scan() -> Vec<Waypoint> {
        vec![Waypoint::new(1.0, 1.0, 10.0), Waypoint::new(1.0, 1.0001, 10.0)]
    }

    #[test]
    fn rejects_malformed_missions() {
        assert!(validate_mission(&scan(), 5.0).is_ok());
        assert!(validate_mission(&[], 5.0).is_err());
        assert!(validate_mission(&scan(), 0.0).is_err());
        assert!(validate_mission(&scan(), f64::NAN).is_err());
        assert!(validate_mission(&[Waypoint::new(91.0, 1.0, 10.0)], 5.0).is_err());
        assert!(validate_mission(&[Waypoint::new(1.0, 1.0, 0.0)], 5.0).is_err());
        assert!(validate_mission(&[Waypoint::new(1.0, f64::INFINITY, 10.0)], 5.0).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_mission_issues_no_commands() {
        let v = ScriptedVehicle::new();
        let err = runner(&v, PlannerConfig::default()).run(&[], 5.0).await.unwrap_err();
        assert!(matches!(err, FlightError::InvalidMission(_)));
        assert!(v.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn scan_flies_every_waypoint_then_returns_home() {
        let v = ScriptedVehicle::new();
        let r = runner(&v, PlannerConfig::default());
        let report = r.run(&scan(), 5.0).await.unwrap();

        assert_eq!(report.waypoints_reached, 2);
        assert_eq!(report.attempts, vec![1, 1]);
        assert_eq!(report.terminal_mode, Some(FlightMode::ReturnToLaunch));
        assert_eq!(v.commands().last(), Some(&Cmd::Mode(FlightMode::ReturnToLaunch)));
        assert_eq!(
            v.modes_requested(),
            vec![
                FlightMode::Guided,
                FlightMode::Loiter,
                FlightMode::Guided,
                FlightMode::Guided,
                FlightMode::ReturnToLaunch
            ]
        );
        assert_eq!(r.planner().phase(), FlightPhase::ReturningHome);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_waypoint_gets_three_attempts_then_lands() {
        let v = ScriptedVehicle::new();
        v.edit(|s| {
            s.alt = 20.0;
            s.approach_m_per_read = None;
        });
        let cfg = PlannerConfig { goto_deadline_s: Some(3), ..PlannerConfig::default() };
        let t0 = Instant::now();
        let err = runner(&v, cfg).run(&scan()[1..], 5.0).await.unwrap_err();

        match err {
            FlightError::ArrivalNotReached { target, .. } => assert_eq!(target, "waypoint 1/1"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(v.goto_count(), 3);
        let mut expected = Vec::new();
        for _ in 0..MAX_ATTEMPTS {
            expected.extend([FlightMode::Guided, FlightMode::Loiter]);
        }
        expected.push(FlightMode::ReturnToLaunch);
        assert_eq!(v.modes_requested(), expected);
        // per attempt: guided 2 s, polling 3 s, hold 2 s, backoff 1 s; then RTL 2 s
        assert_eq!(t0.elapsed(), Duration::from_secs(26));
    }

    #[tokio::test(start_paused = true)]
    async fn weak_fix_retries_brake_and_lands() {
        let v = ScriptedVehicle::new();
        v.edit(|s| {
            s.alt = 20.0;
            s.fix_type = 2;
            s.rejected.push(FlightMode::Guided);
        });
        let err = runner(&v, PlannerConfig::default()).run(&scan()[1..], 5.0).await.unwrap_err();
        assert_eq!(err.kind(), "ArrivalNotReached");
        assert_eq!(v.goto_count(), 0);
        let modes = v.modes_requested();
        assert_eq!(modes.iter().filter(|m| **m == FlightMode::Brake).count(), 3);
        assert!(!modes.contains(&FlightMode::Loiter));
        assert_eq!(modes.last(), Some(&FlightMode::Land));
    }

    #[tokio::test(start_paused = true)]
    async fn weak_fix_takeoff_still_flies_the_waypoints() {
        let v = ScriptedVehicle::new();
        v.edit(|s| s.fix_type = 1);
        let r = runner(&v, PlannerConfig::default());
        let report = r.run(&scan(), 5.0).await.unwrap();

        assert_eq!(report.waypoints_reached, 2);
        assert_eq!(report.terminal_mode, Some(FlightMode::Land));
        assert_eq!(v.goto_count(), 2);
        assert_eq!(
            v.modes_requested(),
            vec![FlightMode::Guided, FlightMode::Land, FlightMode::Guided, FlightMode::Guided, FlightMode::Land]
        );
        assert_eq!(r.planner().phase(), FlightPhase::Landing);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_takeoff_is_reported_without_visiting_waypoints() {
        let v = ScriptedVehicle::new();
        v.edit(|s| s.rejected.push(FlightMode::Guided));
        let err = runner(&v, PlannerConfig::default()).run(&scan(), 5.0).await.unwrap_err();
        assert_eq!(err.kind(), "ModeSwitchTimeout");
        assert_eq!(v.commands(), vec![Cmd::Mode(FlightMode::Guided)]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_runner_quietly() {
        let v = ScriptedVehicle::new();
        v.edit(|s| {
            s.alt = 20.0;
            s.approach_m_per_read = None;
        });
        let token = CancellationToken::new();
        let planner = FlightPlanner::new(v.clone(), PlannerConfig::default()).with_cancel(token.clone());
        let task = tokio::spawn(async move { MissionRunner::new(planner).run(&scan()[1..], 5.0).await });

        tokio::time::sleep(Duration::from_secs(30)).await;
        token.cancel();

        assert!(matches!(task.await.unwrap(), Err(FlightError::Cancelled)));
        assert_eq!(v.goto_count(), 1);
        assert_eq!(v.modes_requested(), vec![FlightMode::Guided]);
    }
}
