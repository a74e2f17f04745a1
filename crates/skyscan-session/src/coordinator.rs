use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use skyscan_fc::{FlightMode, VehicleLink};
use skyscan_nav::{
    validate_mission, waypoints_from_triples, FlightError, FlightPlanner, FlightResult, MissionReport, MissionRunner,
    PlannerConfig,
};
use skyscan_proto::now_unix_ms;
use skyscan_proto::telemetry::{Heartbeat, TelemetrySnapshot};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::connector::Connector;
use crate::manual::ManualCommand;
use crate::state::{ArmSlot, ArmState, SessionStatus};
use crate::telemetry::collect_snapshot;

const AIRBORNE_ALT_M: f64 = 0.5;

/// A scan mission or altitude hold running outside the session lock.
struct ActiveFlight {
    id: u64,
    what: &'static str,
    cancel: CancellationToken,
}

struct SessionContext {
    link: Option<VehicleLink>,
    arm: ArmSlot,
    flight: Option<ActiveFlight>,
}

impl SessionContext {
    fn link(&self) -> FlightResult<&VehicleLink> {
        self.link.as_ref().ok_or(FlightError::NotConnected)
    }

    /// Gate shared by every flight command: connected, then armed.
    fn armed_planner(&self) -> FlightResult<FlightPlanner> {
        self.link()?;
        self.arm.planner().cloned().ok_or(FlightError::NotArmed)
    }

    fn ensure_idle(&self) -> FlightResult<()> {
        match &self.flight {
            Some(f) => Err(FlightError::Busy(f.what.to_string())),
            None => Ok(()),
        }
    }

    fn cancel_flight(&mut self) {
        if let Some(f) = self.flight.take() {
            info!(flight = f.id, "cancelling {}", f.what);
            f.cancel.cancel();
            if let Some(p) = self.arm.planner() {
                p.settle();
            }
        }
    }
}

/// Owns the connection, arm state and planner for one ground station.
///
/// Commands serialize on an internal lock. Scan missions and altitude holds
/// run outside it on a cancellable planner, so disarm, land, mode switch,
/// disconnect and failsafe can always interrupt them. Observers read a
/// published `SessionStatus` and never wait on the lock.
pub struct FlightSessionCoordinator {
    connector: Arc<dyn Connector>,
    planner_cfg: PlannerConfig,
    ctx: Mutex<SessionContext>,
    status: watch::Sender<SessionStatus>,
    heartbeat_seq: AtomicU64,
    flight_seq: AtomicU64,
    last_ack: StdMutex<Option<(Instant, String)>>,
}

impl FlightSessionCoordinator {
    pub fn new(connector: Arc<dyn Connector>, planner_cfg: PlannerConfig) -> Self {
        let (status, _rx) = watch::channel(SessionStatus::offline());
        Self {
            connector,
            planner_cfg,
            ctx: Mutex::new(SessionContext { link: None, arm: ArmSlot::Disarmed, flight: None }),
            status,
            heartbeat_seq: AtomicU64::new(0),
            flight_seq: AtomicU64::new(0),
            last_ack: StdMutex::new(None),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn arm_state(&self) -> ArmState {
        self.status.borrow().arm_state
    }

    fn publish(&self, ctx: &SessionContext) {
        self.status.send_replace(SessionStatus {
            link: ctx.link.clone(),
            arm_state: ctx.arm.state(),
            phase: ctx.arm.planner().map(FlightPlanner::subscribe_phase),
            mission_active: ctx.flight.is_some(),
        });
    }

    fn new_planner(&self, link: &VehicleLink) -> FlightPlanner {
        FlightPlanner::new(link.handle.clone(), self.planner_cfg.clone())
    }

    pub async fn connect(&self) -> FlightResult<String> {
        let mut ctx = self.ctx.lock().await;
        if let Some(link) = &ctx.link {
            return Ok(format!("already connected to {}", link.label));
        }
        info!("Connecting to vehicle...");
        let link = self.connector.connect().await.map_err(|e| {
            error!("connection failed: {:#}", e);
            FlightError::from(e)
        })?;

        // a vehicle already in the air keeps its planner
        ctx.arm = match link.handle.is_armed().await {
            Ok(true) => {
                warn!("{} is already armed", link.label);
                let planner = self.new_planner(&link);
                planner.resync().await;
                ArmSlot::Armed(planner)
            }
            _ => ArmSlot::Disarmed,
        };
        info!("Connected to {}", link.label);
        let msg = format!("connected to {}", link.label);
        ctx.link = Some(link);
        self.publish(&ctx);
        Ok(msg)
    }

    pub async fn disconnect(&self) -> FlightResult<String> {
        let mut ctx = self.ctx.lock().await;
        ctx.link()?;
        ctx.cancel_flight();
        ctx.arm = ArmSlot::Disarmed;
        let Some(link) = ctx.link.take() else {
            return Err(FlightError::NotConnected);
        };
        self.publish(&ctx);

        if let Err(e) = link.handle.close().await {
            warn!("closing {}: {:#}", link.label, e);
        }
        info!("Disconnected from {}", link.label);
        Ok("disconnected".into())
    }

    /// Command the vehicle to arm and bind a fresh planner to it, also when
    /// the session already counts as armed.
    pub async fn arm(&self) -> FlightResult<String> {
        let mut ctx = self.ctx.lock().await;
        let link = ctx.link()?.clone();
        ctx.ensure_idle()?;
        ctx.arm = ArmSlot::Arming;
        self.publish(&ctx);

        info!("Arming vehicle...");
        let outcome = link.handle.arm().await;
        ctx.arm = match outcome {
            Ok(true) => {
                let planner = self.new_planner(&link);
                planner.resync().await;
                ArmSlot::Armed(planner)
            }
            _ => ArmSlot::Disarmed,
        };
        self.publish(&ctx);

        match outcome {
            Ok(true) => {
                info!("Vehicle armed.");
                Ok("armed".into())
            }
            Ok(false) => {
                warn!("Vehicle did not report armed.");
                Err(anyhow!("vehicle refused to arm").into())
            }
            Err(e) => {
                error!("arming failed: {:#}", e);
                Err(e.into())
            }
        }
    }

    /// Stops any running flight operation and releases the planner once the
    /// vehicle confirms. A refused disarm leaves the session armed.
    pub async fn disarm(&self) -> FlightResult<String> {
        let mut ctx = self.ctx.lock().await;
        let handle = ctx.link()?.handle.clone();
        let planner = match std::mem::replace(&mut ctx.arm, ArmSlot::Disarming) {
            ArmSlot::Armed(p) => p,
            other => {
                ctx.arm = other;
                return Err(FlightError::NotArmed);
            }
        };
        ctx.cancel_flight();
        self.publish(&ctx);

        info!("Disarming vehicle...");
        let outcome = handle.disarm().await;
        ctx.arm = if matches!(outcome, Ok(true)) { ArmSlot::Disarmed } else { ArmSlot::Armed(planner) };
        self.publish(&ctx);

        match outcome {
            Ok(true) => {
                info!("Vehicle disarmed.");
                Ok("disarmed".into())
            }
            Ok(false) => Err(anyhow!("vehicle refused to disarm").into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Called when the operator link drops. Lands an armed vehicle; returns
    /// whether LAND was confirmed.
    pub async fn failsafe(&self) -> bool {
        let mut ctx = self.ctx.lock().await;
        ctx.cancel_flight();
        self.publish(&ctx);

        let planner = match (&ctx.link, ctx.arm.planner()) {
            (Some(_), Some(p)) => p.clone(),
            _ => {
                info!("failsafe: no armed vehicle, nothing to do");
                return false;
            }
        };
        warn!("Operator link lost. Failsafe LAND.");
        planner.force_land().await
    }

    pub async fn manual(&self, cmd: ManualCommand) -> FlightResult<String> {
        let ctx = self.ctx.lock().await;
        ctx.armed_planner()?;
        ctx.ensure_idle()?;
        let handle = ctx.link()?.handle.clone();
        handle.send_manual(cmd.axis(), cmd.pwm()).await?;
        Ok(format!("{}: channel {} at {}", cmd, cmd.axis().rc_channel(), cmd.pwm()))
    }

    /// Climb to (or stay at) `height` meters and hold.
    pub async fn set_altitude(&self, height: f64) -> FlightResult<String> {
        if !(height.is_finite() && height > 0.0) {
            return Err(FlightError::InvalidCommand(format!("altitude must be positive, got {}", height)));
        }
        let (planner, id) = self.begin_flight("altitude hold").await?;
        let result = planner.takeoff_and_hold(height).await;
        self.end_flight(id).await;
        result.map(|()| format!("holding at {:.1} m", height))
    }

    /// Return to launch, or land in place without a usable fix. Interrupts
    /// any running mission.
    pub async fn land(&self) -> FlightResult<FlightMode> {
        let mut ctx = self.ctx.lock().await;
        let planner = ctx.armed_planner()?;
        ctx.cancel_flight();
        self.publish(&ctx);
        planner.emergency_land().await
    }

    /// Set a flight mode by name. Allowed in any arm state; takes the vehicle
    /// away from a running mission.
    pub async fn mode_switch(&self, name: &str) -> FlightResult<FlightMode> {
        let mode: FlightMode = name.parse().map_err(|e| FlightError::InvalidCommand(format!("{:#}", e)))?;
        let mut ctx = self.ctx.lock().await;
        let link = ctx.link()?;
        let planner = match ctx.arm.planner() {
            Some(p) => p.clone(),
            None => self.new_planner(link),
        };
        ctx.cancel_flight();
        self.publish(&ctx);
        planner.switch_mode(&mode).await?;
        Ok(mode)
    }

    /// Arm, fly `waypoints` (`[lat, lon, alt]` each) at `groundspeed` m/s,
    /// and disarm again if the mission fails on the ground. A vehicle still
    /// flying after a failure is left armed for its RTL/LAND. Malformed input
    /// is rejected before the vehicle sees any command.
    pub async fn start_scan_mission(&self, waypoints: &[Vec<f64>], groundspeed: f64) -> FlightResult<MissionReport> {
        let mission = waypoints_from_triples(waypoints)?;
        validate_mission(&mission, groundspeed)?;
        {
            let ctx = self.ctx.lock().await;
            ctx.link()?;
            ctx.ensure_idle()?;
        }

        self.arm().await?;
        let (planner, id) = self.begin_flight("scan mission").await?;
        let result = MissionRunner::new(planner).run(&mission, groundspeed).await;
        self.end_flight(id).await;

        match result {
            Ok(report) => {
                info!(waypoints = report.waypoints_reached, "Scan mission finished.");
                Ok(report)
            }
            // whoever cancelled now owns the vehicle
            Err(FlightError::Cancelled) => Err(FlightError::Cancelled),
            Err(e) => {
                if self.airborne().await {
                    warn!("Scan mission failed ({}). Vehicle still airborne, leaving it armed.", e);
                } else {
                    warn!("Scan mission failed ({}). Disarming.", e);
                    if let Err(d) = self.disarm().await {
                        error!("disarm after failed mission: {}", d);
                    }
                }
                Err(e)
            }
        }
    }

    /// An unreadable altimeter counts as grounded.
    async fn airborne(&self) -> bool {
        let Some(link) = self.status().link else {
            return false;
        };
        link.handle.altitude_relative().await.is_ok_and(|alt| alt > AIRBORNE_ALT_M)
    }

    async fn begin_flight(&self, what: &'static str) -> FlightResult<(FlightPlanner, u64)> {
        let mut ctx = self.ctx.lock().await;
        let planner = ctx.armed_planner()?;
        ctx.ensure_idle()?;
        let id = self.flight_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let planner = planner.with_cancel(cancel.clone());
        ctx.flight = Some(ActiveFlight { id, what, cancel });
        self.publish(&ctx);
        Ok((planner, id))
    }

    async fn end_flight(&self, id: u64) {
        let mut ctx = self.ctx.lock().await;
        if ctx.flight.as_ref().is_some_and(|f| f.id == id) {
            ctx.flight = None;
            self.publish(&ctx);
        }
    }

    /// `None` when no vehicle is connected. Otherwise every channel is
    /// attempted; faults are reported inside the snapshot.
    pub async fn collect_telemetry(&self) -> Option<TelemetrySnapshot> {
        let probe = self.status.borrow().link.as_ref().map(|l| l.probe.clone())?;
        Some(collect_snapshot(probe.as_ref()).await)
    }

    pub fn heartbeat(&self) -> Heartbeat {
        let status = self.status.borrow();
        Heartbeat {
            seq: self.heartbeat_seq.fetch_add(1, Ordering::Relaxed),
            ts_unix_ms: now_unix_ms(),
            connected: status.connected(),
            arm_state: status.arm_state.to_string(),
            phase: status.flight_phase().map(|p| p.to_string()),
        }
    }

    pub fn acknowledge(&self, message: &str) {
        *self.last_ack.lock().unwrap_or_else(PoisonError::into_inner) = Some((Instant::now(), message.to_string()));
    }

    /// Time since the last client ack, if one was ever received.
    pub fn ack_age(&self) -> Option<Duration> {
        self.last_ack.lock().unwrap_or_else(PoisonError::into_inner).as_ref().map(|(at, _)| at.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use skyscan_fc::sim::{SimConfig, SimVehicle};
    use skyscan_fc::VehicleHandle;
    use skyscan_nav::FlightPhase;

    use super::*;

    struct SimConnector(Arc<SimVehicle>);

    #[async_trait]
    impl Connector for SimConnector {
        async fn connect(&self) -> Result<VehicleLink> {
            Ok(VehicleLink::new(self.0.clone(), "sim"))
        }
    }

    fn session(cfg: SimConfig) -> (Arc<FlightSessionCoordinator>, Arc<SimVehicle>) {
        let sim = Arc::new(SimVehicle::new(cfg));
        let coord = FlightSessionCoordinator::new(Arc::new(SimConnector(sim.clone())), PlannerConfig::default());
        (Arc::new(coord), sim)
    }

    fn planner_matches_arm_state(c: &FlightSessionCoordinator) -> bool {
        let s = c.status();
        s.phase.is_some() == (s.arm_state == ArmState::Armed)
    }

    async fn count(sim: &SimVehicle, prefix: &str) -> usize {
        sim.commands().await.iter().filter(|c| c.starts_with(prefix)).count()
    }

    #[tokio::test(start_paused = true)]
    async fn flight_commands_need_a_connection_then_arming() {
        let (c, sim) = session(SimConfig::default());
        assert!(matches!(c.arm().await, Err(FlightError::NotConnected)));
        assert!(matches!(c.manual(ManualCommand::ThrottleUp).await, Err(FlightError::NotConnected)));
        assert!(c.collect_telemetry().await.is_none());

        c.connect().await.unwrap();
        assert!(matches!(c.manual(ManualCommand::ThrottleUp).await, Err(FlightError::NotArmed)));
        assert!(matches!(c.set_altitude(5.0).await, Err(FlightError::NotArmed)));
        assert!(matches!(c.land().await, Err(FlightError::NotArmed)));
        assert!(sim.commands().await.is_empty());

        c.arm().await.unwrap();
        c.manual(ManualCommand::ThrottleUp).await.unwrap();
        c.manual(ManualCommand::PitchForward).await.unwrap();
        assert_eq!(sim.commands().await, vec!["arm", "rc ch3 1600", "rc ch2 1400"]);
    }

    #[tokio::test(start_paused = true)]
    async fn planner_exists_exactly_while_armed() {
        let (c, _sim) = session(SimConfig { accept_arm: false, ..SimConfig::default() });
        c.connect().await.unwrap();
        assert!(c.arm().await.is_err());
        assert_eq!(c.arm_state(), ArmState::Disarmed);
        assert!(planner_matches_arm_state(&c));
        assert!(matches!(c.disarm().await, Err(FlightError::NotArmed)));
        assert!(planner_matches_arm_state(&c));

        let (c, _sim) = session(SimConfig::default());
        c.connect().await.unwrap();
        for step in ["arm", "arm", "disarm", "disarm", "arm", "disarm"] {
            let _ = if step == "arm" { c.arm().await } else { c.disarm().await };
            assert!(planner_matches_arm_state(&c), "after {}", step);
        }
        assert_eq!(c.arm_state(), ArmState::Disarmed);
    }

    #[tokio::test(start_paused = true)]
    async fn telemetry_keeps_the_healthy_channels() {
        let (c, sim) = session(SimConfig::default());
        c.connect().await.unwrap();
        sim.fail_channel("gps").await;
        let snap = c.collect_telemetry().await.unwrap();
        assert_eq!(snap.ok_count(), 5);
        assert_eq!(snap.faults().len(), 1);
        assert_eq!(snap.faults()[0].0, "gps");
    }

    #[tokio::test(start_paused = true)]
    async fn scan_mission_ends_returning_to_launch() {
        let (c, sim) = session(SimConfig::default());
        c.connect().await.unwrap();
        let report = c
            .start_scan_mission(&[vec![1.0, 1.0, 10.0], vec![1.0, 1.0001, 10.0]], 5.0)
            .await
            .unwrap();

        assert_eq!(report.waypoints_reached, 2);
        assert_eq!(report.attempts, vec![1, 1]);
        assert_eq!(report.terminal_mode, Some(FlightMode::ReturnToLaunch));
        assert_eq!(sim.commands().await.last().map(String::as_str), Some("mode RTL"));
        assert_eq!(c.arm_state(), ArmState::Armed);
        assert!(!c.status().mission_active);
        assert_eq!(c.status().flight_phase(), Some(FlightPhase::ReturningHome));
    }

    #[tokio::test(start_paused = true)]
    async fn second_scan_rearms_after_the_autopilot_disarmed() {
        let (c, sim) = session(SimConfig::default());
        c.connect().await.unwrap();
        let scan = [vec![1.0, 1.0, 10.0], vec![1.0, 1.0001, 10.0]];
        c.start_scan_mission(&scan, 5.0).await.unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!sim.is_armed().await.unwrap());
        assert_eq!(c.arm_state(), ArmState::Armed);

        let report = c.start_scan_mission(&scan, 5.0).await.unwrap();
        assert_eq!(report.attempts, vec![1, 1]);
        assert_eq!(count(&sim, "arm").await, 2);
        assert_eq!(count(&sim, "takeoff").await, 2);
        assert_eq!(count(&sim, "disarm").await, 0);
        assert_eq!(c.status().flight_phase(), Some(FlightPhase::ReturningHome));
    }

    #[tokio::test(start_paused = true)]
    async fn climb_interrupted_by_a_mode_switch_can_be_resumed() {
        let (c, sim) = session(SimConfig::default());
        c.connect().await.unwrap();
        c.arm().await.unwrap();
        let climber = c.clone();
        let task = tokio::spawn(async move { climber.set_altitude(50.0).await });

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(c.status().flight_phase(), Some(FlightPhase::Climbing));
        assert_eq!(c.mode_switch("loiter").await.unwrap(), FlightMode::Loiter);
        assert!(matches!(task.await.unwrap(), Err(FlightError::Cancelled)));
        assert_eq!(c.status().flight_phase(), Some(FlightPhase::Holding));

        c.set_altitude(60.0).await.unwrap();
        assert!(sim.altitude_relative().await.unwrap() >= 57.0);

        let report = c.start_scan_mission(&[vec![1.0, 1.0001, 60.0]], 5.0).await.unwrap();
        assert_eq!(report.waypoints_reached, 1);
        assert_eq!(count(&sim, "disarm").await, 0);
        assert_eq!(c.arm_state(), ArmState::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_mission_in_the_air_stays_armed() {
        let (c, sim) = session(SimConfig::default());
        c.connect().await.unwrap();
        c.arm().await.unwrap();
        c.set_altitude(10.0).await.unwrap();
        sim.reject_mode(FlightMode::Guided).await;

        let err = c.start_scan_mission(&[vec![1.0, 1.0001, 5.0]], 5.0).await.unwrap_err();
        assert_eq!(err.kind(), "ArrivalNotReached");
        assert_eq!(count(&sim, "disarm").await, 0);
        assert_eq!(sim.current_mode().await, FlightMode::ReturnToLaunch);
        assert_eq!(c.arm_state(), ArmState::Armed);
        assert!(planner_matches_arm_state(&c));
    }

    #[tokio::test(start_paused = true)]
    async fn arming_is_refused_while_a_flight_runs() {
        let (c, _sim) = session(SimConfig::default());
        c.connect().await.unwrap();
        let runner = c.clone();
        let task = tokio::spawn(async move { runner.start_scan_mission(&[vec![1.0, 1.01, 10.0]], 5.0).await });
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(matches!(c.arm().await, Err(FlightError::Busy(_))));
        c.land().await.unwrap();
        assert!(matches!(task.await.unwrap(), Err(FlightError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_scan_requests_never_reach_the_vehicle() {
        let (c, sim) = session(SimConfig::default());
        c.connect().await.unwrap();
        for (wps, gs) in [
            (vec![], 5.0),
            (vec![vec![1.0, 1.0]], 5.0),
            (vec![vec![1.0, 1.0, 10.0, 4.0]], 5.0),
            (vec![vec![1.0, 1.0, 10.0]], 0.0),
            (vec![vec![1.0, 1.0, 10.0]], -3.0),
        ] {
            let err = c.start_scan_mission(&wps, gs).await.unwrap_err();
            assert!(matches!(err, FlightError::InvalidMission(_)), "{:?} at {}", wps, gs);
        }
        assert!(sim.commands().await.is_empty());
        assert_eq!(c.arm_state(), ArmState::Disarmed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_mission_disarms() {
        let (c, sim) = session(SimConfig::default());
        sim.reject_mode(FlightMode::Guided).await;
        c.connect().await.unwrap();
        let err = c.start_scan_mission(&[vec![1.0, 1.0001, 10.0]], 5.0).await.unwrap_err();
        assert_eq!(err.kind(), "ModeSwitchTimeout");
        assert_eq!(sim.commands().await.last().map(String::as_str), Some("disarm"));
        assert_eq!(c.arm_state(), ArmState::Disarmed);
        assert!(planner_matches_arm_state(&c));
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_halts_a_running_mission() {
        let (c, sim) = session(SimConfig::default());
        c.connect().await.unwrap();
        let runner = c.clone();
        let task = tokio::spawn(async move { runner.start_scan_mission(&[vec![1.0, 1.01, 10.0]], 5.0).await });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(c.status().mission_active);
        assert!(matches!(c.manual(ManualCommand::YawClockwise).await, Err(FlightError::Busy(_))));
        c.disarm().await.unwrap();

        assert!(matches!(task.await.unwrap(), Err(FlightError::Cancelled)));
        let before = sim.commands().await.len();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(sim.commands().await.len(), before);
        assert_eq!(count(&sim, "goto").await, 1);
        assert_eq!(c.arm_state(), ArmState::Disarmed);
        assert!(!c.status().mission_active);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_the_mission_and_drops_the_link() {
        let (c, _sim) = session(SimConfig::default());
        c.connect().await.unwrap();
        let runner = c.clone();
        let task = tokio::spawn(async move { runner.start_scan_mission(&[vec![1.0, 1.01, 10.0]], 5.0).await });
        tokio::time::sleep(Duration::from_secs(20)).await;

        c.disconnect().await.unwrap();
        assert!(matches!(task.await.unwrap(), Err(FlightError::Cancelled)));
        assert!(!c.status().connected());
        assert!(planner_matches_arm_state(&c));
        assert!(c.collect_telemetry().await.is_none());
        assert!(matches!(c.disconnect().await, Err(FlightError::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn failsafe_lands_only_an_armed_vehicle() {
        let (c, sim) = session(SimConfig::default());
        c.connect().await.unwrap();
        assert!(!c.failsafe().await);
        assert_eq!(count(&sim, "mode").await, 0);

        c.arm().await.unwrap();
        c.set_altitude(6.0).await.unwrap();
        assert!(c.failsafe().await);
        assert_eq!(sim.current_mode().await, FlightMode::Land);
        assert_eq!(c.status().flight_phase(), Some(FlightPhase::Landing));
    }

    #[tokio::test(start_paused = true)]
    async fn land_picks_rtl_or_land_by_fix() {
        let (c, sim) = session(SimConfig::default());
        c.connect().await.unwrap();
        c.arm().await.unwrap();
        c.set_altitude(5.0).await.unwrap();
        assert_eq!(c.land().await.unwrap(), FlightMode::ReturnToLaunch);

        sim.set_fix_type(1).await;
        assert_eq!(c.land().await.unwrap(), FlightMode::Land);
    }

    #[tokio::test(start_paused = true)]
    async fn mode_switch_works_disarmed_but_not_offline() {
        let (c, sim) = session(SimConfig::default());
        assert!(matches!(c.mode_switch("loiter").await, Err(FlightError::NotConnected)));
        c.connect().await.unwrap();
        assert_eq!(c.mode_switch("loiter").await.unwrap(), FlightMode::Loiter);
        assert_eq!(sim.commands().await, vec!["mode LOITER"]);
        assert!(matches!(c.mode_switch("").await, Err(FlightError::InvalidCommand(_))));
        assert!(matches!(c.set_altitude(f64::NAN).await, Err(FlightError::InvalidCommand(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_reports_arm_state_and_phase() {
        let (c, _sim) = session(SimConfig::default());
        let hb = c.heartbeat();
        assert_eq!((hb.seq, hb.connected, hb.arm_state.as_str(), hb.phase), (0, false, "disarmed", None));

        c.connect().await.unwrap();
        c.arm().await.unwrap();
        let hb = c.heartbeat();
        assert_eq!(hb.seq, 1);
        assert!(hb.connected);
        assert_eq!(hb.arm_state, "armed");
        assert_eq!(hb.phase.as_deref(), Some("grounded"));
    }

    #[tokio::test(start_paused = true)]
    async fn ack_age_tracks_the_last_ack() {
        let (c, _sim) = session(SimConfig::default());
        assert!(c.ack_age().is_none());
        c.acknowledge("pong");
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(c.ack_age(), Some(Duration::from_secs(3)));
    }
}
