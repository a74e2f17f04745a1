use std::sync::Arc;
use std::time::Duration;

use skyscan_fc::{FlightMode, GpsFixQuality, VehicleHandle};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PlannerConfig;
use crate::error::{FlightError, FlightResult};
use crate::geo::{planar_distance_m, Waypoint};
use crate::phase::{FlightPhase, PhaseEvent};

/// Relative altitude above which a vehicle is taken to be flying.
const AIRBORNE_ALT_M: f64 = 0.5;

/// Mode transitions, takeoff, single-waypoint navigation, hold and emergency
/// descent for one armed vehicle.
///
/// Clones share the vehicle and the published phase. `with_cancel` gives a
/// clone whose polling loops stop when that token is cancelled; mode
/// switches themselves are never cancelled so safety commands always go out.
#[derive(Clone)]
pub struct FlightPlanner {
    vehicle: Arc<dyn VehicleHandle>,
    cfg: PlannerConfig,
    cancel: CancellationToken,
    phase: Arc<watch::Sender<FlightPhase>>,
}

impl FlightPlanner {
    pub fn new(vehicle: Arc<dyn VehicleHandle>, cfg: PlannerConfig) -> Self {
        let (tx, _rx) = watch::channel(FlightPhase::Grounded);
        Self { vehicle, cfg, cancel: CancellationToken::new(), phase: Arc::new(tx) }
    }

    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self { cancel, ..self.clone() }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn phase(&self) -> FlightPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<FlightPhase> {
        self.phase.subscribe()
    }

    fn transition(&self, event: PhaseEvent) -> FlightResult<()> {
        let next = self.phase().on(event)?;
        self.publish(next);
        Ok(())
    }

    fn publish(&self, next: FlightPhase) {
        let prev = self.phase.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "flight phase");
        }
    }

    /// Request `mode`, wait the fixed confirmation delay, then check once.
    pub async fn set_mode(&self, mode: &FlightMode) -> FlightResult<()> {
        info!("Switching to {} mode...", mode);
        self.vehicle.request_mode(mode).await?;
        tokio::time::sleep(self.cfg.mode_confirm_delay()).await;

        let reported = self.vehicle.mode().await?;
        if &reported == mode {
            info!("Switched to {}.", mode);
            Ok(())
        } else {
            warn!(requested = %mode, reported = %reported, "mode switch not confirmed");
            Err(FlightError::ModeSwitchTimeout { requested: mode.clone(), reported })
        }
    }

    /// `set_mode` for commands from outside the planner's own sequences. The
    /// published phase follows the confirmed mode.
    pub async fn switch_mode(&self, mode: &FlightMode) -> FlightResult<()> {
        self.set_mode(mode).await?;
        let next = self.phase().after_mode(mode);
        self.publish(next);
        Ok(())
    }

    /// Drop a climb or transit that was cancelled before it finished.
    pub fn settle(&self) {
        self.publish(self.phase().settled());
    }

    /// Seed the phase from the vehicle itself, for a planner taking over a
    /// vehicle that may already be flying. Unreadable state leaves it alone.
    pub async fn resync(&self) {
        let (Ok(alt), Ok(mode)) = (self.vehicle.altitude_relative().await, self.vehicle.mode().await) else {
            return;
        };
        if alt > AIRBORNE_ALT_M {
            self.publish(FlightPhase::Holding.after_mode(&mode));
        }
    }

    pub async fn fix_quality(&self) -> FlightResult<GpsFixQuality> {
        let fix = self.vehicle.gps_fix_type().await?;
        let q = GpsFixQuality::from_fix_type(fix);
        debug!(fix_type = fix, quality = ?q, "gps fix");
        Ok(q)
    }

    /// Hold mode used right after takeoff. A weak fix cannot loiter, so the
    /// vehicle is brought back down instead.
    async fn takeoff_hold_mode(&self) -> FlightResult<FlightMode> {
        Ok(if self.fix_quality().await?.is_adequate() { FlightMode::Loiter } else { FlightMode::Land })
    }

    /// Climb to `target_alt` (relative, meters) and hold there.
    pub async fn takeoff_and_hold(&self, target_alt: f64) -> FlightResult<()> {
        let current = match self.vehicle.altitude_relative().await {
            Ok(alt) => alt,
            Err(e) => return Err(self.land_after(e.into()).await),
        };
        if current >= target_alt {
            info!("Already at {:.1} m (target {:.1} m). No climb needed.", current, target_alt);
            return self.transition(PhaseEvent::AltitudeReached);
        }

        let hold = match self.takeoff_hold_mode().await {
            Ok(m) => m,
            Err(e) => return Err(self.land_after(e).await),
        };
        info!("Selecting hover mode {}", hold);

        // not airborne yet: a failed GUIDED switch aborts without landing
        if let Err(e) = self.set_mode(&FlightMode::Guided).await {
            warn!("Failed to switch to GUIDED mode. Aborting takeoff.");
            return Err(e);
        }

        if let Err(e) = self.climb(target_alt).await {
            return Err(self.land_after(e).await);
        }

        // the fix may have changed during the climb
        let hold = match self.takeoff_hold_mode().await {
            Ok(m) => m,
            Err(e) => return Err(self.land_after(e).await),
        };
        info!("Final hover mode {}", hold);

        if let Err(e) = self.set_mode(&hold).await {
            warn!("Failed to switch hover mode. Landing for safety.");
            self.force_land().await;
            return Err(e);
        }
        if hold == FlightMode::Land {
            self.transition(PhaseEvent::LandCommanded)?;
        }
        info!("Hovering at {:.1} m in {} mode.", target_alt, hold);
        Ok(())
    }

    async fn climb(&self, target_alt: f64) -> FlightResult<()> {
        self.check_cancelled()?;
        info!("Taking off to {:.1} m...", target_alt);
        self.vehicle.request_takeoff(target_alt).await?;
        self.transition(PhaseEvent::TakeoffCommanded)?;

        let threshold = target_alt * self.cfg.climb_arrival_ratio;
        let started = Instant::now();
        loop {
            self.check_cancelled()?;
            let alt = self.vehicle.altitude_relative().await?;
            debug!(alt_m = alt, target_m = target_alt, "climbing");
            if alt >= threshold {
                info!("Altitude {:.1} m reached.", target_alt);
                return self.transition(PhaseEvent::AltitudeReached);
            }
            if !self.wait_tick(self.cfg.altitude_poll(), started, self.cfg.takeoff_deadline()).await? {
                return Err(FlightError::ArrivalNotReached {
                    target: format!("altitude {:.1} m", target_alt),
                    detail: format!("at {:.1} m when the climb deadline expired", alt),
                });
            }
        }
    }

    /// Fly to `wp` at `groundspeed` m/s and return once within the arrival
    /// radius. Without a configured deadline this waits indefinitely; retry
    /// policy belongs to the caller.
    pub async fn goto_waypoint(&self, wp: &Waypoint, groundspeed: f64) -> FlightResult<()> {
        self.phase().on(PhaseEvent::GotoCommanded)?;
        self.check_cancelled()?;
        info!("Navigating to waypoint ({}, {}, {} m)", wp.latitude, wp.longitude, wp.altitude_m);

        self.set_mode(&FlightMode::Guided).await?;
        self.check_cancelled()?;
        self.vehicle.set_groundspeed(groundspeed).await?;
        self.vehicle.request_goto(wp.latitude, wp.longitude, wp.altitude_m).await?;
        self.transition(PhaseEvent::GotoCommanded)?;

        let started = Instant::now();
        loop {
            self.check_cancelled()?;
            let (lat, lon) = self.vehicle.position().await?;
            let distance = planar_distance_m(lat, lon, wp.latitude, wp.longitude);
            debug!(distance_m = distance, "distance to waypoint");
            if distance <= self.cfg.arrival_radius_m {
                info!("Reached waypoint.");
                return self.transition(PhaseEvent::Arrived);
            }
            if !self.wait_tick(self.cfg.waypoint_poll(), started, self.cfg.goto_deadline()).await? {
                return Err(FlightError::ArrivalNotReached {
                    target: format!("waypoint ({}, {})", wp.latitude, wp.longitude),
                    detail: format!("{:.1} m away when the goto deadline expired", distance),
                });
            }
        }
    }

    /// Stop and hold position: LOITER with a good fix, BRAKE otherwise.
    pub async fn hold(&self) -> FlightResult<FlightMode> {
        self.phase().on(PhaseEvent::HoldCommanded)?;
        self.check_cancelled()?;
        let mode = if self.fix_quality().await?.is_adequate() { FlightMode::Loiter } else { FlightMode::Brake };
        info!("Switching to hold mode {}", mode);
        self.set_mode(&mode).await?;
        self.transition(PhaseEvent::HoldCommanded)?;
        info!("Vehicle is now holding position.");
        Ok(mode)
    }

    /// Return to launch when navigation is trustworthy, otherwise land in place.
    /// An unreadable fix counts as weak.
    pub async fn emergency_land(&self) -> FlightResult<FlightMode> {
        let quality = match self.fix_quality().await {
            Ok(q) => q,
            Err(e) => {
                warn!("fix unreadable ({}), treating as weak", e);
                GpsFixQuality::Weak
            }
        };
        let (mode, event) = if quality.is_adequate() {
            info!("GPS fix strong. Returning to launch.");
            (FlightMode::ReturnToLaunch, PhaseEvent::ReturnCommanded)
        } else {
            warn!("Weak GPS! Performing immediate LAND.");
            (FlightMode::Land, PhaseEvent::LandCommanded)
        };
        self.transition(event)?;
        self.set_mode(&mode).await?;
        Ok(mode)
    }

    /// Best-effort LAND. The switch is verified once by `set_mode`; failure is
    /// logged and reported but not retried.
    pub async fn force_land(&self) -> bool {
        warn!("Emergency landing for safety!");
        let _ = self.transition(PhaseEvent::LandCommanded);
        match self.set_mode(&FlightMode::Land).await {
            Ok(()) => true,
            Err(e) => {
                error!("forced LAND not confirmed: {}", e);
                false
            }
        }
    }

    /// Land after a fault that may have left the vehicle airborne. Cancellation
    /// hands the vehicle to whoever cancelled, so nothing is sent then.
    async fn land_after(&self, err: FlightError) -> FlightError {
        match err {
            FlightError::UnexpectedFault(_) | FlightError::ArrivalNotReached { .. } => {
                error!("{}", err);
                self.force_land().await;
            }
            _ => {}
        }
        err
    }

    fn check_cancelled(&self) -> FlightResult<()> {
        if self.cancel.is_cancelled() {
            return Err(FlightError::Cancelled);
        }
        Ok(())
    }

    /// Sleep one poll interval. `Ok(false)` once `deadline` has elapsed since
    /// `started`.
    async fn wait_tick(&self, interval: Duration, started: Instant, deadline: Option<Duration>) -> FlightResult<bool> {
        if let Some(limit) = deadline {
            if started.elapsed() >= limit {
                return Ok(false);
            }
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FlightError::Cancelled),
            _ = tokio::time::sleep(interval) => Ok(true),
        }
    }
}
