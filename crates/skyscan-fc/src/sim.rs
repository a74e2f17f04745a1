//! Kinematic stand-in for an autopilot, driven by tokio time so tests can run
//! whole missions under a paused clock.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use skyscan_proto::telemetry::{AttitudeData, BatteryStatus, GpsData, ImuData, NavData, SystemStatus};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::geo::planar_distance_m;
use crate::handle::{ManualAxis, TelemetryProbe, VehicleHandle};
use crate::mode::FlightMode;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub home_lat: f64,
    pub home_lon: f64,
    pub fix_type: u8,
    pub climb_rate_mps: f64,
    pub descent_rate_mps: f64,
    pub mode_latency_ms: u64,
    pub accept_arm: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            home_lat: 1.0,
            home_lon: 1.0,
            fix_type: 4,
            climb_rate_mps: 2.5,
            descent_rate_mps: 1.5,
            mode_latency_ms: 200,
            accept_arm: true,
        }
    }
}

#[derive(Debug)]
struct SimState {
    mode: FlightMode,
    pending_mode: Option<(Instant, FlightMode)>,
    armed: bool,
    lat: f64,
    lon: f64,
    alt: f64,
    takeoff_alt: Option<f64>,
    target: Option<(f64, f64, f64)>,
    groundspeed: f64,
    fix_type: u8,
    last_tick: Instant,
    rejected_modes: HashSet<String>,
    failing_channels: HashSet<&'static str>,
    frozen: bool,
    commands: Vec<String>,
}

pub struct SimVehicle {
    cfg: SimConfig,
    st: Mutex<SimState>,
}

impl SimVehicle {
    pub fn new(cfg: SimConfig) -> Self {
        let st = SimState {
            mode: FlightMode::Other("STABILIZE".into()),
            pending_mode: None,
            armed: false,
            lat: cfg.home_lat,
            lon: cfg.home_lon,
            alt: 0.0,
            takeoff_alt: None,
            target: None,
            groundspeed: 5.0,
            fix_type: cfg.fix_type,
            last_tick: Instant::now(),
            rejected_modes: HashSet::new(),
            failing_channels: HashSet::new(),
            frozen: false,
            commands: Vec::new(),
        };
        Self { cfg, st: Mutex::new(st) }
    }

    pub async fn set_fix_type(&self, fix_type: u8) {
        self.st.lock().await.fix_type = fix_type;
    }

    /// Mode requests for `mode` are acknowledged but never take effect.
    pub async fn reject_mode(&self, mode: FlightMode) {
        self.st.lock().await.rejected_modes.insert(mode.name().to_string());
    }

    /// Make one telemetry channel (`nav`, `attitude`, ...) fail to decode.
    pub async fn fail_channel(&self, channel: &'static str) {
        self.st.lock().await.failing_channels.insert(channel);
    }

    /// Stop all motion, as if the vehicle were held against a headwind.
    pub async fn freeze(&self, frozen: bool) {
        self.st.lock().await.frozen = frozen;
    }

    /// Every command received so far, oldest first.
    pub async fn commands(&self) -> Vec<String> {
        self.st.lock().await.commands.clone()
    }

    pub async fn current_mode(&self) -> FlightMode {
        let mut st = self.st.lock().await;
        self.advance(&mut st);
        st.mode.clone()
    }

    fn advance(&self, st: &mut SimState) {
        let now = Instant::now();
        let dt = now.duration_since(st.last_tick).as_secs_f64();
        st.last_tick = now;

        if let Some((at, mode)) = st.pending_mode.take() {
            if now >= at {
                st.mode = mode;
            } else {
                st.pending_mode = Some((at, mode));
            }
        }
        if !st.armed || st.frozen || dt <= 0.0 {
            return;
        }

        match st.mode {
            FlightMode::Guided => {
                if let Some(goal) = st.takeoff_alt {
                    st.alt = approach(st.alt, goal, self.cfg.climb_rate_mps * dt);
                    if st.alt >= goal {
                        st.takeoff_alt = None;
                    }
                } else if let Some((lat, lon, alt)) = st.target {
                    move_toward(st, lat, lon, dt);
                    st.alt = approach(st.alt, alt, self.cfg.climb_rate_mps * dt);
                }
            }
            FlightMode::Land => self.descend(st, dt),
            FlightMode::ReturnToLaunch => {
                let left = move_toward(st, self.cfg.home_lat, self.cfg.home_lon, dt);
                self.descend(st, left);
            }
            _ => {}
        }
    }

    /// Autopilots disarm on touchdown.
    fn descend(&self, st: &mut SimState, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        st.alt = approach(st.alt, 0.0, self.cfg.descent_rate_mps * dt);
        if st.alt <= 0.0 {
            st.armed = false;
        }
    }

    async fn record(&self, cmd: String) -> tokio::sync::MutexGuard<'_, SimState> {
        let mut st = self.st.lock().await;
        self.advance(&mut st);
        debug!("sim: {}", cmd);
        st.commands.push(cmd);
        st
    }

    async fn with_channel<T>(&self, channel: &'static str, read: impl FnOnce(&SimState) -> T) -> Result<T> {
        let mut st = self.st.lock().await;
        self.advance(&mut st);
        anyhow::ensure!(!st.failing_channels.contains(channel), "sim: {} decoder fault", channel);
        Ok(read(&st))
    }
}

fn approach(cur: f64, goal: f64, step: f64) -> f64 {
    if (goal - cur).abs() <= step { goal } else { cur + step * (goal - cur).signum() }
}

/// Move at groundspeed for up to `dt` seconds; returns the time left over
/// once the target is reached.
fn move_toward(st: &mut SimState, lat: f64, lon: f64, dt: f64) -> f64 {
    let dist = planar_distance_m(st.lat, st.lon, lat, lon);
    if dist <= 0.0 {
        return dt;
    }
    if st.groundspeed <= 0.0 {
        return 0.0;
    }
    let step = st.groundspeed * dt;
    if dist <= step {
        st.lat = lat;
        st.lon = lon;
        dt - dist / st.groundspeed
    } else {
        let k = step / dist;
        st.lat += (lat - st.lat) * k;
        st.lon += (lon - st.lon) * k;
        0.0
    }
}

#[async_trait]
impl VehicleHandle for SimVehicle {
    async fn mode(&self) -> Result<FlightMode> {
        Ok(self.current_mode().await)
    }

    async fn request_mode(&self, mode: &FlightMode) -> Result<()> {
        let mut st = self.record(format!("mode {}", mode)).await;
        if st.rejected_modes.contains(mode.name()) {
            return Ok(());
        }
        let at = Instant::now() + Duration::from_millis(self.cfg.mode_latency_ms);
        st.pending_mode = Some((at, mode.clone()));
        Ok(())
    }

    async fn gps_fix_type(&self) -> Result<u8> {
        Ok(self.st.lock().await.fix_type)
    }

    async fn altitude_relative(&self) -> Result<f64> {
        let mut st = self.st.lock().await;
        self.advance(&mut st);
        Ok(st.alt)
    }

    async fn position(&self) -> Result<(f64, f64)> {
        let mut st = self.st.lock().await;
        self.advance(&mut st);
        Ok((st.lat, st.lon))
    }

    async fn request_takeoff(&self, altitude_m: f64) -> Result<()> {
        let mut st = self.record(format!("takeoff {:.1}", altitude_m)).await;
        anyhow::ensure!(st.armed, "sim: takeoff refused, vehicle disarmed");
        st.target = None;
        st.takeoff_alt = Some(altitude_m);
        Ok(())
    }

    async fn request_goto(&self, lat: f64, lon: f64, alt_m: f64) -> Result<()> {
        let mut st = self.record(format!("goto {:.7} {:.7} {:.1}", lat, lon, alt_m)).await;
        st.takeoff_alt = None;
        st.target = Some((lat, lon, alt_m));
        Ok(())
    }

    async fn set_groundspeed(&self, mps: f64) -> Result<()> {
        let mut st = self.record(format!("groundspeed {:.1}", mps)).await;
        st.groundspeed = mps;
        Ok(())
    }

    async fn arm(&self) -> Result<bool> {
        let mut st = self.record("arm".into()).await;
        if self.cfg.accept_arm {
            st.armed = true;
        }
        Ok(st.armed)
    }

    async fn disarm(&self) -> Result<bool> {
        let mut st = self.record("disarm".into()).await;
        st.armed = false;
        Ok(true)
    }

    async fn is_armed(&self) -> Result<bool> {
        let mut st = self.st.lock().await;
        self.advance(&mut st);
        Ok(st.armed)
    }

    async fn send_manual(&self, axis: ManualAxis, pwm: u16) -> Result<()> {
        self.record(format!("rc ch{} {}", axis.rc_channel(), pwm)).await;
        Ok(())
    }
}

#[async_trait]
impl TelemetryProbe for SimVehicle {
    async fn nav(&self) -> Result<NavData> {
        self.with_channel("nav", |st| NavData {
            lat: st.lat,
            lon: st.lon,
            alt_rel_m: st.alt as f32,
            groundspeed_mps: if st.target.is_some() { st.groundspeed as f32 } else { 0.0 },
            heading_deg: 0.0,
            climb_mps: 0.0,
        })
        .await
    }

    async fn attitude(&self) -> Result<AttitudeData> {
        self.with_channel("attitude", |_| AttitudeData { roll_deg: 0.0, pitch_deg: 0.0, yaw_deg: 0.0 }).await
    }

    async fn gps(&self) -> Result<GpsData> {
        self.with_channel("gps", |st| GpsData {
            fix_type: st.fix_type,
            satellites: if st.fix_type >= 3 { 12 } else { 3 },
            hdop: Some(if st.fix_type >= 3 { 0.8 } else { 9.9 }),
        })
        .await
    }

    async fn system(&self) -> Result<SystemStatus> {
        self.with_channel("system", |st| SystemStatus {
            mode: st.mode.to_string(),
            armed: st.armed,
            state: if st.armed { "MAV_STATE_ACTIVE".into() } else { "MAV_STATE_STANDBY".into() },
            heartbeat_age_ms: 0,
        })
        .await
    }

    async fn battery(&self) -> Result<BatteryStatus> {
        self.with_channel("battery", |_| BatteryStatus { voltage: Some(16.4), current: Some(0.8), remaining: Some(96) })
            .await
    }

    async fn imu(&self) -> Result<ImuData> {
        self.with_channel("imu", |_| ImuData { xacc: 0, yacc: 0, zacc: -1000, xgyro: 0, ygyro: 0, zgyro: 0 }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn takeoff_climbs_only_in_guided() {
        let sim = SimVehicle::new(SimConfig::default());
        assert!(sim.arm().await.unwrap());
        sim.request_takeoff(10.0).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sim.altitude_relative().await.unwrap(), 0.0);

        sim.request_mode(&FlightMode::Guided).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sim.mode().await.unwrap(), FlightMode::Guided);
        tokio::time::sleep(Duration::from_secs(2)).await;
        let alt = sim.altitude_relative().await.unwrap();
        assert!(alt > 4.0 && alt < 10.0, "alt {}", alt);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_mode_never_takes_effect() {
        let sim = SimVehicle::new(SimConfig::default());
        sim.reject_mode(FlightMode::Loiter).await;
        sim.request_mode(&FlightMode::Loiter).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_ne!(sim.mode().await.unwrap(), FlightMode::Loiter);
        assert_eq!(sim.commands().await, vec!["mode LOITER".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn return_flies_home_lands_and_disarms_in_one_long_step() {
        let sim = SimVehicle::new(SimConfig::default());
        sim.arm().await.unwrap();
        sim.request_mode(&FlightMode::Guided).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        sim.request_takeoff(10.0).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        sim.request_goto(1.0, 1.0002, 10.0).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sim.position().await.unwrap(), (1.0, 1.0002));
        assert_eq!(sim.altitude_relative().await.unwrap(), 10.0);

        sim.request_mode(&FlightMode::ReturnToLaunch).await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(sim.position().await.unwrap(), (1.0, 1.0));
        assert_eq!(sim.altitude_relative().await.unwrap(), 0.0);
        assert!(!sim.is_armed().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn failing_channel_only_affects_that_channel() {
        let sim = SimVehicle::new(SimConfig::default());
        sim.fail_channel("imu").await;
        assert!(sim.imu().await.is_err());
        assert!(sim.gps().await.is_ok());
    }
}
