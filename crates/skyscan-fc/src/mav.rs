use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mavlink::{
    common::{
        MavAutopilot, MavCmd, MavFrame, MavMessage, MavModeFlag, MavState, MavType,
        PositionTargetTypemask, COMMAND_LONG_DATA, HEARTBEAT_DATA, RC_CHANNELS_OVERRIDE_DATA,
        SET_POSITION_TARGET_GLOBAL_INT_DATA,
    },
    MavConnection, MavHeader,
};
use skyscan_proto::telemetry::{AttitudeData, BatteryStatus, GpsData, ImuData, NavData, SystemStatus};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::handle::{ManualAxis, TelemetryProbe, VehicleHandle};
use crate::mode::FlightMode;
use crate::safety::CommandRateLimit;
use crate::state::{fresh, LinkState};

type Conn = Arc<dyn MavConnection<MavMessage> + Send + Sync>;

/// Telemetry older than this is reported as a channel fault.
const MAX_TELEMETRY_AGE: Duration = Duration::from_secs(5);
/// How long arm/disarm waits for the heartbeat to reflect the new state.
const ARM_CONFIRM_TIMEOUT: Duration = Duration::from_secs(3);
// position-only setpoint: ignore velocity, acceleration and yaw fields
const POSITION_ONLY_MASK: u16 = 0b0000_1101_1111_1000;

#[derive(Debug, Clone)]
pub struct MavIds {
    pub sys_id: u8,
    pub comp_id: u8,
    pub target_sys: u8,
    pub target_comp: u8,
}

/// MAVLink link to an ArduCopter autopilot.
///
/// A reader thread keeps `LinkState` current and emits the companion
/// heartbeat; commands go out on the caller's task.
pub struct MavVehicle {
    conn: Conn,
    ids: MavIds,
    sequence: AtomicU8,
    state: Arc<Mutex<LinkState>>,
    limiter: Mutex<CommandRateLimit>,
    stop: Arc<AtomicBool>,
}

impl MavVehicle {
    /// Open `serial:<dev>:<baud>`. The device is opened once up front so a
    /// missing port fails with a useful message.
    pub fn open_serial(dev: &str, baud: u32, ids: MavIds, hb_hz: f32, manual_min_interval: Duration) -> Result<Self> {
        // quick validate device
        let _ = tokio_serial::new(dev, baud)
            .open_native_async()
            .with_context(|| format!("open fc serial device {}", dev))?;
        Self::open_url(&format!("serial:{}:{}", dev, baud), ids, hb_hz, manual_min_interval)
    }

    pub fn open_url(url: &str, ids: MavIds, hb_hz: f32, manual_min_interval: Duration) -> Result<Self> {
        let conn: Conn = Arc::from(
            mavlink::connect::<MavMessage>(url).with_context(|| format!("mavlink connect {}", url))?,
        );
        let state = Arc::new(Mutex::new(LinkState { port: Some(url.to_string()), ..LinkState::default() }));
        let stop = Arc::new(AtomicBool::new(false));

        spawn_reader(conn.clone(), state.clone(), stop.clone(), ids.clone(), hb_hz)?;
        info!("fc: link open on {}", url);

        Ok(Self {
            conn,
            ids,
            sequence: AtomicU8::new(0),
            state,
            limiter: Mutex::new(CommandRateLimit::new(manual_min_interval)),
            stop,
        })
    }

    fn state(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, msg: MavMessage) -> Result<()> {
        let hdr = MavHeader {
            system_id: self.ids.sys_id,
            component_id: self.ids.comp_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.conn.send(&hdr, &msg).context("mavlink send")?;
        Ok(())
    }

    fn command_long(&self, command: MavCmd, params: [f32; 7]) -> Result<()> {
        let cmd = COMMAND_LONG_DATA {
            target_system: self.ids.target_sys,
            target_component: self.ids.target_comp,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        };
        debug!("FC: sending {:?}", command);
        self.send(MavMessage::COMMAND_LONG(cmd))
    }

    fn heartbeat(&self) -> Result<HEARTBEAT_DATA> {
        let st = self.state();
        fresh(&st.heartbeat, "HEARTBEAT", MAX_TELEMETRY_AGE).cloned()
    }

    async fn wait_armed(&self, want: bool) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + ARM_CONFIRM_TIMEOUT;
        loop {
            if self.is_armed().await? == want {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

impl Drop for MavVehicle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn spawn_reader(conn: Conn, state: Arc<Mutex<LinkState>>, stop: Arc<AtomicBool>, ids: MavIds, hb_hz: f32) -> Result<()> {
    let hb_interval = Duration::from_secs_f32(1.0 / hb_hz.max(0.2));
    std::thread::Builder::new()
        .name("mav-reader".into())
        .spawn(move || {
            let mut last_hb_send: Option<std::time::Instant> = None;
            let mut sequence: u8 = 0;
            while !stop.load(Ordering::Relaxed) {
                // Send companion heartbeat periodically
                if last_hb_send.map_or(true, |t| t.elapsed() >= hb_interval) {
                    let hdr = MavHeader { system_id: ids.sys_id, component_id: ids.comp_id, sequence };
                    sequence = sequence.wrapping_add(1);
                    if let Err(e) = conn.send(&hdr, &companion_heartbeat()) {
                        warn!("fc: heartbeat send failed: {}", e);
                    }
                    last_hb_send = Some(std::time::Instant::now());
                }

                match conn.recv() {
                    Ok((_hdr, msg)) => state.lock().unwrap_or_else(PoisonError::into_inner).apply(msg),
                    Err(e) => {
                        debug!("fc: recv error: {}", e);
                        std::thread::sleep(Duration::from_millis(10));
                    }
                }
            }
            debug!("fc: reader stopped");
        })
        .context("spawn mavlink reader thread")?;
    Ok(())
}

fn companion_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

#[async_trait]
impl VehicleHandle for MavVehicle {
    async fn mode(&self) -> Result<FlightMode> {
        Ok(FlightMode::from_copter_custom_mode(self.heartbeat()?.custom_mode))
    }

    async fn request_mode(&self, mode: &FlightMode) -> Result<()> {
        let custom = mode
            .copter_custom_mode()
            .with_context(|| format!("mode {} has no ArduCopter number", mode))?;
        let base = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32;
        info!("FC: requesting mode {}", mode);
        self.command_long(MavCmd::MAV_CMD_DO_SET_MODE, [base, custom as f32, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    async fn gps_fix_type(&self) -> Result<u8> {
        let st = self.state();
        Ok(fresh(&st.gps, "GPS_RAW_INT", MAX_TELEMETRY_AGE)?.fix_type as u8)
    }

    async fn altitude_relative(&self) -> Result<f64> {
        let st = self.state();
        Ok(fresh(&st.position, "GLOBAL_POSITION_INT", MAX_TELEMETRY_AGE)?.relative_alt as f64 / 1000.0)
    }

    async fn position(&self) -> Result<(f64, f64)> {
        let st = self.state();
        let p = fresh(&st.position, "GLOBAL_POSITION_INT", MAX_TELEMETRY_AGE)?;
        Ok((p.lat as f64 / 1e7, p.lon as f64 / 1e7))
    }

    async fn request_takeoff(&self, altitude_m: f64) -> Result<()> {
        info!("FC: takeoff to {:.1} m", altitude_m);
        self.command_long(MavCmd::MAV_CMD_NAV_TAKEOFF, [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, altitude_m as f32])
    }

    async fn request_goto(&self, lat: f64, lon: f64, alt_m: f64) -> Result<()> {
        let setpoint = SET_POSITION_TARGET_GLOBAL_INT_DATA {
            lat_int: (lat * 1e7) as i32,
            lon_int: (lon * 1e7) as i32,
            alt: alt_m as f32,
            type_mask: PositionTargetTypemask::from_bits_truncate(POSITION_ONLY_MASK),
            target_system: self.ids.target_sys,
            target_component: self.ids.target_comp,
            coordinate_frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
            ..Default::default()
        };
        info!("FC: goto ({:.7}, {:.7}) at {:.1} m", lat, lon, alt_m);
        self.send(MavMessage::SET_POSITION_TARGET_GLOBAL_INT(setpoint))
    }

    async fn set_groundspeed(&self, mps: f64) -> Result<()> {
        // param1 = 1 selects ground speed, param3 = -1 leaves throttle unchanged
        self.command_long(MavCmd::MAV_CMD_DO_CHANGE_SPEED, [1.0, mps as f32, -1.0, 0.0, 0.0, 0.0, 0.0])
    }

    async fn arm(&self) -> Result<bool> {
        self.command_long(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])?;
        self.wait_armed(true).await
    }

    async fn disarm(&self) -> Result<bool> {
        self.command_long(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])?;
        self.wait_armed(false).await
    }

    async fn is_armed(&self) -> Result<bool> {
        Ok(self.heartbeat()?.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED))
    }

    async fn send_manual(&self, axis: ManualAxis, pwm: u16) -> Result<()> {
        let allowed = self.limiter.lock().unwrap_or_else(PoisonError::into_inner).allow(axis);
        if !allowed {
            warn!("manual {:?} rate-limited", axis);
            return Ok(());
        }
        // 0 releases a channel back to the RC transmitter
        let mut chans = [0u16; 4];
        chans[(axis.rc_channel() - 1) as usize] = pwm;
        let ov = RC_CHANNELS_OVERRIDE_DATA {
            target_system: self.ids.target_sys,
            target_component: self.ids.target_comp,
            chan1_raw: chans[0],
            chan2_raw: chans[1],
            chan3_raw: chans[2],
            chan4_raw: chans[3],
            ..Default::default()
        };
        self.send(MavMessage::RC_CHANNELS_OVERRIDE(ov))
    }

    async fn close(&self) -> Result<()> {
        self.stop.store(true, Ordering::Relaxed);
        info!("fc: link closed");
        Ok(())
    }
}

#[async_trait]
impl TelemetryProbe for MavVehicle {
    async fn nav(&self) -> Result<NavData> {
        let st = self.state();
        let p = fresh(&st.position, "GLOBAL_POSITION_INT", MAX_TELEMETRY_AGE)?;
        let vx = p.vx as f32 / 100.0;
        let vy = p.vy as f32 / 100.0;
        Ok(NavData {
            lat: p.lat as f64 / 1e7,
            lon: p.lon as f64 / 1e7,
            alt_rel_m: p.relative_alt as f32 / 1000.0,
            groundspeed_mps: (vx * vx + vy * vy).sqrt(),
            // hdg is UINT16_MAX when unknown
            heading_deg: if p.hdg == u16::MAX { 0.0 } else { p.hdg as f32 / 100.0 },
            climb_mps: -(p.vz as f32) / 100.0,
        })
    }

    async fn attitude(&self) -> Result<AttitudeData> {
        let st = self.state();
        let a = fresh(&st.attitude, "ATTITUDE", MAX_TELEMETRY_AGE)?;
        Ok(AttitudeData {
            roll_deg: a.roll.to_degrees(),
            pitch_deg: a.pitch.to_degrees(),
            yaw_deg: a.yaw.to_degrees(),
        })
    }

    async fn gps(&self) -> Result<GpsData> {
        let st = self.state();
        let g = fresh(&st.gps, "GPS_RAW_INT", MAX_TELEMETRY_AGE)?;
        Ok(GpsData {
            fix_type: g.fix_type as u8,
            satellites: g.satellites_visible,
            hdop: (g.eph != u16::MAX).then(|| g.eph as f32 / 100.0),
        })
    }

    async fn system(&self) -> Result<SystemStatus> {
        let st = self.state();
        let hb = fresh(&st.heartbeat, "HEARTBEAT", MAX_TELEMETRY_AGE)?;
        Ok(SystemStatus {
            mode: FlightMode::from_copter_custom_mode(hb.custom_mode).to_string(),
            armed: hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED),
            state: format!("{:?}", hb.system_status),
            heartbeat_age_ms: st.hb_age().map(|d| d.as_millis() as u64).unwrap_or_default(),
        })
    }

    async fn battery(&self) -> Result<BatteryStatus> {
        let st = self.state();
        Ok(fresh(&st.battery, "SYS_STATUS", MAX_TELEMETRY_AGE)?.clone())
    }

    async fn imu(&self) -> Result<ImuData> {
        let st = self.state();
        let i = fresh(&st.imu, "RAW_IMU", MAX_TELEMETRY_AGE)?;
        Ok(ImuData {
            xacc: i.xacc,
            yacc: i.yacc,
            zacc: i.zacc,
            xgyro: i.xgyro,
            ygyro: i.ygyro,
            zgyro: i.zgyro,
        })
    }
}
