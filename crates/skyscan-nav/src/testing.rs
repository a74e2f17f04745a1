//! Scripted vehicle for planner and mission tests. Every command is recorded;
//! state moves one step per read so tests control exactly what the planner sees.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use skyscan_fc::{FlightMode, ManualAxis, VehicleHandle};
use tokio::time::Instant;

use crate::geo::METERS_PER_DEGREE;

#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    Mode(FlightMode),
    Takeoff(f64),
    Goto(f64, f64, f64),
    Groundspeed(f64),
    Arm,
    Disarm,
    Manual(ManualAxis, u16),
}

#[derive(Debug)]
pub struct Script {
    pub mode: FlightMode,
    pub rejected: Vec<FlightMode>,
    pub alt: f64,
    pub climb_per_read: f64,
    pub fix_type: u8,
    /// After this many fix reads, the fix becomes the given value.
    pub fix_change: Option<(u32, u8)>,
    pub pos: (f64, f64),
    /// Meters closed per position read; `None` never moves.
    pub approach_m_per_read: Option<f64>,
    pub target: Option<(f64, f64)>,
    pub fail_altitude_after: Option<u32>,
    pub commands: Vec<Cmd>,
    pub position_reads: Vec<Instant>,
    pub altitude_reads: u32,
    pub fix_reads: u32,
    pub takeoff_issued: bool,
}

pub struct ScriptedVehicle(pub Mutex<Script>);

impl ScriptedVehicle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Script {
            mode: FlightMode::Other("STABILIZE".into()),
            rejected: Vec::new(),
            alt: 0.0,
            climb_per_read: 2.0,
            fix_type: 4,
            fix_change: None,
            pos: (1.0, 1.0),
            approach_m_per_read: Some(5.0),
            target: None,
            fail_altitude_after: None,
            commands: Vec::new(),
            position_reads: Vec::new(),
            altitude_reads: 0,
            fix_reads: 0,
            takeoff_issued: false,
        })))
    }

    pub fn edit(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.0.lock().unwrap());
    }

    pub fn commands(&self) -> Vec<Cmd> {
        self.0.lock().unwrap().commands.clone()
    }

    pub fn modes_requested(&self) -> Vec<FlightMode> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                Cmd::Mode(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn goto_count(&self) -> usize {
        self.commands().iter().filter(|c| matches!(c, Cmd::Goto(..))).count()
    }

    pub fn position_reads(&self) -> Vec<Instant> {
        self.0.lock().unwrap().position_reads.clone()
    }
}

#[async_trait]
impl VehicleHandle for ScriptedVehicle {
    async fn mode(&self) -> Result<FlightMode> {
        Ok(self.0.lock().unwrap().mode.clone())
    }

    async fn request_mode(&self, mode: &FlightMode) -> Result<()> {
        let mut s = self.0.lock().unwrap();
        s.commands.push(Cmd::Mode(mode.clone()));
        if !s.rejected.contains(mode) {
            s.mode = mode.clone();
        }
        Ok(())
    }

    async fn gps_fix_type(&self) -> Result<u8> {
        let mut s = self.0.lock().unwrap();
        s.fix_reads += 1;
        if let Some((after, value)) = s.fix_change {
            if s.fix_reads > after {
                s.fix_type = value;
            }
        }
        Ok(s.fix_type)
    }

    async fn altitude_relative(&self) -> Result<f64> {
        let mut s = self.0.lock().unwrap();
        s.altitude_reads += 1;
        if let Some(n) = s.fail_altitude_after {
            anyhow::ensure!(s.altitude_reads <= n, "altimeter read failed");
        }
        let alt = s.alt;
        if s.takeoff_issued && s.mode == FlightMode::Guided {
            s.alt += s.climb_per_read;
        }
        Ok(alt)
    }

    async fn position(&self) -> Result<(f64, f64)> {
        let mut s = self.0.lock().unwrap();
        s.position_reads.push(Instant::now());
        let pos = s.pos;
        if let (Some(step), Some((tlat, tlon))) = (s.approach_m_per_read, s.target) {
            let dlat = (tlat - pos.0) * METERS_PER_DEGREE;
            let dlon = (tlon - pos.1) * METERS_PER_DEGREE;
            let dist = (dlat * dlat + dlon * dlon).sqrt();
            s.pos = if dist <= step {
                (tlat, tlon)
            } else {
                let k = step / dist;
                (pos.0 + (tlat - pos.0) * k, pos.1 + (tlon - pos.1) * k)
            };
        }
        Ok(pos)
    }

    async fn request_takeoff(&self, altitude_m: f64) -> Result<()> {
        let mut s = self.0.lock().unwrap();
        s.commands.push(Cmd::Takeoff(altitude_m));
        s.takeoff_issued = true;
        Ok(())
    }

    async fn request_goto(&self, lat: f64, lon: f64, alt_m: f64) -> Result<()> {
        let mut s = self.0.lock().unwrap();
        s.commands.push(Cmd::Goto(lat, lon, alt_m));
        s.target = Some((lat, lon));
        Ok(())
    }

    async fn set_groundspeed(&self, mps: f64) -> Result<()> {
        self.0.lock().unwrap().commands.push(Cmd::Groundspeed(mps));
        Ok(())
    }

    async fn arm(&self) -> Result<bool> {
        self.0.lock().unwrap().commands.push(Cmd::Arm);
        Ok(true)
    }

    async fn disarm(&self) -> Result<bool> {
        self.0.lock().unwrap().commands.push(Cmd::Disarm);
        Ok(true)
    }

    async fn is_armed(&self) -> Result<bool> {
        Ok(true)
    }

    async fn send_manual(&self, axis: ManualAxis, pwm: u16) -> Result<()> {
        self.0.lock().unwrap().commands.push(Cmd::Manual(axis, pwm));
        Ok(())
    }
}
