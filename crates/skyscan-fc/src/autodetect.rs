use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use mavlink::common::MavMessage;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub dev: String,
    pub baud: u32,
    pub hb_seen: bool,
    pub elapsed_ms: u64,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct AutodetectResult {
    pub chosen: Option<(String, u32)>,
    pub probes: Vec<ProbeResult>,
}

pub fn default_candidate_devs() -> Vec<String> {
    vec![
        "/dev/ttyACM0".into(),
        "/dev/ttyACM1".into(),
        "/dev/ttyUSB0".into(),
        "/dev/ttyUSB1".into(),
        "/dev/serial0".into(),
        "/dev/ttyAMA0".into(),
    ]
}

pub fn default_candidate_bauds() -> Vec<u32> {
    vec![115200, 57600, 921600]
}

/// Probe every device at every baud and stop at the first one that yields an
/// autopilot HEARTBEAT.
pub fn autodetect_fc(candidate_devs: &[String], candidate_bauds: &[u32], heartbeat_timeout: Duration) -> AutodetectResult {
    let mut probes = Vec::new();

    for dev in candidate_devs {
        for baud in candidate_bauds {
            let start = Instant::now();
            let (hb_seen, note) = match probe(dev, *baud, heartbeat_timeout) {
                Ok(true) => (true, "heartbeat".to_string()),
                Ok(false) => (false, "no heartbeat".to_string()),
                Err(e) => {
                    warn!("fc autodetect probe failed dev={} baud={} err={:#}", dev, baud, e);
                    (false, format!("open/connect failed: {:#}", e))
                }
            };
            probes.push(ProbeResult {
                dev: dev.clone(),
                baud: *baud,
                hb_seen,
                elapsed_ms: start.elapsed().as_millis() as u64,
                note,
            });
            if hb_seen {
                info!("fc autodetect: OK {} @ {}", dev, baud);
                return AutodetectResult { chosen: Some((dev.clone(), *baud)), probes };
            }
        }
    }

    AutodetectResult { chosen: None, probes }
}

fn probe(dev: &str, baud: u32, heartbeat_timeout: Duration) -> Result<bool> {
    let url = format!("serial:{}:{}", dev, baud);
    let conn = mavlink::connect::<MavMessage>(&url).with_context(|| format!("mavlink connect {}", url))?;

    // recv blocks on a silent port, so wait on it from a helper thread
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("fc-probe".into())
        .spawn(move || {
            let deadline = Instant::now() + heartbeat_timeout;
            while Instant::now() < deadline {
                if let Ok((_hdr, msg)) = conn.recv() {
                    if msg.is_heartbeat() {
                        let _ = tx.send(());
                        return;
                    }
                }
            }
        })
        .context("spawn probe thread")?;

    Ok(rx.recv_timeout(heartbeat_timeout).is_ok())
}

// helper trait-ish on mavlink message without leaking mavlink type to callers
trait HeartbeatCheck {
    fn is_heartbeat(&self) -> bool;
}

impl HeartbeatCheck for MavMessage {
    fn is_heartbeat(&self) -> bool {
        matches!(self, MavMessage::HEARTBEAT(_))
    }
}
