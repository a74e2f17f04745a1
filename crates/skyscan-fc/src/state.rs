use std::time::{Duration, Instant};

use anyhow::Result;
use mavlink::common::{
    MavMessage, ATTITUDE_DATA, GLOBAL_POSITION_INT_DATA, GPS_RAW_INT_DATA, HEARTBEAT_DATA,
    RAW_IMU_DATA, SYS_STATUS_DATA,
};
use skyscan_proto::telemetry::BatteryStatus;

#[derive(Debug, Clone)]
pub struct Stamped<T> {
    pub at: Instant,
    pub data: T,
}

/// Latest decoded message of each kind, as seen by the link reader.
#[derive(Debug, Clone, Default)]
pub struct LinkState {
    pub port: Option<String>,
    pub heartbeat: Option<Stamped<HEARTBEAT_DATA>>,
    pub position: Option<Stamped<GLOBAL_POSITION_INT_DATA>>,
    pub gps: Option<Stamped<GPS_RAW_INT_DATA>>,
    pub attitude: Option<Stamped<ATTITUDE_DATA>>,
    pub imu: Option<Stamped<RAW_IMU_DATA>>,
    pub battery: Option<Stamped<BatteryStatus>>,
}

impl LinkState {
    pub fn apply(&mut self, msg: MavMessage) {
        let at = Instant::now();
        match msg {
            MavMessage::HEARTBEAT(data) => self.heartbeat = Some(Stamped { at, data }),
            MavMessage::GLOBAL_POSITION_INT(data) => self.position = Some(Stamped { at, data }),
            MavMessage::GPS_RAW_INT(data) => self.gps = Some(Stamped { at, data }),
            MavMessage::ATTITUDE(data) => self.attitude = Some(Stamped { at, data }),
            MavMessage::RAW_IMU(data) => self.imu = Some(Stamped { at, data }),
            MavMessage::SYS_STATUS(status) => {
                self.battery = Some(Stamped { at, data: decode_battery(&status) });
            }
            _ => {}
        }
    }

    pub fn hb_age(&self) -> Option<Duration> {
        self.heartbeat.as_ref().map(|h| h.at.elapsed())
    }
}

/// Data of `slot` if it was received within `max_age`.
pub fn fresh<'a, T>(slot: &'a Option<Stamped<T>>, what: &str, max_age: Duration) -> Result<&'a T> {
    let Some(s) = slot else {
        anyhow::bail!("no {} received yet", what);
    };
    let age = s.at.elapsed();
    anyhow::ensure!(age <= max_age, "{} stale ({} ms old)", what, age.as_millis());
    Ok(&s.data)
}

fn decode_battery(status: &SYS_STATUS_DATA) -> BatteryStatus {
    let mut battery = BatteryStatus::default();
    // voltage_battery is in millivolts, convert to volts
    if status.voltage_battery != u16::MAX {
        battery.voltage = Some(status.voltage_battery as f32 / 1000.0);
    }
    // current_battery is in centiamps (0.01A), -1 means invalid
    if status.current_battery != -1 {
        battery.current = Some(status.current_battery as f32 / 100.0);
    }
    // battery_remaining is percentage 0-100, -1 means invalid
    if (0..=100).contains(&status.battery_remaining) {
        battery.remaining = Some(status.battery_remaining as u8);
    }
    battery
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_slot_reports_what_is_missing() {
        let st = LinkState::default();
        let err = fresh(&st.gps, "GPS_RAW_INT", Duration::from_secs(5)).unwrap_err();
        assert!(err.to_string().contains("no GPS_RAW_INT received yet"));
    }

    #[test]
    fn stale_slot_is_rejected() {
        let mut st = LinkState::default();
        st.battery = Some(Stamped { at: Instant::now() - Duration::from_secs(10), data: BatteryStatus::default() });
        assert!(fresh(&st.battery, "SYS_STATUS", Duration::from_secs(5)).is_err());
        assert!(fresh(&st.battery, "SYS_STATUS", Duration::from_secs(60)).is_ok());
    }
}
