pub mod command;
pub mod telemetry;

/// Milliseconds since the unix epoch, as stamped on every outbound event.
pub fn now_unix_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
