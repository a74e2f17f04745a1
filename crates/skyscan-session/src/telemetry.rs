use std::future::Future;

use skyscan_fc::TelemetryProbe;
use skyscan_proto::now_unix_ms;
use skyscan_proto::telemetry::{Channel, TelemetrySnapshot};
use thiserror::Error;
use tracing::debug;

/// One telemetry channel that could not be read. Always rendered into the
/// snapshot, never returned to a caller.
#[derive(Debug, Error)]
#[error("{channel}: {source:#}")]
pub struct TelemetryChannelFault {
    pub channel: &'static str,
    #[source]
    pub source: anyhow::Error,
}

async fn read<T>(channel: &'static str, fut: impl Future<Output = anyhow::Result<T>>) -> Channel<T> {
    match fut.await {
        Ok(value) => Channel::Ok { value },
        Err(source) => {
            let fault = TelemetryChannelFault { channel, source };
            debug!("telemetry fault: {}", fault);
            Channel::Fault { error: format!("{:#}", fault.source) }
        }
    }
}

/// Read all six channels. A fault on one never stops the others.
pub async fn collect_snapshot(probe: &dyn TelemetryProbe) -> TelemetrySnapshot {
    TelemetrySnapshot {
        ts_unix_ms: now_unix_ms(),
        nav: read("nav", probe.nav()).await,
        attitude: read("attitude", probe.attitude()).await,
        gps: read("gps", probe.gps()).await,
        system: read("system", probe.system()).await,
        battery: read("battery", probe.battery()).await,
        imu: read("imu", probe.imu()).await,
    }
}
