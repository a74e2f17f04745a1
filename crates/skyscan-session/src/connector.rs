use anyhow::{Context, Result};
use async_trait::async_trait;
use skyscan_fc::sim::SimConfig;
use skyscan_fc::{open_vehicle, VehicleConfig, VehicleLink};

/// Source of vehicle links for `FlightSessionCoordinator::connect`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<VehicleLink>;
}

/// Opens whatever `[vehicle]` describes: a serial port (fixed or
/// autodetected), a TCP MAVLink endpoint or the simulator.
#[derive(Debug, Clone)]
pub struct ConfigConnector {
    vehicle: VehicleConfig,
    sim: SimConfig,
}

impl ConfigConnector {
    pub fn new(vehicle: VehicleConfig, sim: SimConfig) -> Self {
        Self { vehicle, sim }
    }
}

#[async_trait]
impl Connector for ConfigConnector {
    async fn connect(&self) -> Result<VehicleLink> {
        let (vehicle, sim) = (self.vehicle.clone(), self.sim.clone());
        // port probing and the MAVLink handshake block
        tokio::task::spawn_blocking(move || open_vehicle(&vehicle, &sim))
            .await
            .context("vehicle open task failed")?
    }
}
