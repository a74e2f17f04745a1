pub mod connector;
pub mod coordinator;
pub mod manual;
pub mod state;
pub mod telemetry;

pub use connector::{ConfigConnector, Connector};
pub use coordinator::FlightSessionCoordinator;
pub use manual::ManualCommand;
pub use state::{ArmState, SessionStatus};
pub use telemetry::{collect_snapshot, TelemetryChannelFault};
