mod connection;
mod simulated;

pub use connection::ConnectionString;
pub use simulated::SimulatedVehicle;

use crate::domain::GeoPoint;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

const SIMULATION_TICK: Duration = Duration::from_millis(100);

/// Opens the vehicle link. There is no MAVLink transport in this crate: every connection is
/// served by the simulated vehicle starting at `home`.
#[instrument(skip(home), fields(connection = %connection))]
pub fn connect(connection: &ConnectionString, home: GeoPoint) -> Arc<SimulatedVehicle> {
    let vehicle = Arc::new(SimulatedVehicle::new(home));
    vehicle.spawn(SIMULATION_TICK);
    info!("🔌 Vehicle link {} is simulated, starting from {}", connection, home);

    vehicle
}
