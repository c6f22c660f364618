use crate::domain::GeoPoint;
use async_trait::async_trait;
use std::fmt::{Debug, Display};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlightMode {
    Stabilize,
    Guided,
}

impl Display for FlightMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlightMode::Stabilize => write!(f, "STABILIZE"),
            FlightMode::Guided => write!(f, "GUIDED"),
        }
    }
}

/// Command and telemetry link to the vehicle being flown.
#[async_trait]
pub trait Vehicle: Debug + Send + Sync {
    async fn is_armable(&self) -> Result<bool, VehicleError>;

    async fn is_armed(&self) -> Result<bool, VehicleError>;

    /// Requests arming; with `wait` the call returns once the vehicle reports it is armed.
    async fn arm(&self, wait: bool) -> Result<(), VehicleError>;

    async fn mode(&self) -> Result<FlightMode, VehicleError>;

    async fn set_mode(&self, mode: FlightMode) -> Result<(), VehicleError>;

    /// Position with the altitude relative to home.
    async fn current_location(&self) -> Result<GeoPoint, VehicleError>;

    async fn current_heading(&self) -> Result<f64, VehicleError>;

    async fn goto_location(&self, target: GeoPoint) -> Result<(), VehicleError>;

    async fn send_yaw_command(&self, heading: f64, relative: bool) -> Result<(), VehicleError>;

    async fn takeoff_to(&self, altitude: f64) -> Result<(), VehicleError>;
}

#[derive(Error, Debug)]
pub enum VehicleError {
    #[error("vehicle rejected the command: {0}")]
    Rejected(String),
}
