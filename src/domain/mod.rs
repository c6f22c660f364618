mod fix;
mod geo_point;
mod status;
mod target_source;
mod vehicle;

pub use fix::{FixMode, FixState, FixTransition, RawFix};
pub use geo_point::{GeoPoint, normalize_degrees, normalize_longitude};
pub use status::{ControllerState, StatusSnapshot};
pub use target_source::TargetSource;
pub use vehicle::{FlightMode, Vehicle, VehicleError};
