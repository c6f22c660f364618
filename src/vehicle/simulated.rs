use crate::domain::{FlightMode, GeoPoint, Vehicle, VehicleError, normalize_degrees};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, trace};

const GROUND_SPEED_MPS: f64 = 5.0;
const CLIMB_RATE_MPS: f64 = 2.5;
const YAW_RATE_DPS: f64 = 45.0;

#[derive(Debug)]
struct State {
    location: GeoPoint,
    altitude: f64,
    heading: f64,
    armed: bool,
    mode: FlightMode,
    destination: Option<GeoPoint>,
    target_altitude: Option<f64>,
    target_heading: Option<f64>,
}

/// Software-in-the-loop vehicle with simple kinematics: constant ground speed towards the
/// last goto, constant climb rate and constant yaw rate. It only moves while armed in
/// GUIDED mode.
#[derive(Debug)]
pub struct SimulatedVehicle {
    state: Mutex<State>,
}

impl SimulatedVehicle {
    pub fn new(home: GeoPoint) -> Self {
        SimulatedVehicle {
            state: Mutex::new(State {
                location: GeoPoint::normalized(home.lat(), home.lon(), None, None),
                altitude: 0.0,
                heading: home.heading().unwrap_or_default(),
                armed: false,
                mode: FlightMode::Stabilize,
                destination: None,
                target_altitude: None,
                target_heading: None,
            }),
        }
    }

    /// Advances the simulation every `tick` until the vehicle is dropped.
    pub fn spawn(self: &Arc<Self>, tick: Duration) -> JoinHandle<()> {
        let vehicle: Weak<SimulatedVehicle> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(vehicle) = vehicle.upgrade() else {
                    debug!("Simulated vehicle dropped, stopping simulation");
                    return;
                };
                vehicle.step(tick);
            }
        })
    }

    pub fn step(&self, dt: Duration) {
        let dt = dt.as_secs_f64();
        let mut state = self.lock();
        if !state.armed || state.mode != FlightMode::Guided {
            return;
        }

        if let Some(destination) = state.destination {
            let remaining = state.location.distance_to(&destination);
            let travel = (GROUND_SPEED_MPS * dt).min(remaining);
            if remaining <= travel {
                state.location = destination;
                state.destination = None;
            } else {
                let bearing = state.location.bearing_to(&destination);
                state.location = state.location.move_bearing(bearing, travel);
            }
        }

        if let Some(target) = state.target_altitude {
            let difference = target - state.altitude;
            let climb = (CLIMB_RATE_MPS * dt).min(difference.abs());
            state.altitude += climb.copysign(difference);
            if (target - state.altitude).abs() < f64::EPSILON {
                state.target_altitude = None;
            }
        }

        if let Some(target) = state.target_heading {
            let difference = (target - state.heading + 540.0).rem_euclid(360.0) - 180.0;
            let turn = (YAW_RATE_DPS * dt).min(difference.abs());
            state.heading = normalize_degrees(state.heading + turn.copysign(difference));
            if turn >= difference.abs() {
                state.heading = target;
                state.target_heading = None;
            }
        }

        trace!(location = %state.location, altitude = state.altitude, heading = state.heading, "Simulation step");
    }

    fn guided_and_armed(state: &State) -> Result<(), VehicleError> {
        if !state.armed {
            return Err(VehicleError::Rejected("vehicle is not armed".to_string()));
        }
        if state.mode != FlightMode::Guided {
            return Err(VehicleError::Rejected(format!("vehicle is in {} mode, not GUIDED", state.mode)));
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Vehicle for SimulatedVehicle {
    async fn is_armable(&self) -> Result<bool, VehicleError> {
        Ok(true)
    }

    async fn is_armed(&self) -> Result<bool, VehicleError> {
        Ok(self.lock().armed)
    }

    async fn arm(&self, _wait: bool) -> Result<(), VehicleError> {
        self.lock().armed = true;
        info!("🚁 Simulated vehicle armed");
        Ok(())
    }

    async fn mode(&self) -> Result<FlightMode, VehicleError> {
        Ok(self.lock().mode)
    }

    async fn set_mode(&self, mode: FlightMode) -> Result<(), VehicleError> {
        self.lock().mode = mode;
        Ok(())
    }

    async fn current_location(&self) -> Result<GeoPoint, VehicleError> {
        let state = self.lock();
        Ok(state.location.with_altitude(state.altitude))
    }

    async fn current_heading(&self) -> Result<f64, VehicleError> {
        Ok(self.lock().heading)
    }

    async fn goto_location(&self, target: GeoPoint) -> Result<(), VehicleError> {
        let mut state = self.lock();
        Self::guided_and_armed(&state)?;
        state.destination = Some(GeoPoint::normalized(target.lat(), target.lon(), None, None));
        state.target_altitude = target.alt();
        Ok(())
    }

    async fn send_yaw_command(&self, heading: f64, relative: bool) -> Result<(), VehicleError> {
        let mut state = self.lock();
        Self::guided_and_armed(&state)?;
        let target = if relative { state.heading + heading } else { heading };
        state.target_heading = Some(normalize_degrees(target));
        Ok(())
    }

    async fn takeoff_to(&self, altitude: f64) -> Result<(), VehicleError> {
        let mut state = self.lock();
        Self::guided_and_armed(&state)?;
        if state.altitude > 0.0 {
            return Err(VehicleError::Rejected("vehicle is already airborne".to_string()));
        }
        state.target_altitude = Some(altitude);
        Ok(())
    }
}
