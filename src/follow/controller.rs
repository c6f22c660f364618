use crate::app_config::FollowerConfig;
use crate::domain::{ControllerState, FlightMode, GeoPoint, StatusSnapshot, TargetSource, Vehicle, VehicleError};
use crate::follow::policy::{TargetMotion, should_move, should_yaw};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info, instrument, warn};

/// Above this relative altitude an armed vehicle is considered airborne.
const AIRBORNE_ALTITUDE_M: f64 = 1.0;

/// Takeoff is complete at this fraction of the follow altitude.
const TAKEOFF_ALTITUDE_RATIO: f64 = 0.95;

/// The outcome of a single control loop iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    pub target: GeoPoint,
    pub vehicle: GeoPoint,
    pub distance_to_target: f64,
    pub target_movement: f64,
    pub bearing_to_target: f64,
    pub offset: f64,
    pub motion: TargetMotion,
    /// Where the vehicle was sent, `None` when holding inside the dead band.
    pub movement: Option<GeoPoint>,
    /// Absolute heading commanded, `None` when already facing the target.
    pub yaw: Option<f64>,
}

#[derive(Error, Debug)]
pub enum TickError {
    #[error("no target position available")]
    NoTarget,
    #[error("unable to read the vehicle position: {0}")]
    Vehicle(#[from] VehicleError),
}

/// Flies the vehicle after the target.
#[derive(Debug)]
pub struct FollowController {
    vehicle: Arc<dyn Vehicle>,
    target: Arc<dyn TargetSource>,
    config: FollowerConfig,
    status_tx: watch::Sender<StatusSnapshot>,
    cancel_tx: watch::Sender<bool>,
}

impl FollowController {
    pub fn new(vehicle: Arc<dyn Vehicle>, target: Arc<dyn TargetSource>, config: FollowerConfig) -> Self {
        let (status_tx, _) = watch::channel(StatusSnapshot::default());
        let (cancel_tx, _) = watch::channel(false);

        FollowController {
            vehicle,
            target,
            config,
            status_tx,
            cancel_tx,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.status_tx.borrow().state
    }

    /// Latest positions and state, refreshed on every poll and tick.
    pub fn status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    /// Stops `start_following` before its next tick.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub async fn prepare(&self) {
        self.wait_for_local_fix().await;
        self.wait_for_vehicle_ready().await;
    }

    /// Blocks until the target receiver reports a usable fix. Never times out.
    #[instrument(skip_all)]
    pub async fn wait_for_local_fix(&self) {
        self.set_state(ControllerState::WaitingForLocalFix);
        info!("📡 Waiting for local GPS fix...");
        while !self.target.has_fix() {
            self.refresh_status().await;
            sleep(self.config.poll_interval()).await;
        }
        info!("📡 Waiting for local GPS fix... OK");
    }

    #[instrument(skip_all)]
    pub async fn wait_for_vehicle_ready(&self) {
        self.set_state(ControllerState::WaitingForVehicleReady);
        info!("🚁 Waiting for vehicle to initialize...");
        loop {
            match self.vehicle.is_armable().await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => warn!("⚠️ Unable to query vehicle readiness: {}", e),
            }
            self.refresh_status().await;
            sleep(self.config.poll_interval()).await;
        }
        info!("🚁 Waiting for vehicle to initialize... OK");
    }

    /// Brings the vehicle to the follow altitude, arming and taking off first when it is still
    /// on the ground.
    #[instrument(skip_all, fields(altitude = self.config.follow_altitude()))]
    pub async fn takeoff(&self) -> Result<(), VehicleError> {
        let altitude = self.config.follow_altitude();
        let location = self.vehicle.current_location().await?;
        let airborne = self.vehicle.is_armed().await? && location.alt().unwrap_or_default() > AIRBORNE_ALTITUDE_M;

        if airborne {
            self.set_state(ControllerState::TakingOff);
            info!("🛫 Vehicle is airborne, moving to follow altitude {}m", altitude);
            self.vehicle.goto_location(location.with_altitude(altitude)).await?;
            self.wait_until(|| async move {
                let current = self.vehicle.current_location().await?.alt().unwrap_or_default();
                Ok((current - altitude).abs() <= (1.0 - TAKEOFF_ALTITUDE_RATIO) * altitude)
            })
            .await?;
        } else {
            self.set_state(ControllerState::Arming);
            info!("🔀 Switching to {} mode...", FlightMode::Guided);
            self.vehicle.set_mode(FlightMode::Guided).await?;
            self.wait_until(|| async move { Ok(self.vehicle.mode().await? == FlightMode::Guided) }).await?;
            info!("🔀 Switching to {} mode... OK", FlightMode::Guided);

            info!("🔐 Arming vehicle...");
            self.vehicle.arm(true).await?;
            self.wait_until(|| async move { self.vehicle.is_armed().await }).await?;
            info!("🔐 Arming vehicle... OK");

            self.set_state(ControllerState::TakingOff);
            info!("🛫 Taking off to {}m...", altitude);
            self.vehicle.takeoff_to(altitude).await?;
            self.wait_until(|| async move {
                let current = self.vehicle.current_location().await?.alt().unwrap_or_default();
                debug!(altitude = current, "Climbing");
                Ok(current >= TAKEOFF_ALTITUDE_RATIO * altitude)
            })
            .await?;
        }

        info!("🛫 Reached follow altitude {}m", altitude);
        Ok(())
    }

    /// Runs the control loop every `loop_interval` until cancelled.
    #[instrument(skip_all)]
    pub async fn start_following(&self) {
        let mut cancel_rx = self.cancel_tx.subscribe();
        self.set_state(ControllerState::Following);
        info!("🎯 Following target at {}m distance, {}m altitude", self.config.follow_distance(), self.config.follow_altitude());

        let mut ticker = interval(self.config.loop_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_target = self.target.current_position();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel_rx.changed() => {}
            }
            if *cancel_rx.borrow_and_update() {
                info!("🎯 Following cancelled");
                return;
            }

            match self.follow_tick(last_target).await {
                Ok(report) => last_target = Some(report.target),
                Err(e) => warn!("⚠️ Skipping control tick: {}", e),
            }
        }
    }

    /// One control loop iteration: compares the smoothed target position with the vehicle
    /// position and issues a goto and/or yaw command when outside tolerance.
    #[instrument(skip_all)]
    pub async fn follow_tick(&self, last_target: Option<GeoPoint>) -> Result<TickReport, TickError> {
        let Some(target) = self.target.current_position() else {
            self.refresh_status().await;
            return Err(TickError::NoTarget);
        };
        let vehicle = self.vehicle_position().await?;
        self.publish_status(Some(target), Some(vehicle));

        let distance_to_target = vehicle.distance_to(&target);
        let target_movement = last_target.map(|last| last.distance_to(&target)).unwrap_or_default();
        let bearing_to_target = vehicle.bearing_to(&target);
        let offset = distance_to_target - self.config.follow_distance();
        let motion = TargetMotion::classify(target_movement, self.config.min_movement_delta());

        info!(
            distance = distance_to_target,
            bearing = bearing_to_target,
            moved = target_movement,
            offset,
            %motion,
            "Target at {:.2}m, bearing {:.1}°",
            distance_to_target,
            bearing_to_target
        );

        let movement = if should_move(offset, self.config.follow_distance(), motion) {
            let destination = vehicle.move_bearing(bearing_to_target, offset).with_altitude(self.config.follow_altitude());
            info!("➡️ Moving {:.2}m towards {}", offset, destination);
            if let Err(e) = self.vehicle.goto_location(destination).await {
                warn!("⚠️ Vehicle rejected goto: {}", e);
            }
            Some(destination)
        } else {
            debug!("Holding position, offset {:.2}m within dead band of {:.2}m", offset, motion.dead_band(self.config.follow_distance()));
            None
        };

        let heading = vehicle.heading().unwrap_or_default();
        let yaw = if should_yaw(bearing_to_target, heading) {
            info!("↪️ Turning from {:.1}° to {:.1}°", heading, bearing_to_target);
            if let Err(e) = self.vehicle.send_yaw_command(bearing_to_target, false).await {
                warn!("⚠️ Vehicle rejected yaw command: {}", e);
            }
            Some(bearing_to_target)
        } else {
            None
        };

        Ok(TickReport {
            target,
            vehicle,
            distance_to_target,
            target_movement,
            bearing_to_target,
            offset,
            motion,
            movement,
            yaw,
        })
    }

    async fn vehicle_position(&self) -> Result<GeoPoint, VehicleError> {
        let location = self.vehicle.current_location().await?;
        let heading = self.vehicle.current_heading().await?;
        Ok(location.with_heading(heading))
    }

    async fn wait_until<F, Fut>(&self, mut condition: F) -> Result<(), VehicleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, VehicleError>>,
    {
        while !condition().await? {
            self.refresh_status().await;
            sleep(self.config.poll_interval()).await;
        }
        Ok(())
    }

    async fn refresh_status(&self) {
        let vehicle = self.vehicle_position().await.ok();
        self.publish_status(self.target.current_position(), vehicle);
    }

    fn publish_status(&self, target: Option<GeoPoint>, vehicle: Option<GeoPoint>) {
        let raw_target = self.target.last_good_raw_fix();
        self.status_tx.send_modify(|status| {
            status.target = target;
            status.raw_target = raw_target;
            status.vehicle = vehicle;
        });
    }

    fn set_state(&self, state: ControllerState) {
        let mut previous = state;
        self.status_tx.send_modify(|status| {
            previous = status.state;
            status.state = state;
        });
        if previous != state {
            debug!("Controller state {} -> {}", previous, state);
        }
    }
}
