use serde::Serialize;
use std::fmt::Display;

/// Yaw corrections smaller than this are not worth a command.
pub const YAW_TOLERANCE_DEG: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMotion {
    Stationary,
    Moving,
}

impl TargetMotion {
    pub fn classify(movement: f64, min_movement_delta: f64) -> Self {
        if movement < min_movement_delta {
            TargetMotion::Stationary
        } else {
            TargetMotion::Moving
        }
    }

    /// Dead band as a fraction of the follow distance. A parked target gets a wider band so
    /// receiver jitter does not make the vehicle hunt around it.
    pub fn dead_band_fraction(self) -> f64 {
        match self {
            TargetMotion::Stationary => 0.10,
            TargetMotion::Moving => 0.05,
        }
    }

    pub fn dead_band(self, follow_distance: f64) -> f64 {
        self.dead_band_fraction() * follow_distance
    }
}

impl Display for TargetMotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetMotion::Stationary => write!(f, "stationary"),
            TargetMotion::Moving => write!(f, "moving"),
        }
    }
}

pub fn should_move(offset: f64, follow_distance: f64, motion: TargetMotion) -> bool {
    offset.abs() > motion.dead_band(follow_distance)
}

/// Signed difference between bearing and heading in (-180, 180].
pub fn yaw_offset(bearing: f64, heading: f64) -> f64 {
    let offset = (bearing - heading).rem_euclid(360.0);
    if offset > 180.0 { offset - 360.0 } else { offset }
}

pub fn should_yaw(bearing: f64, heading: f64) -> bool {
    yaw_offset(bearing, heading).abs() > YAW_TOLERANCE_DEG
}
