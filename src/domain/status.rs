use crate::domain::GeoPoint;
use serde::Serialize;
use std::fmt::Display;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    #[default]
    Idle,
    WaitingForLocalFix,
    WaitingForVehicleReady,
    Arming,
    TakingOff,
    Following,
}

impl Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ControllerState::Idle => "idle",
            ControllerState::WaitingForLocalFix => "waiting for local fix",
            ControllerState::WaitingForVehicleReady => "waiting for vehicle",
            ControllerState::Arming => "arming",
            ControllerState::TakingOff => "taking off",
            ControllerState::Following => "following",
        };
        write!(f, "{}", name)
    }
}

/// Point-in-time view of the follow controller, as served on `/position`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub state: ControllerState,
    pub target: Option<GeoPoint>,
    pub raw_target: Option<GeoPoint>,
    pub vehicle: Option<GeoPoint>,
}
