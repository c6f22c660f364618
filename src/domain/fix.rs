use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Display;

/// Quality of a satellite fix, as reported by the receiver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixMode {
    #[default]
    NoFix,
    Fix2d,
    Fix3d,
}

impl FixMode {
    /// Maps the gpsd `mode` field: 0 = unknown, 1 = no fix, 2 = 2D, 3 = 3D.
    pub fn from_gpsd(mode: u8) -> Self {
        match mode {
            2 => FixMode::Fix2d,
            3 => FixMode::Fix3d,
            _ => FixMode::NoFix,
        }
    }
}

impl Display for FixMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixMode::NoFix => write!(f, "no fix"),
            FixMode::Fix2d => write!(f, "2D"),
            FixMode::Fix3d => write!(f, "3D"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FixState {
    pub mode: FixMode,
    pub satellites_visible: usize,
    pub satellites_used: usize,
}

/// A single position sample from the receiver.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawFix {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub mode: FixMode,
    pub time: Option<DateTime<Utc>>,
}

impl RawFix {
    pub fn no_fix() -> Self {
        RawFix::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixTransition {
    pub previous: FixMode,
    pub current: FixMode,
}

impl FixTransition {
    pub fn acquired(&self) -> bool {
        self.current == FixMode::Fix3d
    }

    pub fn lost(&self) -> bool {
        self.previous == FixMode::Fix3d && self.current != FixMode::Fix3d
    }
}
