use crate::domain::{FixMode, RawFix};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A report from the gpsd JSON protocol. Only position (`TPV`) and satellite (`SKY`)
/// reports are of interest, everything else is decoded as `Other`.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "class")]
pub enum Report {
    #[serde(rename = "TPV")]
    Tpv(TpvReport),
    #[serde(rename = "SKY")]
    Sky(SkyReport),
    #[serde(other)]
    Other,
}

impl Report {
    pub fn from_line(line: &str) -> Result<Report, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct TpvReport {
    #[serde(default)]
    pub mode: u8,
    pub time: Option<DateTime<Utc>>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    #[serde(rename = "altMSL")]
    pub alt_msl: Option<f64>,
    #[serde(rename = "altHAE")]
    pub alt_hae: Option<f64>,
}

impl TpvReport {
    /// Newer gpsd releases replaced `alt` with `altMSL`/`altHAE`.
    pub fn altitude(&self) -> Option<f64> {
        self.alt_msl.or(self.alt).or(self.alt_hae)
    }
}

impl From<TpvReport> for RawFix {
    fn from(report: TpvReport) -> Self {
        RawFix {
            lat: report.lat,
            lon: report.lon,
            alt: report.altitude(),
            mode: FixMode::from_gpsd(report.mode),
            time: report.time,
        }
    }
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct SkyReport {
    pub satellites: Option<Vec<Satellite>>,
    #[serde(rename = "nSat")]
    pub n_sat: Option<usize>,
    #[serde(rename = "uSat")]
    pub u_sat: Option<usize>,
}

impl SkyReport {
    /// Returns `(visible, used)`. The satellite list wins over the summary counters; `None`
    /// when the report carries neither.
    pub fn satellite_counts(&self) -> Option<(usize, usize)> {
        match &self.satellites {
            Some(satellites) => Some((satellites.len(), satellites.iter().filter(|s| s.used).count())),
            None => match (self.n_sat, self.u_sat) {
                (Some(visible), Some(used)) => Some((visible, used)),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct Satellite {
    #[serde(rename = "PRN")]
    pub prn: Option<i32>,
    #[serde(default)]
    pub used: bool,
}
