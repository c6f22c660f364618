use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;

/// Mean earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// An immutable geographic point.
///
/// Only latitude and longitude take part in distance and bearing calculations, so a bare
/// 2D target can be compared against a vehicle position that also carries altitude and
/// heading. See http://www.movable-type.co.uk/scripts/latlong.html for the formulas.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    alt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    heading: Option<f64>,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeoPointError> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(GeoPointError::InvalidLatitude(lat));
        }

        if !(-180.0..=180.0).contains(&lon) {
            return Err(GeoPointError::InvalidLongitude(lon));
        }

        Ok(Self::normalized(lat, lon, None, None))
    }

    /// Builds a point from already computed coordinates, wrapping the longitude into (-180, 180].
    pub(crate) fn normalized(lat: f64, lon: f64, alt: Option<f64>, heading: Option<f64>) -> Self {
        GeoPoint {
            lat,
            lon: normalize_longitude(lon),
            alt,
            heading: heading.map(normalize_degrees),
        }
    }

    pub fn with_altitude(self, alt: f64) -> Self {
        GeoPoint { alt: Some(alt), ..self }
    }

    pub fn with_heading(self, heading: f64) -> Self {
        GeoPoint {
            heading: Some(normalize_degrees(heading)),
            ..self
        }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn alt(&self) -> Option<f64> {
        self.alt
    }

    pub fn heading(&self) -> Option<f64> {
        self.heading
    }

    /// Great-circle distance in meters using the haversine formula.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let (lat1, lon1) = self.to_radians();
        let (lat2, lon2) = other.to_radians();
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;

        // Rounding can push `a` just past 1 for antipodal points.
        let a = ((dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2)).clamp(0.0, 1.0);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }

    /// Initial bearing towards `other` in degrees, normalized into [0, 360).
    pub fn bearing_to(&self, other: &GeoPoint) -> f64 {
        let (lat1, lon1) = self.to_radians();
        let (lat2, lon2) = other.to_radians();
        let dlon = lon2 - lon1;

        let x = dlon.sin() * lat2.cos();
        let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

        normalize_degrees(x.atan2(y).to_degrees())
    }

    /// Projects a new point `distance_m` meters away along `bearing_deg`.
    /// Altitude and heading are carried over unchanged.
    pub fn move_bearing(&self, bearing_deg: f64, distance_m: f64) -> GeoPoint {
        let (lat1, lon1) = self.to_radians();
        let bearing = bearing_deg.to_radians();
        let angular = distance_m / EARTH_RADIUS_M;

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1 + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

        GeoPoint::normalized(lat2.to_degrees(), lon2.to_degrees(), self.alt, self.heading)
    }

    fn to_radians(&self) -> (f64, f64) {
        (self.lat.to_radians(), self.lon.to_radians())
    }
}

impl Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.7}, {:.7}", self.lat, self.lon)?;
        if let Some(alt) = self.alt {
            write!(f, ", {:.1}m", alt)?;
        }
        if let Some(heading) = self.heading {
            write!(f, ", {:.1}°", heading)?;
        }
        write!(f, ")")
    }
}

/// Wraps an angle in degrees into [0, 360).
pub fn normalize_degrees(degrees: f64) -> f64 {
    let normalized = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if normalized >= 360.0 { 0.0 } else { normalized }
}

/// Wraps a longitude into (-180, 180].
pub fn normalize_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 { wrapped + 360.0 } else { wrapped }
}

#[derive(Error, Debug, PartialEq)]
pub enum GeoPointError {
    #[error("invalid latitude: {0}, must be between -90 and 90")]
    InvalidLatitude(f64),
    #[error("invalid longitude: {0}, must be between -180 and 180")]
    InvalidLongitude(f64),
}
