use crate::domain::GeoPoint;
use serde::de::Error;
use serde::{Deserialize, Deserializer};

impl<'de> Deserialize<'de> for GeoPoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Debug, Deserialize)]
        pub struct Inner {
            latitude: f64,
            longitude: f64,
            altitude_m: Option<f64>,
            heading: Option<f64>,
        }

        let inner = Inner::deserialize(deserializer)?;
        let point = GeoPoint::new(inner.latitude, inner.longitude).map_err(|e| Error::custom(format!("invalid location: {}", e)))?;

        let point = match inner.altitude_m {
            Some(altitude) => point.with_altitude(altitude),
            None => point,
        };

        Ok(match inner.heading {
            Some(heading) => point.with_heading(heading),
            None => point,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserializes_a_location() -> Result<(), serde_json::Error> {
        let point: GeoPoint = serde_json::from_str(r#"{ "latitude": 51.8615899, "longitude": 4.3580323, "altitude_m": 12.5 }"#)?;

        assert_eq!(point, GeoPoint::new(51.8615899, 4.3580323).unwrap().with_altitude(12.5));
        Ok(())
    }

    #[test]
    fn altitude_and_heading_are_optional() -> Result<(), serde_json::Error> {
        let point: GeoPoint = serde_json::from_str(r#"{ "latitude": 1.0, "longitude": 2.0 }"#)?;

        assert_eq!(point.alt(), None);
        assert_eq!(point.heading(), None);
        Ok(())
    }

    #[test]
    fn rejects_an_invalid_latitude() {
        let result = serde_json::from_str::<GeoPoint>(r#"{ "latitude": 91.0, "longitude": 2.0 }"#);

        let message = result.unwrap_err().to_string();
        assert!(
            message.starts_with("invalid location: invalid latitude: 91, must be between -90 and 90"),
            "unexpected error: {}",
            message
        );
    }
}
