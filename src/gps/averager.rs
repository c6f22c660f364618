use crate::domain::{GeoPoint, normalize_longitude};
use std::collections::VecDeque;

pub const DEFAULT_WINDOW: usize = 5;

/// Sliding window mean over the most recent position samples.
#[derive(Debug, Clone)]
pub struct PositionAverager {
    capacity: usize,
    samples: VecDeque<(f64, f64, f64)>,
}

impl PositionAverager {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        PositionAverager {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, lat: f64, lon: f64, alt: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((lat, lon, alt));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Componentwise mean of the retained samples, `None` until something was appended.
    pub fn value(&self) -> Option<GeoPoint> {
        let &(_, reference_lon, _) = self.samples.front()?;
        let n = self.samples.len() as f64;

        let (lat_sum, lon_offset_sum, alt_sum) = self.samples.iter().fold((0.0, 0.0, 0.0), |(lat_sum, lon_sum, alt_sum), &(lat, lon, alt)| {
            // Longitudes are averaged as offsets from the oldest sample so a window
            // straddling the antimeridian does not average out to 0.
            (lat_sum + lat, lon_sum + normalize_longitude(lon - reference_lon), alt_sum + alt)
        });

        Some(GeoPoint::normalized(lat_sum / n, reference_lon + lon_offset_sum / n, Some(alt_sum / n), None))
    }
}

impl Default for PositionAverager {
    fn default() -> Self {
        PositionAverager::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
    }

    #[test]
    fn value_is_none_without_samples() {
        let averager = PositionAverager::default();

        assert_eq!(averager.value(), None);
    }

    #[test]
    fn value_of_a_single_sample_is_the_sample() {
        let mut averager = PositionAverager::new(5);
        averager.append(38.8977, -77.0365, 20.0);

        let value = averager.value().unwrap();
        assert_close(value.lat(), 38.8977);
        assert_close(value.lon(), -77.0365);
        assert_eq!(value.alt(), Some(20.0));
    }

    #[test]
    fn value_is_the_componentwise_mean() {
        let mut averager = PositionAverager::new(5);
        averager.append(10.0, 20.0, 100.0);
        averager.append(12.0, 22.0, 110.0);
        averager.append(14.0, 24.0, 120.0);

        let value = averager.value().unwrap();
        assert_close(value.lat(), 12.0);
        assert_close(value.lon(), 22.0);
        assert_close(value.alt().unwrap(), 110.0);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(5)]
    fn value_only_reflects_the_most_recent_samples(#[case] capacity: usize) {
        let mut averager = PositionAverager::new(capacity);
        for i in 0..(capacity + 4) {
            averager.append(i as f64, i as f64, i as f64);
        }

        let newest = (capacity + 3) as f64;
        let expected = newest - (capacity as f64 - 1.0) / 2.0;
        let value = averager.value().unwrap();

        assert_eq!(averager.len(), capacity);
        assert_close(value.lat(), expected);
        assert_close(value.alt().unwrap(), expected);
    }

    #[test]
    fn zero_capacity_keeps_the_latest_sample() {
        let mut averager = PositionAverager::new(0);
        averager.append(1.0, 1.0, 1.0);
        averager.append(2.0, 2.0, 2.0);

        assert_eq!(averager.len(), 1);
        assert_close(averager.value().unwrap().lat(), 2.0);
    }

    #[test]
    fn window_across_the_antimeridian_stays_near_it() {
        let mut averager = PositionAverager::new(2);
        averager.append(0.0, 179.9, 0.0);
        averager.append(0.0, -179.9, 0.0);

        assert_close(averager.value().unwrap().lon().abs(), 180.0);
    }
}
