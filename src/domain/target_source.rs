use crate::domain::GeoPoint;
use std::fmt::Debug;

/// Where the follow target position comes from.
pub trait TargetSource: Debug + Send + Sync {
    fn has_fix(&self) -> bool;

    /// The smoothed target estimate, `None` until a position was received.
    fn current_position(&self) -> Option<GeoPoint>;

    /// The most recent unsmoothed fix, for diagnostics.
    fn last_good_raw_fix(&self) -> Option<GeoPoint> {
        None
    }
}
