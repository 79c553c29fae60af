use serde::{Deserialize, Serialize};

use super::{SensorBehavior, Thresholds};
use crate::reading::Reading;

/// Mean Earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// GPS position sensor. Values are `[latitude, longitude]` in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSensor {
    /// Significance is expressed in metres
    pub thresholds: Thresholds,
}

/// Haversine distance between two `[lat, lon]` pairs in degrees
pub fn great_circle_distance_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let sin_dlat = libm::sin(dlat / 2.0);
    let sin_dlon = libm::sin(dlon / 2.0);
    let h = sin_dlat * sin_dlat + libm::cos(lat1) * libm::cos(lat2) * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_M * libm::asin(libm::sqrt(h).min(1.0))
}

fn lat_lon(reading: &Reading) -> (f64, f64) {
    let values = reading.values();
    (values[0], values.get(1).copied().unwrap_or(0.0))
}

impl SensorBehavior for LocationSensor {
    fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    fn difference_between_readings(&self, previous: &Reading, current: &Reading) -> f64 {
        great_circle_distance_m(lat_lon(previous), lat_lon(current))
    }

    // A position's magnitude is its distance from the Earth's centre, so the
    // relative allowance becomes a radius on the ground.
    fn magnitude(&self, _reading: &Reading) -> f64 {
        EARTH_RADIUS_M
    }
}
