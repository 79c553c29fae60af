use serde::{Deserialize, Serialize};

use super::{NANOS_PER_SEC, SensorBehavior, Thresholds, euclidean};
use crate::reading::Reading;

/// Three-axis accelerometer, values `[x, y, z]` in m/s².
///
/// The gate difference between two readings is the change in acceleration
/// per second of elapsed time, so slow drift counts less than a sudden jolt.
/// Equality ignores time and compares the raw change in acceleration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerometerSensor {
    pub thresholds: Thresholds,
}

impl SensorBehavior for AccelerometerSensor {
    fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    fn difference_between_readings(&self, previous: &Reading, current: &Reading) -> f64 {
        let delta = euclidean(previous.values(), current.values());
        let elapsed_nanos = current
            .timestamp_nanos()
            .abs_diff(previous.timestamp_nanos());
        let elapsed_secs = elapsed_nanos as f64 / NANOS_PER_SEC;

        // Under a second apart, report the raw delta
        if elapsed_secs < 1.0 {
            delta
        } else {
            delta / elapsed_secs
        }
    }

    fn equality_distance(&self, a: &Reading, b: &Reading) -> f64 {
        euclidean(a.values(), b.values())
    }
}
