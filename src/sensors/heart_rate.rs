use serde::{Deserialize, Serialize};

use super::{SensorBehavior, Thresholds};
use crate::reading::Reading;

/// Heart-rate monitor. The first value is beats per minute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSensor {
    pub thresholds: Thresholds,
}

impl SensorBehavior for HeartRateSensor {
    fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    fn difference_between_readings(&self, previous: &Reading, current: &Reading) -> f64 {
        libm::fabs(current.values()[0] - previous.values()[0])
    }

    fn magnitude(&self, reading: &Reading) -> f64 {
        libm::fabs(reading.values()[0])
    }
}
