//! Per-sensor comparison behaviour.
//!
//! Every sensor kind answers the same three questions about a pair of
//! readings: has enough time passed, did anything significant change, and how
//! far apart are they. The kinds form a closed set dispatched through
//! [`SensorKind`], so a binding is a plain value that can be copied into
//! each recognizer.

mod accelerometer;
mod heart_rate;
mod location;
mod temperature;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fuzzy::{self, FuzzyAllowance};
use crate::reading::{Reading, SensorId};

pub use accelerometer::AccelerometerSensor;
pub use heart_rate::HeartRateSensor;
pub use location::{EARTH_RADIUS_M, LocationSensor, great_circle_distance_m};
pub use temperature::TemperatureSensor;

pub(crate) const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Gate settings shared by every sensor kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Minimum time between two readings that are both processed
    pub min_delay_nanos: i64,
    /// Smallest difference that counts as a significant change
    pub significance: f64,
}

impl Thresholds {
    pub fn new(min_delay_nanos: i64, significance: f64) -> Result<Self> {
        if min_delay_nanos < 0 {
            return Err(Error::invalid("minimum delay", "must not be negative"));
        }
        if !significance.is_finite() || significance < 0.0 {
            return Err(Error::invalid("significance", "must be finite and non-negative"));
        }
        Ok(Self {
            min_delay_nanos,
            significance,
        })
    }

    /// Thresholds that let every reading through
    pub const fn permissive() -> Self {
        Self {
            min_delay_nanos: 0,
            significance: 0.0,
        }
    }
}

/// Capability interface every sensor kind implements.
pub trait SensorBehavior {
    fn thresholds(&self) -> Thresholds;

    /// Sensor-specific distance between two readings (never negative)
    fn difference_between_readings(&self, previous: &Reading, current: &Reading) -> f64;

    /// Size of a reading, used to scale fuzzy equality
    fn magnitude(&self, reading: &Reading) -> f64 {
        reading.norm()
    }

    fn minimum_delay_satisfied(&self, previous: &Reading, current: &Reading) -> bool {
        let elapsed = current
            .timestamp_nanos()
            .saturating_sub(previous.timestamp_nanos());
        elapsed >= self.thresholds().min_delay_nanos
    }

    fn significant_change_occurred(&self, previous: &Reading, current: &Reading) -> bool {
        self.difference_between_readings(previous, current) >= self.thresholds().significance
    }

    /// Distance compared against the fuzzy allowance. Must be in the same
    /// unit as [`SensorBehavior::magnitude`] and independent of when the
    /// readings were taken.
    fn equality_distance(&self, a: &Reading, b: &Reading) -> f64 {
        self.difference_between_readings(a, b)
    }

    /// Reading-level fuzzy equality using this sensor's equality distance
    fn readings_equal(&self, a: &Reading, b: &Reading, allowance: FuzzyAllowance) -> bool {
        if a.values().len() != b.values().len() {
            return false;
        }
        let magnitude = self.magnitude(a).max(self.magnitude(b));
        fuzzy::within(self.equality_distance(a, b), magnitude, allowance)
    }
}

/// Euclidean distance between two value vectors of the same length
pub(crate) fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    libm::sqrt(a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum())
}

/// Fallback for sensors without dedicated behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenericSensor {
    pub thresholds: Thresholds,
}

impl SensorBehavior for GenericSensor {
    fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    fn difference_between_readings(&self, previous: &Reading, current: &Reading) -> f64 {
        euclidean(previous.values(), current.values())
    }
}

/// Closed set of supported sensor kinds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SensorKind {
    Location(LocationSensor),
    HeartRate(HeartRateSensor),
    Accelerometer(AccelerometerSensor),
    Temperature(TemperatureSensor),
    Generic(GenericSensor),
}

impl SensorKind {
    fn behavior(&self) -> &dyn SensorBehavior {
        match self {
            Self::Location(s) => s,
            Self::HeartRate(s) => s,
            Self::Accelerometer(s) => s,
            Self::Temperature(s) => s,
            Self::Generic(s) => s,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Location(_) => "location",
            Self::HeartRate(_) => "heart-rate",
            Self::Accelerometer(_) => "accelerometer",
            Self::Temperature(_) => "temperature",
            Self::Generic(_) => "generic",
        }
    }
}

impl SensorBehavior for SensorKind {
    fn thresholds(&self) -> Thresholds {
        self.behavior().thresholds()
    }

    fn difference_between_readings(&self, previous: &Reading, current: &Reading) -> f64 {
        self.behavior().difference_between_readings(previous, current)
    }

    fn equality_distance(&self, a: &Reading, b: &Reading) -> f64 {
        self.behavior().equality_distance(a, b)
    }

    fn magnitude(&self, reading: &Reading) -> f64 {
        self.behavior().magnitude(reading)
    }
}

/// A sensor identity together with the behaviour used to compare its readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorBinding {
    pub id: SensorId,
    pub kind: SensorKind,
}

impl SensorBinding {
    pub const fn new(id: SensorId, kind: SensorKind) -> Self {
        Self { id, kind }
    }

    /// Fail fast if `reading` was produced by another sensor
    pub fn ensure_owns(&self, reading: &Reading) -> Result<()> {
        self.id.ensure_matches(reading.sensor())
    }

    /// True when `current` should be processed after `previous`
    pub fn passes_gate(&self, previous: &Reading, current: &Reading) -> bool {
        self.kind.minimum_delay_satisfied(previous, current)
            && self.kind.significant_change_occurred(previous, current)
    }
}
