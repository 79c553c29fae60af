//! Timestamped sensor readings and their identity keys.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum number of values carried by one reading
pub const MAX_READING_VALUES: usize = 8;

/// Fixed-capacity value storage for a reading
pub type ReadingValues = heapless::Vec<f64, MAX_READING_VALUES>;

/// Identity of a sensor binding: sensor type plus where it is mounted.
///
/// Both parts are positive integers; zero is reserved for "unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SensorId {
    sensor_type: u32,
    location: u32,
}

impl SensorId {
    pub fn new(sensor_type: u32, location: u32) -> Result<Self> {
        if sensor_type == 0 {
            return Err(Error::invalid("sensor type", "must be positive"));
        }
        if location == 0 {
            return Err(Error::invalid("sensor location", "must be positive"));
        }
        Ok(Self {
            sensor_type,
            location,
        })
    }

    pub const fn sensor_type(self) -> u32 {
        self.sensor_type
    }

    pub const fn location(self) -> u32 {
        self.location
    }

    /// Fail with [`Error::SensorMismatch`] unless `other` is the same binding
    pub fn ensure_matches(self, other: SensorId) -> Result<()> {
        if self == other {
            Ok(())
        } else {
            Err(Error::SensorMismatch {
                expected: self,
                actual: other,
            })
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.sensor_type, self.location)
    }
}

/// Derived identity of a reading: sensor binding plus a hash of its values.
///
/// Two readings with bit-identical values from the same sensor share a key,
/// whatever their timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReadingKey {
    pub sensor: SensorId,
    pub value_hash: u64,
}

impl fmt::Display for ReadingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:016x}", self.sensor, self.value_hash)
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over the IEEE-754 bit patterns, so keys are stable across runs
fn hash_values(values: &[f64]) -> u64 {
    let mut hash = FNV_OFFSET;
    for value in values {
        // -0.0 and 0.0 compare equal, hash them the same
        let bits = if *value == 0.0 { 0 } else { value.to_bits() };
        for byte in bits.to_le_bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

/// One immutable sensor observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    sensor: SensorId,
    values: ReadingValues,
    /// Nanoseconds since the Unix epoch
    timestamp_nanos: i64,
    /// Estimated time the value stayed valid
    duration_nanos: i64,
    key: ReadingKey,
}

impl Reading {
    /// Validate and build a reading.
    ///
    /// Values must be finite and there must be between one and
    /// [`MAX_READING_VALUES`] of them. The timestamp may not be negative and
    /// the dwell duration must be positive.
    pub fn new(
        sensor: SensorId,
        values: &[f64],
        timestamp_nanos: i64,
        duration_nanos: i64,
    ) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::invalid("values", "a reading needs at least one value"));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::invalid("values", "must be finite"));
        }
        let values = ReadingValues::from_slice(values)
            .map_err(|_| Error::invalid("values", "too many values for one reading"))?;
        if timestamp_nanos < 0 {
            return Err(Error::invalid("timestamp", "must not be negative"));
        }
        if duration_nanos <= 0 {
            return Err(Error::invalid("duration", "must be positive"));
        }

        let key = ReadingKey {
            sensor,
            value_hash: hash_values(&values),
        };

        Ok(Self {
            sensor,
            values,
            timestamp_nanos,
            duration_nanos,
            key,
        })
    }

    pub fn sensor(&self) -> SensorId {
        self.sensor
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn timestamp_nanos(&self) -> i64 {
        self.timestamp_nanos
    }

    pub fn duration_nanos(&self) -> i64 {
        self.duration_nanos
    }

    pub fn key(&self) -> ReadingKey {
        self.key
    }

    /// Euclidean norm of the value vector
    pub fn norm(&self) -> f64 {
        libm::sqrt(self.values.iter().map(|v| v * v).sum())
    }
}
