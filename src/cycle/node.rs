use serde::{Deserialize, Serialize};

use super::CycleKey;
use crate::error::{Error, Result};
use crate::prediction::check_probability;
use crate::reading::Reading;

/// One observed value anchored to an offset inside a recurring window.
///
/// The node refers back to its cycle by key only; the cycle itself owns the
/// node list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleNode {
    cycle: CycleKey,
    reading: Reading,
    /// Reading timestamp minus the cycle start at insertion
    start_offset_nanos: i64,
    /// Accumulated dwell time across every merged reading
    duration_nanos: i64,
    probability: f64,
}

impl CycleNode {
    pub fn new(cycle: CycleKey, reading: Reading, start_offset_nanos: i64) -> Result<Self> {
        let duration_nanos = reading.duration_nanos();
        Self::from_parts(cycle, reading, start_offset_nanos, duration_nanos, 0.0)
    }

    /// Rebuild a node from stored parts, validating every field
    pub fn from_parts(
        cycle: CycleKey,
        reading: Reading,
        start_offset_nanos: i64,
        duration_nanos: i64,
        probability: f64,
    ) -> Result<Self> {
        cycle.sensor.ensure_matches(reading.sensor())?;
        if start_offset_nanos < 0 || start_offset_nanos >= cycle.kind.duration_nanos() {
            return Err(Error::invalid("node offset", "must lie inside the cycle"));
        }
        if duration_nanos <= 0 {
            return Err(Error::invalid("node duration", "must be positive"));
        }
        check_probability(probability)?;

        Ok(Self {
            cycle,
            reading,
            start_offset_nanos,
            duration_nanos,
            probability,
        })
    }

    pub fn cycle(&self) -> CycleKey {
        self.cycle
    }

    pub fn reading(&self) -> &Reading {
        &self.reading
    }

    pub fn start_offset_nanos(&self) -> i64 {
        self.start_offset_nanos
    }

    pub fn duration_nanos(&self) -> i64 {
        self.duration_nanos
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn set_probability(&mut self, probability: f64) -> Result<()> {
        check_probability(probability)?;
        self.probability = probability;
        Ok(())
    }

    /// Accumulate the dwell time of a merged reading
    pub fn add_duration(&mut self, nanos: i64) -> Result<()> {
        if nanos <= 0 {
            return Err(Error::invalid("duration", "must be positive"));
        }
        self.duration_nanos = self.duration_nanos.saturating_add(nanos);
        Ok(())
    }
}
