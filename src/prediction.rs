//! Read-side projection of learned transitions.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::reading::Reading;
use crate::transition::TransitionId;

/// Which recognizer produced a prediction, and therefore which probability
/// policy was applied to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionOrigin {
    /// Uniform `1/N` over the candidates for the queried reading
    Transition,
    /// Weighted dwell, streak, recency and accuracy score
    Cycle,
}

/// A reading the system expects to see next, backed by one transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    transition: TransitionId,
    sensor_event: Reading,
    probability: f64,
    origin: PredictionOrigin,
    pub attempts: u64,
    pub successes: u64,
    pub consecutive_successes: u32,
    pub last_success_nanos: Option<i64>,
}

impl Prediction {
    pub fn new(
        transition: TransitionId,
        sensor_event: Reading,
        probability: f64,
        origin: PredictionOrigin,
    ) -> Result<Self> {
        check_probability(probability)?;
        Ok(Self {
            transition,
            sensor_event,
            probability,
            origin,
            attempts: 0,
            successes: 0,
            consecutive_successes: 0,
            last_success_nanos: None,
        })
    }

    pub fn transition(&self) -> TransitionId {
        self.transition
    }

    pub fn sensor_event(&self) -> &Reading {
        &self.sensor_event
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn origin(&self) -> PredictionOrigin {
        self.origin
    }

    /// Replace the probability and record which policy produced it
    pub fn rescore(&mut self, probability: f64, origin: PredictionOrigin) -> Result<()> {
        check_probability(probability)?;
        self.probability = probability;
        self.origin = origin;
        Ok(())
    }

    /// `successes / attempts`, 0 when nothing was attempted yet
    pub fn accuracy(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

pub(crate) fn check_probability(probability: f64) -> Result<()> {
    if (0.0..=1.0).contains(&probability) {
        Ok(())
    } else {
        Err(Error::invalid("probability", "must be in [0, 1]"))
    }
}

/// Transition-sourced probability for one of `candidates` predictions
pub fn uniform_probability(candidates: usize) -> f64 {
    if candidates == 0 {
        0.0
    } else {
        1.0 / candidates as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::SensorId;

    fn event() -> Reading {
        Reading::new(SensorId::new(1, 1).unwrap(), &[1.0], 0, 1).unwrap()
    }

    #[test]
    fn test_probability_bounds() {
        assert!(Prediction::new(TransitionId(0), event(), 1.2, PredictionOrigin::Transition).is_err());
        assert!(Prediction::new(TransitionId(0), event(), -0.1, PredictionOrigin::Cycle).is_err());

        let mut p = Prediction::new(TransitionId(0), event(), 0.5, PredictionOrigin::Transition).unwrap();
        assert!(p.rescore(f64::NAN, PredictionOrigin::Cycle).is_err());
        assert_eq!(p.probability(), 0.5);
        assert_eq!(p.origin(), PredictionOrigin::Transition);
    }

    #[test]
    fn test_uniform_probability() {
        assert_eq!(uniform_probability(0), 0.0);
        assert_eq!(uniform_probability(4), 0.25);
    }
}
