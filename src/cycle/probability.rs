//! Probability assigned to predictions made by a cycle recognizer.
//!
//! The score is a weighted mean of four factors, each mapped into [0, 1]:
//!
//! - **dwell**: `d / (d + D)`: how long the predicted value tends to last
//! - **streak**: `s / (s + S)`: consecutive confirmed predictions
//! - **recency**: `H / (H + age)`: time since the last confirmation, 0 if never
//! - **accuracy**: `successes / attempts`
//!
//! `D`, `S` and `H` are the half-saturation points from [`CycleConfig`]. With
//! all weights at zero the score is 0.

use crate::config::{CycleConfig, ProbabilityWeights};
use crate::prediction::Prediction;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleProbabilityModel {
    weights: ProbabilityWeights,
    dwell_saturation_nanos: i64,
    streak_saturation: u32,
    recency_half_life_nanos: i64,
}

impl From<&CycleConfig> for CycleProbabilityModel {
    fn from(config: &CycleConfig) -> Self {
        Self {
            weights: config.weights,
            dwell_saturation_nanos: config.dwell_saturation_nanos,
            streak_saturation: config.streak_saturation,
            recency_half_life_nanos: config.recency_half_life_nanos,
        }
    }
}

fn saturating_ratio(value: f64, half: f64) -> f64 {
    if value <= 0.0 || half <= 0.0 {
        return 0.0;
    }
    value / (value + half)
}

impl CycleProbabilityModel {
    pub fn dwell_score(&self, dwell_nanos: i64) -> f64 {
        saturating_ratio(dwell_nanos as f64, self.dwell_saturation_nanos as f64)
    }

    pub fn streak_score(&self, streak: u32) -> f64 {
        saturating_ratio(f64::from(streak), f64::from(self.streak_saturation))
    }

    pub fn recency_score(&self, last_success_nanos: Option<i64>, now_nanos: i64) -> f64 {
        let Some(last) = last_success_nanos else {
            return 0.0;
        };
        let age = now_nanos.saturating_sub(last).max(0) as f64;
        let half_life = self.recency_half_life_nanos as f64;
        half_life / (half_life + age)
    }

    /// Score `prediction`, whose predicted value dwells for `dwell_nanos`,
    /// as seen at `now_nanos`
    pub fn score(&self, dwell_nanos: i64, prediction: &Prediction, now_nanos: i64) -> f64 {
        let w = self.weights;
        let total = w.total();
        if total <= 0.0 {
            return 0.0;
        }

        let weighted = w.dwell * self.dwell_score(dwell_nanos)
            + w.streak * self.streak_score(prediction.consecutive_successes)
            + w.recency * self.recency_score(prediction.last_success_nanos, now_nanos)
            + w.accuracy * prediction.accuracy();

        (weighted / total).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::PredictionOrigin;
    use crate::reading::{Reading, SensorId};
    use crate::transition::TransitionId;

    fn prediction() -> Prediction {
        let event = Reading::new(SensorId::new(1, 1).unwrap(), &[1.0], 0, 1).unwrap();
        Prediction::new(TransitionId(0), event, 0.0, PredictionOrigin::Cycle).unwrap()
    }

    fn config() -> CycleConfig {
        CycleConfig {
            dwell_saturation_nanos: 100,
            streak_saturation: 2,
            recency_half_life_nanos: 1_000,
            ..CycleConfig::default()
        }
    }

    #[test]
    fn test_fresh_prediction_scores_only_dwell() {
        let model = CycleProbabilityModel::from(&config());
        // dwell 100 of saturation 100 -> 0.5, weighted 0.25 of 1.0
        assert_eq!(model.score(100, &prediction(), 0), 0.125);
    }

    #[test]
    fn test_proven_prediction_scores_higher() {
        let model = CycleProbabilityModel::from(&config());
        let mut proven = prediction();
        proven.attempts = 4;
        proven.successes = 4;
        proven.consecutive_successes = 2;
        proven.last_success_nanos = Some(5_000);

        let fresh = model.score(100, &prediction(), 5_000);
        let scored = model.score(100, &proven, 5_000);
        // 0.25 * (0.5 + 0.5 + 1.0 + 1.0)
        assert_eq!(scored, 0.75);
        assert!(scored > fresh);
    }

    #[test]
    fn test_recency_decays() {
        let model = CycleProbabilityModel::from(&config());
        assert_eq!(model.recency_score(None, 10), 0.0);
        assert_eq!(model.recency_score(Some(0), 0), 1.0);
        assert_eq!(model.recency_score(Some(0), 1_000), 0.5);
        assert!(model.recency_score(Some(0), 9_000) < 0.5);
    }

    #[test]
    fn test_zero_weights_score_zero() {
        let mut config = config();
        config.weights = ProbabilityWeights {
            dwell: 0.0,
            streak: 0.0,
            recency: 0.0,
            accuracy: 0.0,
        };
        let model = CycleProbabilityModel::from(&config);
        assert_eq!(model.score(1_000, &prediction(), 0), 0.0);
    }

    #[test]
    fn test_score_stays_in_unit_interval() {
        let model = CycleProbabilityModel::from(&config());
        let mut p = prediction();
        p.attempts = 1;
        p.successes = 1;
        p.consecutive_successes = u32::MAX;
        p.last_success_nanos = Some(i64::MAX);
        let score = model.score(i64::MAX, &p, 0);
        assert!((0.0..=1.0).contains(&score));
    }
}
