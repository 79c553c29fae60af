use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fuzzy::FuzzyAllowance;

const NANOS_PER_MINUTE: i64 = 60 * 1_000_000_000;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Config {
    pub cycle: CycleConfig,
    pub economy: EconomyConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.cycle.validate()?;
        self.economy.validate()
    }

    pub fn to_bytes(&self) -> Result<alloc::vec::Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Decode and validate a configuration
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let config: Self = postcard::from_bytes(bytes)?;
        config.validate()?;
        Ok(config)
    }
}

/// Settings for cycle recognizers and the cycle-sourced probability model
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CycleConfig {
    /// Allowance used to decide whether two readings share a node
    pub allowance: FuzzyAllowance,
    pub weights: ProbabilityWeights,
    /// Dwell time at which the dwell score reaches 0.5
    pub dwell_saturation_nanos: i64,
    /// Streak length at which the streak score reaches 0.5
    pub streak_saturation: u32,
    /// Age of the last success at which the recency score reaches 0.5
    pub recency_half_life_nanos: i64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            allowance: FuzzyAllowance::default(),
            weights: ProbabilityWeights::default(),
            dwell_saturation_nanos: 15 * NANOS_PER_MINUTE,
            streak_saturation: 3,
            recency_half_life_nanos: 24 * 60 * NANOS_PER_MINUTE,
        }
    }
}

impl CycleConfig {
    pub fn validate(&self) -> Result<()> {
        // round-trip through the checked constructor
        FuzzyAllowance::new(self.allowance.relative())?;
        self.weights.validate()?;
        if self.dwell_saturation_nanos <= 0 {
            return Err(Error::invalid("dwell saturation", "must be positive"));
        }
        if self.streak_saturation == 0 {
            return Err(Error::invalid("streak saturation", "must be positive"));
        }
        if self.recency_half_life_nanos <= 0 {
            return Err(Error::invalid("recency half-life", "must be positive"));
        }
        Ok(())
    }
}

/// Relative weight of each factor in the cycle-sourced probability
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ProbabilityWeights {
    pub dwell: f64,
    pub streak: f64,
    pub recency: f64,
    pub accuracy: f64,
}

impl Default for ProbabilityWeights {
    fn default() -> Self {
        Self {
            dwell: 0.25,
            streak: 0.25,
            recency: 0.25,
            accuracy: 0.25,
        }
    }
}

impl ProbabilityWeights {
    pub fn total(&self) -> f64 {
        self.dwell + self.streak + self.recency + self.accuracy
    }

    pub fn validate(&self) -> Result<()> {
        let all = [self.dwell, self.streak, self.recency, self.accuracy];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::invalid("probability weight", "must be finite and non-negative"));
        }
        Ok(())
    }
}

/// Credit-assignment economy settings
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EconomyConfig {
    /// Cash a newly learned transition starts with
    pub initial_cash: f64,
    /// Share of cash on hand offered in each bid
    pub default_bid_percentage: f64,
    /// Paid to a transition whose prediction is confirmed
    pub success_reward: f64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            initial_cash: 100.0,
            default_bid_percentage: 0.1,
            success_reward: 10.0,
        }
    }
}

impl EconomyConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.initial_cash.is_finite() || self.initial_cash < 0.0 {
            return Err(Error::invalid("initial cash", "must be finite and non-negative"));
        }
        if !(0.0..=1.0).contains(&self.default_bid_percentage) {
            return Err(Error::invalid("bid percentage", "must be in [0, 1]"));
        }
        if !self.success_reward.is_finite() || self.success_reward < 0.0 {
            return Err(Error::invalid("success reward", "must be finite and non-negative"));
        }
        Ok(())
    }
}
