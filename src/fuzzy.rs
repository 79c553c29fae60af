//! Magnitude-relative equality.
//!
//! Two measurements are "the same" when their difference falls inside an
//! allowance that grows with the size of the values being compared. A fixed
//! absolute band would treat 0.1 °C and 0.1 km/h the same way; scaling by
//! magnitude keeps one setting meaningful across sensors.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default relative allowance (5 % of the larger magnitude)
pub const DEFAULT_RELATIVE_ALLOWANCE: f64 = 0.05;

/// Percent-of-magnitude allowance used by [`fuzzy_equals`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FuzzyAllowance {
    relative: f64,
}

impl FuzzyAllowance {
    /// Create an allowance as a fraction of magnitude (0.05 = 5 %)
    pub fn new(relative: f64) -> Result<Self> {
        if !relative.is_finite() || relative < 0.0 {
            return Err(Error::invalid("allowance", "must be finite and non-negative"));
        }
        Ok(Self { relative })
    }

    /// An allowance that only accepts exact equality
    pub const fn exact() -> Self {
        Self { relative: 0.0 }
    }

    pub const fn relative(self) -> f64 {
        self.relative
    }

    /// Largest difference tolerated for operands of the given magnitude
    pub fn threshold(self, magnitude: f64) -> f64 {
        self.relative * libm::fabs(magnitude)
    }
}

impl Default for FuzzyAllowance {
    fn default() -> Self {
        Self {
            relative: DEFAULT_RELATIVE_ALLOWANCE,
        }
    }
}

/// Scalar fuzzy equality: `|a - b| <= allowance * max(|a|, |b|)`
///
/// Symmetric and reflexive for finite operands; shrinking the allowance can
/// only turn `true` results into `false`.
pub fn fuzzy_equals(a: f64, b: f64, allowance: FuzzyAllowance) -> bool {
    within(libm::fabs(a - b), libm::fabs(a).max(libm::fabs(b)), allowance)
}

/// Compare an already computed difference against the allowance for `magnitude`
pub fn within(difference: f64, magnitude: f64, allowance: FuzzyAllowance) -> bool {
    difference <= allowance.threshold(magnitude)
}
