//! Error types shared by every recognizer, value type and store.

use thiserror_no_std::Error;

use crate::reading::SensorId;
use crate::transition::TransitionId;

/// Errors raised by the pattern recognition core
///
/// Invalid input is rejected at construction or setter time and is never
/// coerced. Not-found conditions are expressed as `Option` or an empty
/// prediction list, never as an error.
#[derive(Debug, Error)]
pub enum Error {
    /// A value failed boundary validation
    #[error("Invalid {field}: {reason}")]
    InvalidInput {
        /// Name of the rejected field
        field: &'static str,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Two readings (or a reading and a binding) disagree on sensor identity
    #[error("Sensor mismatch (expected {expected}, got {actual})")]
    SensorMismatch {
        /// Identity the operation is bound to
        expected: SensorId,
        /// Identity that was supplied
        actual: SensorId,
    },

    /// A transition tried to pay more than it holds
    #[error("Insufficient funds (requested {requested}, available {available})")]
    InsufficientFunds {
        /// Amount that was requested
        requested: f64,
        /// Cash on hand at the time of the request
        available: f64,
    },

    /// A transition from a reading to itself was requested
    #[error("Transition endpoints are the same reading")]
    SelfTransition,

    /// The store has no transition with this id
    #[error("Unknown transition: {0}")]
    UnknownTransition(TransitionId),

    /// A persisted record could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(postcard::Error),

    /// Any other knowledge store failure
    #[error("Knowledge store error: {0}")]
    Store(&'static str),
}

impl Error {
    pub(crate) const fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidInput { field, reason }
    }
}

impl From<postcard::Error> for Error {
    fn from(value: postcard::Error) -> Self {
        Self::Codec(value)
    }
}

/// Result type for pattern recognition operations
pub type Result<T> = core::result::Result<T, Error>;
