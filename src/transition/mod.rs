//! Learned directed associations between two readings.
//!
//! A [`Transition`] is both a prediction supplier (it knows which reading
//! tends to follow its first reading) and a bidder in the credit-assignment
//! economy (it holds cash and offers part of it to have its prediction
//! selected).

pub mod recognizer;

use core::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::economy::Bid;
use crate::error::{Error, Result};
use crate::prediction::{Prediction, PredictionOrigin, check_probability};
use crate::reading::{Reading, ReadingKey, SensorId};

pub use recognizer::TransitionRecognizer;

/// Store-assigned identity of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionId(pub u64);

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    id: TransitionId,
    sensor: SensorId,
    first: ReadingKey,
    predicted: Reading,
    timestamp_nanos: i64,
    probability: f64,
    duration_nanos: i64,
    cash_on_hand: f64,
    attempts: u64,
    successes: u64,
    consecutive_successes: u32,
    last_success_nanos: Option<i64>,
}

impl Transition {
    /// Learn `first -> predicted`.
    ///
    /// Both readings must come from the same sensor binding and must not be
    /// the same reading.
    pub fn new(
        id: TransitionId,
        first: &Reading,
        predicted: Reading,
        initial_cash: f64,
    ) -> Result<Self> {
        first.sensor().ensure_matches(predicted.sensor())?;
        if first.key() == predicted.key() {
            return Err(Error::SelfTransition);
        }
        check_amount("initial cash", initial_cash)?;

        Ok(Self {
            id,
            sensor: first.sensor(),
            first: first.key(),
            timestamp_nanos: predicted.timestamp_nanos(),
            duration_nanos: predicted.duration_nanos(),
            predicted,
            probability: 0.0,
            cash_on_hand: initial_cash,
            attempts: 0,
            successes: 0,
            consecutive_successes: 0,
            last_success_nanos: None,
        })
    }

    pub fn id(&self) -> TransitionId {
        self.id
    }

    pub fn sensor(&self) -> SensorId {
        self.sensor
    }

    pub fn first(&self) -> ReadingKey {
        self.first
    }

    pub fn predicted(&self) -> &Reading {
        &self.predicted
    }

    pub fn timestamp_nanos(&self) -> i64 {
        self.timestamp_nanos
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

    pub fn cash_on_hand(&self) -> f64 {
        self.cash_on_hand
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    pub fn last_success_nanos(&self) -> Option<i64> {
        self.last_success_nanos
    }

    /// `successes / attempts`, exactly 0 before the first attempt
    pub fn prediction_accuracy(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Count a confirmed prediction observed at `timestamp_nanos`
    pub fn record_success(&mut self, timestamp_nanos: i64) {
        self.successes += 1;
        // a success without a recorded attempt still counts as one
        self.attempts = self.attempts.max(self.successes);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.last_success_nanos = Some(timestamp_nanos);
    }

    /// A prediction was emitted but something else happened
    pub fn record_failure(&mut self) {
        self.consecutive_successes = 0;
    }

    /// Offer `bid_percentage` of the current cash to have this prediction chosen
    pub fn bid(&self, bid_percentage: f64) -> Result<Bid> {
        if !(0.0..=1.0).contains(&bid_percentage) {
            return Err(Error::invalid("bid percentage", "must be in [0, 1]"));
        }
        Ok(Bid {
            transition: self.id,
            amount: self.cash_on_hand * bid_percentage,
        })
    }

    /// Pay a winning bid and hand over the prediction it backs.
    ///
    /// Paying more than the cash on hand is rejected and leaves the balance
    /// untouched.
    pub fn pay(&mut self, winning_bid: &Bid) -> Result<Prediction> {
        if winning_bid.transition != self.id {
            return Err(Error::invalid("bid", "placed by another transition"));
        }
        check_amount("payment", winning_bid.amount)?;
        if winning_bid.amount > self.cash_on_hand {
            warn!(
                "{} cannot pay {} with {} on hand",
                self.id, winning_bid.amount, self.cash_on_hand
            );
            return Err(Error::InsufficientFunds {
                requested: winning_bid.amount,
                available: self.cash_on_hand,
            });
        }

        self.cash_on_hand -= winning_bid.amount;
        self.to_prediction(self.probability, PredictionOrigin::Transition)
    }

    pub fn receive_payment(&mut self, amount: f64) -> Result<()> {
        check_amount("payment", amount)?;
        self.cash_on_hand += amount;
        Ok(())
    }

    /// Project this transition as a prediction with the given probability
    pub fn to_prediction(&self, probability: f64, origin: PredictionOrigin) -> Result<Prediction> {
        let mut prediction = Prediction::new(self.id, self.predicted.clone(), probability, origin)?;
        prediction.attempts = self.attempts;
        prediction.successes = self.successes;
        prediction.consecutive_successes = self.consecutive_successes;
        prediction.last_success_nanos = self.last_success_nanos;
        Ok(prediction)
    }
}

fn check_amount(field: &'static str, amount: f64) -> Result<()> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(field, "must be finite and non-negative"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor() -> SensorId {
        SensorId::new(2, 9).unwrap()
    }

    fn reading(value: f64) -> Reading {
        Reading::new(sensor(), &[value], 1_000, 500).unwrap()
    }

    fn transition(cash: f64) -> Transition {
        Transition::new(TransitionId(1), &reading(1.0), reading(2.0), cash).unwrap()
    }

    #[test]
    fn test_rejects_mismatched_sensors() {
        let other = Reading::new(SensorId::new(2, 10).unwrap(), &[2.0], 0, 1).unwrap();
        assert!(matches!(
            Transition::new(TransitionId(1), &reading(1.0), other, 0.0),
            Err(Error::SensorMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_self_transition() {
        assert!(matches!(
            Transition::new(TransitionId(1), &reading(1.0), reading(1.0), 0.0),
            Err(Error::SelfTransition)
        ));
    }

    #[test]
    fn test_accuracy_with_zero_attempts_is_zero() {
        let t = transition(0.0);
        assert_eq!(t.attempts(), 0);
        assert_eq!(t.prediction_accuracy(), 0.0);
    }

    #[test]
    fn test_accuracy_and_streak() {
        let mut t = transition(0.0);
        t.record_attempt();
        t.record_attempt();
        t.record_success(5_000);
        t.record_attempt();
        t.record_attempt();
        assert_eq!(t.prediction_accuracy(), 0.25);
        assert_eq!(t.consecutive_successes(), 1);
        assert_eq!(t.last_success_nanos(), Some(5_000));

        t.record_failure();
        assert_eq!(t.consecutive_successes(), 0);
        assert_eq!(t.successes(), 1);
    }

    #[test]
    fn test_probability_setter_rejects_out_of_range() {
        let mut t = transition(0.0);
        assert!(t.set_probability(1.01).is_err());
        assert!(t.set_probability(0.4).is_ok());
        assert_eq!(t.probability(), 0.4);
    }

    #[test]
    fn test_bid_pay_receive() {
        let mut t = transition(100.0);
        let bid = t.bid(0.1).unwrap();
        assert_eq!(bid.amount, 10.0);

        let prediction = t.pay(&bid).unwrap();
        assert_eq!(t.cash_on_hand(), 90.0);
        assert_eq!(prediction.transition(), t.id());
        assert_eq!(prediction.sensor_event(), t.predicted());

        t.receive_payment(30.0).unwrap();
        assert_eq!(t.cash_on_hand(), 120.0);
    }

    #[test]
    fn test_overdraft_is_rejected_without_effect() {
        let mut t = transition(5.0);
        let greedy = Bid {
            transition: t.id(),
            amount: 5.5,
        };
        assert!(matches!(t.pay(&greedy), Err(Error::InsufficientFunds { .. })));
        assert_eq!(t.cash_on_hand(), 5.0);
    }

    #[test]
    fn test_cash_never_negative() {
        let mut t = transition(10.0);
        let steps: [(bool, f64); 6] = [
            (true, 4.0),
            (true, 7.0),
            (false, 1.0),
            (true, 7.0),
            (true, 0.5),
            (false, -3.0),
        ];
        for (paying, amount) in steps {
            let before = t.cash_on_hand();
            let result = if paying {
                t.pay(&Bid {
                    transition: t.id(),
                    amount,
                })
                .map(|_| ())
            } else {
                t.receive_payment(amount)
            };
            if result.is_err() {
                assert_eq!(t.cash_on_hand(), before);
            }
            assert!(t.cash_on_hand() >= 0.0);
        }
        assert_eq!(t.cash_on_hand(), 0.0);
    }

    #[test]
    fn test_rejects_foreign_bid() {
        let mut t = transition(10.0);
        let foreign = Bid {
            transition: TransitionId(99),
            amount: 1.0,
        };
        assert!(t.pay(&foreign).is_err());
        assert_eq!(t.cash_on_hand(), 10.0);
    }
}
