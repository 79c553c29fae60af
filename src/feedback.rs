//! Predicting / not-predicting state machine around any pattern recognizer.
//!
//! The loop itself only decides *when* to ask for predictions, when to learn
//! and how to score the outcome. What a prediction is and how it is learned
//! is left to the wrapped [`PatternRecognizer`].
//!
//! | State         | Input                         | Effect                                   | Next          |
//! |---------------|-------------------------------|------------------------------------------|---------------|
//! | NotPredicting | reading with predictions      | emit them                                | Predicting    |
//! | NotPredicting | reading without predictions   | learn `previous -> reading` if possible  | NotPredicting |
//! | Predicting    | reading matching a prediction | success, reward, emit new predictions    | Predicting    |
//! | Predicting    | anything else                 | failures recorded, nothing emitted       | NotPredicting |
//!
//! Readings the recognizer's gate rejects never reach the table: the state,
//! the economy and the previous reading are left as they were.

use alloc::vec::Vec;
use log::debug;

use crate::config::EconomyConfig;
use crate::economy::BucketBrigade;
use crate::error::Result;
use crate::prediction::Prediction;
use crate::reading::{Reading, SensorId};
use crate::storage::KnowledgeStore;
use crate::transition::TransitionId;

/// A recognizer the feedback loop can drive
pub trait PatternRecognizer {
    type Store: KnowledgeStore;

    /// Sensor binding whose readings this recognizer accepts
    fn sensor(&self) -> SensorId;

    fn store(&self) -> &Self::Store;

    /// False when `reading` should be skipped entirely, e.g. because too
    /// little time passed or nothing significant changed
    fn accepts(&self, _reading: &Reading) -> bool {
        true
    }

    /// Process `reading` and return what is expected to follow it
    fn predict(&mut self, reading: &Reading) -> Result<Vec<Prediction>>;

    /// Learn that `current` followed `previous`. Returns the transition
    /// learned, if any.
    fn learn(&mut self, previous: &Reading, current: &Reading) -> Result<Option<TransitionId>>;

    /// Let the recognizer see a reading the loop does not ask predictions for
    fn observe(&mut self, _reading: &Reading) -> Result<()> {
        Ok(())
    }

    /// True when `reading` confirms `prediction`
    fn matches(&self, prediction: &Prediction, reading: &Reading) -> bool {
        prediction.sensor_event().key() == reading.key()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoopState {
    #[default]
    NotPredicting,
    Predicting { predictions: Vec<Prediction> },
}

impl LoopState {
    pub fn is_predicting(&self) -> bool {
        matches!(self, Self::Predicting { .. })
    }

    /// Predictions still waiting to be confirmed
    pub fn outstanding(&self) -> &[Prediction] {
        match self {
            Self::NotPredicting => &[],
            Self::Predicting { predictions } => predictions,
        }
    }
}

/// Advance the loop by one reading.
///
/// `previous` is the reading handed to the loop before this one. The returned
/// predictions are the ones emitted for `reading`; they are also carried by
/// the returned state when it is [`LoopState::Predicting`]. A reading the
/// recognizer does not accept returns `state` unchanged and emits nothing.
pub fn step<R: PatternRecognizer>(
    state: &LoopState,
    previous: Option<&Reading>,
    recognizer: &mut R,
    brigade: &mut BucketBrigade,
    reading: &Reading,
) -> Result<(LoopState, Vec<Prediction>)> {
    recognizer.sensor().ensure_matches(reading.sensor())?;

    if !recognizer.accepts(reading) {
        debug!("{} gated, loop state unchanged", reading.key());
        return Ok((state.clone(), Vec::new()));
    }

    if recognizer.store().get_reading(reading.key())?.is_none() {
        recognizer.store().log_reading(reading)?;
    }

    match state {
        LoopState::NotPredicting => {
            let predictions = recognizer.predict(reading)?;
            if predictions.is_empty() {
                if let Some(previous) = previous {
                    recognizer.learn(previous, reading)?;
                }
                return Ok((LoopState::NotPredicting, Vec::new()));
            }
            emit(recognizer, brigade, &predictions)?;
            debug!("Predicting {} outcome(s) after {}", predictions.len(), reading.key());
            Ok((
                LoopState::Predicting {
                    predictions: predictions.clone(),
                },
                predictions,
            ))
        }
        LoopState::Predicting { predictions } => {
            let confirmed = predictions
                .iter()
                .find(|prediction| recognizer.matches(prediction, reading))
                .map(Prediction::transition);

            let Some(id) = confirmed else {
                debug!("{} confirmed no prediction", reading.key());
                for prediction in predictions {
                    recognizer.store().record_failure(prediction.transition())?;
                }
                brigade.reset();
                recognizer.observe(reading)?;
                return Ok((LoopState::NotPredicting, Vec::new()));
            };

            debug!("{} confirmed prediction of {}", reading.key(), id);
            recognizer.store().record_success(id, reading.timestamp_nanos())?;
            brigade.reward(recognizer.store(), id)?;

            let next = recognizer.predict(reading)?;
            emit(recognizer, brigade, &next)?;
            Ok((
                LoopState::Predicting {
                    predictions: next.clone(),
                },
                next,
            ))
        }
    }
}

/// Count an attempt for every emitted prediction and settle the auction
fn emit<R: PatternRecognizer>(
    recognizer: &R,
    brigade: &mut BucketBrigade,
    predictions: &[Prediction],
) -> Result<()> {
    let store = recognizer.store();
    for prediction in predictions {
        store.record_attempt(prediction.transition())?;
    }
    brigade.settle(store, predictions)?;
    Ok(())
}

/// Stateful driver for [`step`]
pub struct FeedbackLoop<R> {
    recognizer: R,
    state: LoopState,
    previous: Option<Reading>,
    brigade: BucketBrigade,
}

impl<R: PatternRecognizer> FeedbackLoop<R> {
    pub fn new(recognizer: R, economy: EconomyConfig) -> Result<Self> {
        Ok(Self {
            recognizer,
            state: LoopState::NotPredicting,
            previous: None,
            brigade: BucketBrigade::new(economy)?,
        })
    }

    /// Advance by one reading. Gated readings do not become `previous`.
    pub fn process(&mut self, reading: &Reading) -> Result<Vec<Prediction>> {
        let accepted = self.recognizer.accepts(reading);
        let (state, predictions) = step(
            &self.state,
            self.previous.as_ref(),
            &mut self.recognizer,
            &mut self.brigade,
            reading,
        )?;
        self.state = state;
        if accepted {
            self.previous = Some(reading.clone());
        }
        Ok(predictions)
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn previous(&self) -> Option<&Reading> {
        self.previous.as_ref()
    }

    pub fn brigade(&self) -> &BucketBrigade {
        &self.brigade
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    pub fn into_recognizer(self) -> R {
        self.recognizer
    }
}
