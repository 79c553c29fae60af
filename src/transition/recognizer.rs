//! Pairwise recognizer: predicts from learned `a -> b` transitions alone,
//! with no notion of cycles.

use alloc::vec::Vec;
use log::debug;

use super::TransitionId;
use crate::error::Result;
use crate::feedback::PatternRecognizer;
use crate::prediction::Prediction;
use crate::reading::{Reading, SensorId};
use crate::storage::KnowledgeStore;

pub struct TransitionRecognizer<S> {
    sensor: SensorId,
    store: S,
    current_predictions: Vec<Prediction>,
}

impl<S: KnowledgeStore> TransitionRecognizer<S> {
    pub fn new(sensor: SensorId, store: S) -> Self {
        Self {
            sensor,
            store,
            current_predictions: Vec::new(),
        }
    }

    /// Predictions returned by the last call to `predict`
    pub fn current_predictions(&self) -> &[Prediction] {
        &self.current_predictions
    }
}

impl<S: KnowledgeStore> PatternRecognizer for TransitionRecognizer<S> {
    type Store = S;

    fn sensor(&self) -> SensorId {
        self.sensor
    }

    fn store(&self) -> &S {
        &self.store
    }

    fn predict(&mut self, reading: &Reading) -> Result<Vec<Prediction>> {
        self.sensor.ensure_matches(reading.sensor())?;

        let predictions = if self.store.query_prediction_count(self.sensor)? == 0 {
            Vec::new()
        } else {
            self.store.query_predictions(reading)?
        };
        self.current_predictions = predictions.clone();
        Ok(predictions)
    }

    fn learn(&mut self, previous: &Reading, current: &Reading) -> Result<Option<TransitionId>> {
        self.sensor.ensure_matches(previous.sensor())?;
        self.sensor.ensure_matches(current.sensor())?;

        if previous.key() == current.key() {
            debug!("Not learning {} from itself", current.key());
            return Ok(None);
        }
        self.store.learn_transition(previous, current).map(Some)
    }
}
