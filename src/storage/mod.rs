//! Knowledge store contract and the in-memory reference store.
//!
//! Recognizers never reach for a global store: each one is handed a store
//! handle at construction. Every method takes `&self` so one store can be
//! shared (by reference or `Arc`) between recognizers bound to different
//! sensors. Store failures are returned to the recognizer's caller as-is.

pub mod memory;
pub mod record;

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::cycle::CycleKey;
use crate::error::{Error, Result};
use crate::prediction::Prediction;
use crate::reading::{Reading, ReadingKey, SensorId};
use crate::transition::{Transition, TransitionId};

pub use memory::MemoryStore;
pub use record::{CycleRecord, NodeRecord};

pub trait KnowledgeStore {
    /// Learn `first -> predicted`, returning the existing id if the pair is
    /// already known. Fails if the readings belong to different sensors.
    fn learn_transition(&self, first: &Reading, predicted: &Reading) -> Result<TransitionId>;

    /// Predictions whose first reading has `reading`'s key, best funded first.
    /// Unknown readings yield an empty list.
    fn query_predictions(&self, reading: &Reading) -> Result<Vec<Prediction>>;

    /// Number of transitions learned for one sensor binding
    fn query_prediction_count(&self, sensor: SensorId) -> Result<usize>;

    fn transition(&self, id: TransitionId) -> Result<Option<Transition>>;

    /// Overwrite a stored transition. Fails for ids the store never issued.
    fn update_transition(&self, transition: &Transition) -> Result<()>;

    fn log_reading(&self, reading: &Reading) -> Result<()>;

    fn get_reading(&self, key: ReadingKey) -> Result<Option<Reading>>;

    fn save_cycle(&self, record: &CycleRecord) -> Result<()>;

    fn load_cycle(&self, key: CycleKey) -> Result<Option<CycleRecord>>;

    fn record_attempt(&self, id: TransitionId) -> Result<()> {
        let mut transition = self.transition(id)?.ok_or(Error::UnknownTransition(id))?;
        transition.record_attempt();
        self.update_transition(&transition)
    }

    fn record_success(&self, id: TransitionId, timestamp_nanos: i64) -> Result<()> {
        let mut transition = self.transition(id)?.ok_or(Error::UnknownTransition(id))?;
        transition.record_success(timestamp_nanos);
        self.update_transition(&transition)
    }

    fn record_failure(&self, id: TransitionId) -> Result<()> {
        let mut transition = self.transition(id)?.ok_or(Error::UnknownTransition(id))?;
        transition.record_failure();
        self.update_transition(&transition)
    }
}

macro_rules! forward_knowledge_store {
    ($($header:tt)*) => {
        $($header)* {
            fn learn_transition(&self, first: &Reading, predicted: &Reading) -> Result<TransitionId> {
                (**self).learn_transition(first, predicted)
            }

            fn query_predictions(&self, reading: &Reading) -> Result<Vec<Prediction>> {
                (**self).query_predictions(reading)
            }

            fn query_prediction_count(&self, sensor: SensorId) -> Result<usize> {
                (**self).query_prediction_count(sensor)
            }

            fn transition(&self, id: TransitionId) -> Result<Option<Transition>> {
                (**self).transition(id)
            }

            fn update_transition(&self, transition: &Transition) -> Result<()> {
                (**self).update_transition(transition)
            }

            fn log_reading(&self, reading: &Reading) -> Result<()> {
                (**self).log_reading(reading)
            }

            fn get_reading(&self, key: ReadingKey) -> Result<Option<Reading>> {
                (**self).get_reading(key)
            }

            fn save_cycle(&self, record: &CycleRecord) -> Result<()> {
                (**self).save_cycle(record)
            }

            fn load_cycle(&self, key: CycleKey) -> Result<Option<CycleRecord>> {
                (**self).load_cycle(key)
            }

            fn record_attempt(&self, id: TransitionId) -> Result<()> {
                (**self).record_attempt(id)
            }

            fn record_success(&self, id: TransitionId, timestamp_nanos: i64) -> Result<()> {
                (**self).record_success(id, timestamp_nanos)
            }

            fn record_failure(&self, id: TransitionId) -> Result<()> {
                (**self).record_failure(id)
            }
        }
    };
}

forward_knowledge_store!(impl<S: KnowledgeStore + ?Sized> KnowledgeStore for &S);
forward_knowledge_store!(impl<S: KnowledgeStore + ?Sized> KnowledgeStore for Arc<S>);
