use core::cell::RefCell;

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, info};

use super::{CycleRecord, KnowledgeStore};
use crate::config::EconomyConfig;
use crate::cycle::CycleKey;
use crate::error::{Error, Result};
use crate::prediction::{Prediction, PredictionOrigin, uniform_probability};
use crate::reading::{Reading, ReadingKey, SensorId};
use crate::transition::{Transition, TransitionId};

/// Readings kept in the history ring buffer by default
pub const DEFAULT_HISTORY_CAPACITY: usize = 4096;

#[derive(Default)]
struct Tables {
    /// Latest reading seen for each key
    readings: BTreeMap<ReadingKey, Reading>,
    /// Every logged reading, oldest evicted first
    history: VecDeque<Reading>,
    history_capacity: usize,
    /// Indexed by `TransitionId`
    transitions: Vec<Transition>,
    by_first: BTreeMap<ReadingKey, Vec<TransitionId>>,
    by_pair: BTreeMap<(ReadingKey, ReadingKey), TransitionId>,
    /// postcard-encoded cycle records
    cycles: BTreeMap<CycleKey, Vec<u8>>,
}

impl Tables {
    fn transition_mut(&mut self, id: TransitionId) -> Option<&mut Transition> {
        usize::try_from(id.0)
            .ok()
            .and_then(|index| self.transitions.get_mut(index))
    }
}

/// In-RAM knowledge store.
///
/// Keeps transitions, readings and cycle records in tables guarded by a
/// single mutex, so a shared reference can serve any number of recognizers.
/// Reading history is a bounded ring buffer; the newest reading per key is
/// kept indefinitely.
///
/// ## Memory Usage
///
/// One history slot holds a [`Reading`] (about 120 bytes), so the default
/// capacity costs roughly 0.5 MB once full.
pub struct MemoryStore {
    economy: EconomyConfig,
    tables: Mutex<CriticalSectionRawMutex, RefCell<Tables>>,
}

impl MemoryStore {
    pub fn new(economy: EconomyConfig) -> Self {
        Self::with_history_capacity(economy, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(economy: EconomyConfig, history_capacity: usize) -> Self {
        let tables = Tables {
            history: VecDeque::with_capacity(history_capacity.min(DEFAULT_HISTORY_CAPACITY)),
            history_capacity,
            ..Tables::default()
        };
        Self {
            economy,
            tables: Mutex::new(RefCell::new(tables)),
        }
    }

    pub fn economy(&self) -> &EconomyConfig {
        &self.economy
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        self.tables.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn transition_count(&self) -> usize {
        self.with_tables(|t| t.transitions.len())
    }

    /// Snapshot of every learned transition, ordered by id
    pub fn transitions(&self) -> Vec<Transition> {
        self.with_tables(|t| t.transitions.clone())
    }

    /// Snapshot of the reading history, oldest first
    pub fn history(&self) -> Vec<Reading> {
        self.with_tables(|t| t.history.iter().cloned().collect())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(EconomyConfig::default())
    }
}

impl KnowledgeStore for MemoryStore {
    fn learn_transition(&self, first: &Reading, predicted: &Reading) -> Result<TransitionId> {
        first.sensor().ensure_matches(predicted.sensor())?;
        let pair = (first.key(), predicted.key());
        let initial_cash = self.economy.initial_cash;

        self.with_tables(|t| {
            if let Some(id) = t.by_pair.get(&pair) {
                debug!("Transition {} -> {} already known as {}", pair.0, pair.1, id);
                return Ok(*id);
            }

            let id = TransitionId(t.transitions.len() as u64);
            let transition = Transition::new(id, first, predicted.clone(), initial_cash)?;
            t.transitions.push(transition);
            t.by_pair.insert(pair, id);
            t.by_first.entry(pair.0).or_default().push(id);
            info!("Learned transition {}: {} -> {}", id, pair.0, pair.1);
            Ok(id)
        })
    }

    fn query_predictions(&self, reading: &Reading) -> Result<Vec<Prediction>> {
        self.with_tables(|t| {
            let Some(ids) = t.by_first.get(&reading.key()) else {
                return Ok(Vec::new());
            };
            let ids = ids.clone();
            let probability = uniform_probability(ids.len());

            let mut candidates = Vec::with_capacity(ids.len());
            for id in ids {
                let transition = t.transition_mut(id).ok_or(Error::UnknownTransition(id))?;
                transition.set_probability(probability)?;
                candidates.push(transition.clone());
            }

            candidates.sort_by(|a, b| {
                b.cash_on_hand()
                    .total_cmp(&a.cash_on_hand())
                    .then(a.id().cmp(&b.id()))
            });
            candidates
                .iter()
                .map(|t| t.to_prediction(probability, PredictionOrigin::Transition))
                .collect()
        })
    }

    fn query_prediction_count(&self, sensor: SensorId) -> Result<usize> {
        Ok(self.with_tables(|t| {
            t.transitions
                .iter()
                .filter(|transition| transition.sensor() == sensor)
                .count()
        }))
    }

    fn transition(&self, id: TransitionId) -> Result<Option<Transition>> {
        Ok(self.with_tables(|t| t.transition_mut(id).cloned()))
    }

    fn update_transition(&self, transition: &Transition) -> Result<()> {
        self.with_tables(|t| {
            let id = transition.id();
            let slot = t.transition_mut(id).ok_or(Error::UnknownTransition(id))?;
            if slot.first() != transition.first()
                || slot.predicted().key() != transition.predicted().key()
            {
                return Err(Error::Store("transition endpoints cannot change"));
            }
            *slot = transition.clone();
            Ok(())
        })
    }

    fn log_reading(&self, reading: &Reading) -> Result<()> {
        self.with_tables(|t| {
            if t.history_capacity > 0 {
                // Add to ring buffer (oldest is dropped when full)
                if t.history.len() >= t.history_capacity {
                    t.history.pop_front();
                }
                t.history.push_back(reading.clone());
            }
            t.readings.insert(reading.key(), reading.clone());
        });
        Ok(())
    }

    fn get_reading(&self, key: ReadingKey) -> Result<Option<Reading>> {
        Ok(self.with_tables(|t| t.readings.get(&key).cloned()))
    }

    fn save_cycle(&self, record: &CycleRecord) -> Result<()> {
        let bytes = record.to_bytes()?;
        self.with_tables(|t| {
            t.cycles.insert(record.key, bytes);
        });
        Ok(())
    }

    fn load_cycle(&self, key: CycleKey) -> Result<Option<CycleRecord>> {
        let bytes = self.with_tables(|t| t.cycles.get(&key).cloned());
        bytes.map(|bytes| CycleRecord::from_bytes(&bytes)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::CycleKind;
    use crate::fuzzy::FuzzyAllowance;

    fn sensor() -> SensorId {
        SensorId::new(1, 1).unwrap()
    }

    fn reading(value: f64, ts: i64) -> Reading {
        Reading::new(sensor(), &[value], ts, 100).unwrap()
    }

    #[test]
    fn test_learn_is_deduplicated() {
        let store = MemoryStore::default();
        let a = store.learn_transition(&reading(1.0, 0), &reading(2.0, 10)).unwrap();
        let b = store.learn_transition(&reading(1.0, 50), &reading(2.0, 90)).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.transition_count(), 1);
    }

    #[test]
    fn test_learn_rejects_mixed_sensors() {
        let store = MemoryStore::default();
        let other = Reading::new(SensorId::new(1, 2).unwrap(), &[2.0], 0, 1).unwrap();
        assert!(matches!(
            store.learn_transition(&reading(1.0, 0), &other),
            Err(Error::SensorMismatch { .. })
        ));
        assert_eq!(store.transition_count(), 0);
    }

    #[test]
    fn test_unknown_reading_has_no_predictions() {
        let store = MemoryStore::default();
        assert!(store.query_predictions(&reading(5.0, 0)).unwrap().is_empty());
    }

    #[test]
    fn test_predictions_are_uniform_and_ranked_by_cash() {
        let store = MemoryStore::default();
        let first = reading(1.0, 0);
        let a = store.learn_transition(&first, &reading(2.0, 10)).unwrap();
        let b = store.learn_transition(&first, &reading(3.0, 10)).unwrap();

        let mut rich = store.transition(b).unwrap().unwrap();
        rich.receive_payment(50.0).unwrap();
        store.update_transition(&rich).unwrap();

        let predictions = store.query_predictions(&first).unwrap();
        let ids: Vec<TransitionId> = predictions.iter().map(Prediction::transition).collect();
        assert_eq!(ids, [b, a]);
        assert!(predictions.iter().all(|p| p.probability() == 0.5));
        assert!(predictions.iter().all(|p| p.origin() == PredictionOrigin::Transition));
    }

    #[test]
    fn test_prediction_count_per_sensor() {
        let store = MemoryStore::default();
        store.learn_transition(&reading(1.0, 0), &reading(2.0, 1)).unwrap();
        store.learn_transition(&reading(2.0, 0), &reading(3.0, 1)).unwrap();
        assert_eq!(store.query_prediction_count(sensor()).unwrap(), 2);
        assert_eq!(store.query_prediction_count(SensorId::new(9, 9).unwrap()).unwrap(), 0);
    }

    #[test]
    fn test_record_outcomes() {
        let store = MemoryStore::default();
        let id = store.learn_transition(&reading(1.0, 0), &reading(2.0, 1)).unwrap();
        store.record_attempt(id).unwrap();
        store.record_attempt(id).unwrap();
        store.record_success(id, 77).unwrap();

        let t = store.transition(id).unwrap().unwrap();
        assert_eq!(t.prediction_accuracy(), 0.5);
        assert_eq!(t.last_success_nanos(), Some(77));
        assert!(matches!(
            store.record_attempt(TransitionId(42)),
            Err(Error::UnknownTransition(TransitionId(42)))
        ));
    }

    #[test]
    fn test_history_ring_buffer_evicts_oldest() {
        let store = MemoryStore::with_history_capacity(EconomyConfig::default(), 2);
        for ts in 0..3 {
            store.log_reading(&reading(ts as f64, ts)).unwrap();
        }
        let history: Vec<i64> = store.history().iter().map(Reading::timestamp_nanos).collect();
        assert_eq!(history, [1, 2]);
        // the readings table keeps evicted readings
        assert!(store.get_reading(reading(0.0, 0).key()).unwrap().is_some());
    }

    #[test]
    fn test_cycle_records_round_trip() {
        let store = MemoryStore::default();
        let key = CycleKey::new(sensor(), CycleKind::Daily);
        assert!(store.load_cycle(key).unwrap().is_none());

        let record = CycleRecord {
            key,
            allowance: FuzzyAllowance::new(0.1).unwrap(),
            nodes: Vec::new(),
        };
        store.save_cycle(&record).unwrap();
        assert_eq!(store.load_cycle(key).unwrap(), Some(record));
    }
}
