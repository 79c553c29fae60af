//! Cycle pattern recognizer.
//!
//! Runs once per reading of its bound sensor:
//!
//! 1. reject readings from other sensors
//! 2. skip readings that fail the sensor's delay or significance gate
//! 3. roll the window forward (or back) so it encloses the reading
//! 4. relate the reading to the previous node of record:
//!    - fuzzy-equal: the previous node dwells longer, nothing is learned
//!    - later in the window: learn `previous -> reading`, which becomes the
//!      new node of record
//!    - earlier in the window: learn `reading -> previous`, the node of
//!      record stays where it is
//! 5. query the store, rescore the predictions and persist the cycle

use alloc::vec::Vec;
use chrono::{DateTime, TimeZone};
use log::{debug, info};

use super::{Cycle, CycleKey, CycleKind, CycleProbabilityModel, Placement};
use crate::config::CycleConfig;
use crate::error::{Error, Result};
use crate::feedback::PatternRecognizer;
use crate::prediction::{Prediction, PredictionOrigin};
use crate::reading::{Reading, SensorId};
use crate::sensors::{SensorBehavior, SensorBinding};
use crate::storage::KnowledgeStore;
use crate::transition::TransitionId;

pub struct CycleRecognizer<S> {
    binding: SensorBinding,
    cycle: Cycle,
    store: S,
    model: CycleProbabilityModel,
    /// Node of record that new readings are ordered against
    previous: Option<usize>,
    /// Last reading that passed the gate
    last_accepted: Option<Reading>,
    current_predictions: Vec<Prediction>,
}

impl<S: KnowledgeStore> CycleRecognizer<S> {
    pub fn new(
        binding: SensorBinding,
        cycle: Cycle,
        store: S,
        config: &CycleConfig,
    ) -> Result<Self> {
        config.validate()?;
        binding.id.ensure_matches(cycle.sensor())?;
        Ok(Self {
            binding,
            cycle,
            store,
            model: CycleProbabilityModel::from(config),
            previous: None,
            last_accepted: None,
            current_predictions: Vec::new(),
        })
    }

    /// Load the persisted cycle for `binding` and `kind`, or start an empty
    /// one. The window start is recomputed from the calendar at `at`.
    pub fn restore<Tz: TimeZone>(
        binding: SensorBinding,
        kind: CycleKind,
        store: S,
        config: &CycleConfig,
        at: &DateTime<Tz>,
    ) -> Result<Self> {
        let key = CycleKey::new(binding.id, kind);
        let start_nanos = kind.calendar_start(at)?;
        let cycle = match store.load_cycle(key)? {
            Some(record) => {
                let cycle = Cycle::from_record(record, start_nanos)?;
                info!("Restored {} cycle with {} nodes", key, cycle.nodes().len());
                cycle
            }
            None => {
                info!("Starting new {} cycle", key);
                Cycle::with_start(key, start_nanos, config.allowance)
            }
        };
        Self::new(binding, cycle, store, config)
    }

    pub fn binding(&self) -> &SensorBinding {
        &self.binding
    }

    pub fn cycle(&self) -> &Cycle {
        &self.cycle
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Index of the node of record in [`Cycle::nodes`]
    pub fn previous_node(&self) -> Option<usize> {
        self.previous
    }

    /// Predictions returned by the last accepted reading
    pub fn current_predictions(&self) -> &[Prediction] {
        &self.current_predictions
    }

    /// Position of `reading` inside the recurring window, whatever period
    /// it was observed in
    fn window_offset(&self, reading: &Reading) -> i64 {
        reading
            .timestamp_nanos()
            .saturating_sub(self.cycle.start_nanos())
            .rem_euclid(self.cycle.duration_nanos())
    }

    fn readings_equal(&self, a: &Reading, b: &Reading) -> bool {
        self.binding.kind.readings_equal(a, b, self.cycle.allowance())
    }

    /// True when `reading` passes the delay and significance gate against
    /// the last accepted reading
    pub fn passes_gate(&self, reading: &Reading) -> bool {
        self.last_accepted
            .as_ref()
            .is_none_or(|last| self.binding.passes_gate(last, reading))
    }

    pub fn process(&mut self, reading: &Reading) -> Result<Vec<Prediction>> {
        self.binding.ensure_owns(reading)?;

        if !self.passes_gate(reading) {
            debug!("Gated {} on {}", reading.key(), self.cycle.key());
            return Ok(Vec::new());
        }

        let periods = self.cycle.adjust_rollover(reading.timestamp_nanos());
        if periods != 0 {
            debug!("{} rolled over by {} period(s)", self.cycle.key(), periods);
        }

        let kind = self.binding.kind;
        let allowance = self.cycle.allowance();
        let equal = move |a: &Reading, b: &Reading| kind.readings_equal(a, b, allowance);

        let query_for = match self.previous {
            None => {
                let placement = self.cycle.place(reading, equal)?;
                self.previous = Some(placement.index());
                reading.clone()
            }
            Some(index) => {
                let previous = match self.cycle.node(index) {
                    Some(node) => node.reading().clone(),
                    None => return Err(Error::invalid("node index", "no such node")),
                };

                if self.readings_equal(&previous, reading) {
                    debug!("{} merged into node {}", reading.key(), index);
                    self.cycle.add_dwell(index, reading.duration_nanos())?;
                    previous
                } else {
                    let offset = self.window_offset(reading);
                    let previous_offset = self.window_offset(&previous);

                    if offset > previous_offset {
                        debug!("Forward {} -> {}", previous.key(), reading.key());
                        self.store.learn_transition(&previous, reading)?;
                        let placement = self.cycle.place(reading, equal)?;
                        self.previous = Some(placement.index());
                    } else {
                        debug!("Backward {} -> {}", reading.key(), previous.key());
                        self.store.learn_transition(reading, &previous)?;
                        if let Placement::Inserted(at) = self.cycle.place(reading, equal)? {
                            if at <= index {
                                self.previous = Some(index + 1);
                            }
                        }
                    }
                    reading.clone()
                }
            }
        };

        let mut predictions = self.store.query_predictions(&query_for)?;
        self.rescore(&mut predictions, reading.timestamp_nanos())?;

        self.last_accepted = Some(reading.clone());
        self.cycle.refresh_node_probabilities()?;
        self.store.save_cycle(&self.cycle.to_record())?;
        self.current_predictions = predictions.clone();
        Ok(predictions)
    }

    /// Apply the cycle probability model, best first
    fn rescore(&self, predictions: &mut [Prediction], now_nanos: i64) -> Result<()> {
        for prediction in predictions.iter_mut() {
            let event = prediction.sensor_event();
            let dwell = self
                .cycle
                .nodes()
                .iter()
                .find(|node| self.readings_equal(node.reading(), event))
                .map_or(event.duration_nanos(), |node| node.duration_nanos());
            let score = self.model.score(dwell, prediction, now_nanos);
            prediction.rescore(score, PredictionOrigin::Cycle)?;
        }
        predictions.sort_by(|a, b| b.probability().total_cmp(&a.probability()));
        Ok(())
    }
}

impl<S: KnowledgeStore> PatternRecognizer for CycleRecognizer<S> {
    type Store = S;

    fn sensor(&self) -> SensorId {
        self.binding.id
    }

    fn store(&self) -> &S {
        &self.store
    }

    fn accepts(&self, reading: &Reading) -> bool {
        self.passes_gate(reading)
    }

    fn predict(&mut self, reading: &Reading) -> Result<Vec<Prediction>> {
        self.process(reading)
    }

    /// Transitions are learned while processing readings
    fn learn(&mut self, _previous: &Reading, _current: &Reading) -> Result<Option<TransitionId>> {
        Ok(None)
    }

    fn observe(&mut self, reading: &Reading) -> Result<()> {
        self.process(reading).map(|_| ())
    }

    fn matches(&self, prediction: &Prediction, reading: &Reading) -> bool {
        self.readings_equal(prediction.sensor_event(), reading)
    }
}
