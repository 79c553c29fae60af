//! Online pattern recognition for timestamped sensor readings.
//!
//! Readings from one sensor binding are folded into recurring calendar
//! windows ([`cycle::Cycle`]) and into pairwise transitions
//! ([`transition::Transition`]). Transitions compete for the right to predict
//! through a small credit-assignment economy, and a feedback loop
//! ([`feedback::FeedbackLoop`]) confirms or rejects what was predicted.
//!
//! All learned state lives behind the [`storage::KnowledgeStore`] trait and
//! is handed to recognizers explicitly.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod cycle;
pub mod economy;
pub mod error;
pub mod feedback;
pub mod fuzzy;
pub mod prediction;
pub mod reading;
pub mod sensors;
pub mod shared;
pub mod storage;
pub mod transition;

pub use config::Config;
pub use cycle::{Cycle, CycleKind, CycleRecognizer};
pub use error::{Error, Result};
pub use feedback::{FeedbackLoop, LoopState, PatternRecognizer};
pub use fuzzy::{FuzzyAllowance, fuzzy_equals};
pub use prediction::Prediction;
pub use reading::{Reading, ReadingKey, SensorId};
pub use sensors::{SensorBinding, SensorKind};
pub use shared::SharedRecognizer;
pub use storage::{KnowledgeStore, MemoryStore};
pub use transition::{Transition, TransitionId, TransitionRecognizer};
