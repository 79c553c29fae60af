//! Single-writer access to a feedback loop shared between tasks.
//!
//! One sensor binding is processed strictly in order: the loop reads and
//! mutates the cycle window, the node list and the previous reading as one
//! unit. [`SharedRecognizer`] serialises callers with an async mutex so any
//! number of tasks can feed the same binding. Loops for different bindings
//! need no coordination beyond their shared store.

use alloc::vec::Vec;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;

use crate::error::Result;
use crate::feedback::{FeedbackLoop, LoopState, PatternRecognizer};
use crate::prediction::Prediction;
use crate::reading::Reading;

pub struct SharedRecognizer<R> {
    inner: AsyncMutex<CriticalSectionRawMutex, FeedbackLoop<R>>,
}

impl<R: PatternRecognizer> SharedRecognizer<R> {
    pub fn new(feedback: FeedbackLoop<R>) -> Self {
        Self {
            inner: AsyncMutex::new(feedback),
        }
    }

    /// Wait for exclusive access, then process `reading` to completion
    pub async fn process(&self, reading: &Reading) -> Result<Vec<Prediction>> {
        let mut feedback = self.inner.lock().await;
        feedback.process(reading)
    }

    /// Process `reading` only if no other caller holds the loop.
    ///
    /// Returns `None` without touching the loop when it is busy.
    pub fn try_process(&self, reading: &Reading) -> Option<Result<Vec<Prediction>>> {
        let mut feedback = self.inner.try_lock().ok()?;
        Some(feedback.process(reading))
    }

    pub async fn state(&self) -> LoopState {
        self.inner.lock().await.state().clone()
    }

    /// Run `f` with the loop locked
    pub async fn with<T>(&self, f: impl FnOnce(&mut FeedbackLoop<R>) -> T) -> T {
        let mut feedback = self.inner.lock().await;
        f(&mut feedback)
    }

    pub fn into_inner(self) -> FeedbackLoop<R> {
        self.inner.into_inner()
    }
}
