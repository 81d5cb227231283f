//! Test utilities and recording helpers for Heapscope development.
//!
//! Provides a [`RecordingListener`] that logs window callbacks, a
//! [`CollectingSink`] that keeps reported anomalies, heap-walk filters,
//! and fixture builders in [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::{Arc, Mutex, PoisonError};

use heapscope_core::{Anomaly, AnomalySink, FilterError, ObjectFilter, ObjectView, SpaceId};
use heapscope_evolution::{EvolutionData, EvolutionListener};

/// Install `env_logger` for the current test binary.
///
/// Safe to call from every test; only the first call installs the logger.
/// Output is captured by the test harness unless `--nocapture` is given.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ── Anomalies ───────────────────────────────────────────────────

/// Anomaly sink that keeps every anomaly it receives.
///
/// Clones share one buffer, so a clone can be handed to a tracker while
/// the test keeps another to inspect.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    anomalies: Arc<Mutex<Vec<Anomaly>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far, in order.
    pub fn anomalies(&self) -> Vec<Anomaly> {
        self.anomalies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.anomalies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AnomalySink for CollectingSink {
    fn report(&mut self, anomaly: &Anomaly) {
        log::debug!("collected anomaly: {anomaly}");
        self.anomalies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(anomaly.clone());
    }
}

// ── Listener ────────────────────────────────────────────────────

/// Which callback fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerCall {
    WindowStart,
    GcStart,
    GcEnd,
    WindowEnd,
}

/// One recorded callback with the window counts it observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    pub call: ListenerCall,
    /// `gc_infos.len()` at the time of the call.
    pub boundaries: usize,
    pub perm: usize,
    pub died: u64,
    pub temp: u64,
    pub finalized: bool,
}

/// Listener that records every callback.
///
/// Clones share one log.
#[derive(Clone, Debug, Default)]
pub struct RecordingListener {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded callback, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Only the callback kinds, in order.
    pub fn sequence(&self) -> Vec<ListenerCall> {
        self.calls().into_iter().map(|c| c.call).collect()
    }

    fn record(&self, call: ListenerCall, data: &EvolutionData) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                call,
                boundaries: data.gc_infos.len(),
                perm: data.perm.len(),
                died: data.died_object_count(),
                temp: data.temp_object_count(),
                finalized: data.is_finalized(),
            });
    }
}

impl EvolutionListener for RecordingListener {
    fn window_start(&mut self, data: &EvolutionData) {
        self.record(ListenerCall::WindowStart, data);
    }

    fn gc_start(&mut self, data: &EvolutionData) {
        self.record(ListenerCall::GcStart, data);
    }

    fn gc_end(&mut self, data: &EvolutionData) {
        self.record(ListenerCall::GcEnd, data);
    }

    fn window_end(&mut self, data: &EvolutionData) {
        self.record(ListenerCall::WindowEnd, data);
    }
}

// ── Filters ─────────────────────────────────────────────────────

/// Accepts only objects in one space.
pub struct SpaceFilter(pub SpaceId);

impl ObjectFilter for SpaceFilter {
    fn name(&self) -> &str {
        "space"
    }

    fn accept(&self, view: &ObjectView<'_>) -> Result<bool, FilterError> {
        Ok(view.space == Some(self.0))
    }
}

/// Accepts objects whose type has the given internal name.
pub struct TypeFilter(pub String);

impl ObjectFilter for TypeFilter {
    fn name(&self) -> &str {
        "type"
    }

    fn accept(&self, view: &ObjectView<'_>) -> Result<bool, FilterError> {
        Ok(view.record.info.ty.internal_name == self.0)
    }
}

/// Accepts only rooted objects.
pub struct RootedFilter;

impl ObjectFilter for RootedFilter {
    fn name(&self) -> &str {
        "rooted"
    }

    fn accept(&self, view: &ObjectView<'_>) -> Result<bool, FilterError> {
        Ok(!view.roots.is_empty())
    }
}

/// Fails on every object.
pub struct FailingFilter;

impl ObjectFilter for FailingFilter {
    fn name(&self) -> &str {
        "failing"
    }

    fn accept(&self, _view: &ObjectView<'_>) -> Result<bool, FilterError> {
        Err(FilterError {
            filter: self.name().to_string(),
            reason: "always fails".into(),
        })
    }
}
