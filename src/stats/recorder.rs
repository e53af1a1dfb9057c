//! Measurement batches and the recording entry point.

use crate::stats::measure::{Measure, MeasureValue};
use crate::stats::view::ViewManager;
use crate::tags::TagContext;
use smallvec::SmallVec;
use std::sync::Arc;

/// A transient batch of samples recorded together against one tag context.
#[derive(Debug, Clone, Default)]
pub struct MeasureMap {
    entries: SmallVec<[(Measure, MeasureValue); 4]>,
}

impl MeasureMap {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample for `measure`, converted to the measure's kind.
    ///
    /// NaN samples are dropped here so they never reach an aggregation.
    pub fn put<V: Into<MeasureValue>>(mut self, measure: &Measure, value: V) -> Self {
        let value = value.into();
        if value.is_nan() {
            return self;
        }
        self.entries.push((measure.clone(), value.coerce(measure.kind())));
        self
    }

    /// Samples in insertion order
    pub fn entries(&self) -> impl Iterator<Item = (&Measure, &MeasureValue)> {
        self.entries.iter().map(|(m, v)| (m, v))
    }

    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the batch holds no samples
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Recording facade over a [`ViewManager`].
#[derive(Clone)]
pub struct StatsRecorder {
    views: Arc<ViewManager>,
}

impl StatsRecorder {
    /// Recorder feeding `views`
    pub fn new(views: Arc<ViewManager>) -> Self {
        Self { views }
    }

    /// Start a batch bound to this recorder
    pub fn new_measure_map(&self) -> Recording<'_> {
        Recording {
            views: &self.views,
            map: MeasureMap::new(),
        }
    }

    /// Record an already built batch
    pub fn record(&self, map: &MeasureMap, tags: &TagContext) {
        self.views.record(map, tags);
    }
}

/// A [`MeasureMap`] bound to the engine it will be recorded into.
pub struct Recording<'a> {
    views: &'a ViewManager,
    map: MeasureMap,
}

impl Recording<'_> {
    /// Add a sample
    pub fn put<V: Into<MeasureValue>>(mut self, measure: &Measure, value: V) -> Self {
        self.map = self.map.put(measure, value);
        self
    }

    /// Record the batch against `tags`, consuming it
    pub fn record(self, tags: &TagContext) {
        self.views.record(&self.map, tags);
    }
}
