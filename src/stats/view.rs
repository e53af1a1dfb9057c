//! View definitions, the view registry and bucket routing.
//!
//! Registration is rare and recording is hot, so the routing table
//! (measure name -> views) lives behind an [`ArcSwap`]: registration builds a
//! new table under a mutex and swaps it in, recording loads the current table
//! without taking any lock. Buckets live in a per-view [`DashMap`] and each
//! bucket's accumulator sits behind its own mutex, which is what makes
//! concurrent updates to one bucket linearizable.

use crate::core::{Result, VigilError};
use crate::stats::aggregation::{Aggregation, AggregationData};
use crate::stats::measure::{Measure, MeasureRegistry, MeasureValue};
use crate::stats::recorder::MeasureMap;
use crate::tags::{TagContext, TagKey, TagValue};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Projection of a tag context onto a view's dimensions, in declared order.
/// `None` marks a dimension the recording did not carry.
pub type BucketKey = Vec<Option<TagValue>>;

/// A named binding of measure, aggregation and dimension keys.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    name: String,
    description: String,
    measure: Measure,
    aggregation: Aggregation,
    dimensions: Vec<TagKey>,
}

impl View {
    /// Create a view definition. Validation happens at registration.
    pub fn new<N: Into<String>, D: Into<String>>(
        name: N,
        description: D,
        measure: Measure,
        aggregation: Aggregation,
        dimensions: Vec<TagKey>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            measure,
            aggregation,
            dimensions,
        }
    }

    /// View name, unique per registry
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Measure this view aggregates
    pub fn measure(&self) -> &Measure {
        &self.measure
    }

    /// Aggregation template
    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    /// Declared dimension keys, in order
    pub fn dimensions(&self) -> &[TagKey] {
        &self.dimensions
    }

    /// Same definition, ignoring the description
    fn same_definition(&self, other: &View) -> bool {
        self.measure == other.measure
            && self.aggregation == other.aggregation
            && self.dimensions == other.dimensions
    }
}

/// A registered view and its live buckets.
#[derive(Debug)]
struct ViewEntry {
    view: View,
    buckets: DashMap<BucketKey, Mutex<AggregationData>>,
}

impl ViewEntry {
    fn new(view: View) -> Self {
        Self {
            view,
            buckets: DashMap::new(),
        }
    }

    #[inline]
    fn record(&self, tags: &TagContext, value: MeasureValue) {
        let key = tags.project(&self.view.dimensions);
        if let Some(bucket) = self.buckets.get(&key) {
            bucket.lock().update(value);
            return;
        }
        self.buckets
            .entry(key)
            .or_insert_with(|| Mutex::new(self.view.aggregation.new_data()))
            .lock()
            .update(value);
    }

    fn snapshot(&self) -> ViewSnapshot {
        let mut rows: Vec<(BucketKey, AggregationData)> = self
            .buckets
            .iter()
            .map(|bucket| (bucket.key().clone(), bucket.value().lock().snapshot()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        ViewSnapshot {
            name: self.view.name.clone(),
            description: self.view.description.clone(),
            measure: self.view.measure.clone(),
            aggregation: self.view.aggregation.clone(),
            dimensions: self.view.dimensions.clone(),
            rows,
        }
    }
}

/// Point-in-time copy of a view's buckets, ordered by bucket key.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    /// View name
    pub name: String,
    /// View description
    pub description: String,
    /// Measure the view aggregates
    pub measure: Measure,
    /// Aggregation template
    pub aggregation: Aggregation,
    /// Dimension keys, in declared order
    pub dimensions: Vec<TagKey>,
    /// One row per observed tag combination
    pub rows: Vec<(BucketKey, AggregationData)>,
}

impl ViewSnapshot {
    /// Finds the row whose key matches `values`, given as plain strings.
    pub fn row(&self, values: &[Option<&str>]) -> Option<&AggregationData> {
        self.rows.iter().find_map(|(key, data)| {
            let matches = key.len() == values.len()
                && key
                    .iter()
                    .zip(values)
                    .all(|(k, v)| k.as_ref().map(TagValue::as_str) == *v);
            matches.then_some(data)
        })
    }
}

#[derive(Debug, Default)]
struct RoutingTable {
    by_name: HashMap<String, Arc<ViewEntry>>,
    by_measure: HashMap<String, Vec<Arc<ViewEntry>>>,
}

/// Registry of views and the metrics aggregation engine.
pub struct ViewManager {
    measures: Arc<MeasureRegistry>,
    table: ArcSwap<RoutingTable>,
    write_lock: Mutex<()>,
}

impl ViewManager {
    /// Create an engine resolving measures against `measures`
    pub fn new(measures: Arc<MeasureRegistry>) -> Self {
        Self {
            measures,
            table: ArcSwap::from_pointee(RoutingTable::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// The measure registry views are validated against
    pub fn measures(&self) -> &Arc<MeasureRegistry> {
        &self.measures
    }

    /// Register a view. Identical re-registration is a no-op.
    pub fn register_view(&self, view: View) -> Result<()> {
        if view.name.is_empty() {
            return Err(VigilError::config("view name cannot be empty"));
        }
        match self.measures.get(view.measure.name()) {
            Some(defined) if defined == view.measure => {},
            Some(_) => {
                return Err(VigilError::config(format!(
                    "view '{}' references measure '{}' with a conflicting definition",
                    view.name,
                    view.measure.name()
                )))
            },
            None => return Err(VigilError::UnknownMeasure(view.measure.name().to_string())),
        }
        let mut seen = HashSet::with_capacity(view.dimensions.len());
        if let Some(dup) = view.dimensions.iter().find(|k| !seen.insert(*k)) {
            return Err(VigilError::config(format!(
                "view '{}' declares dimension '{}' more than once",
                view.name, dup
            )));
        }

        let _guard = self.write_lock.lock();
        let current = self.table.load();
        if let Some(existing) = current.by_name.get(&view.name) {
            if existing.view.same_definition(&view) {
                return Ok(());
            }
            return Err(VigilError::ViewConflict(view.name.clone()));
        }

        let entry = Arc::new(ViewEntry::new(view));
        let mut by_name = current.by_name.clone();
        let mut by_measure = current.by_measure.clone();
        by_name.insert(entry.view.name.clone(), Arc::clone(&entry));
        by_measure
            .entry(entry.view.measure.name().to_string())
            .or_default()
            .push(Arc::clone(&entry));
        self.table.store(Arc::new(RoutingTable {
            by_name,
            by_measure,
        }));

        tracing::debug!(
            view = entry.view.name.as_str(),
            measure = entry.view.measure.name(),
            aggregation = entry.view.aggregation.kind_name(),
            "Registered view"
        );
        Ok(())
    }

    /// Look up a registered view definition
    pub fn view(&self, name: &str) -> Option<View> {
        self.table.load().by_name.get(name).map(|e| e.view.clone())
    }

    /// Names of all registered views, sorted
    pub fn view_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.load().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Record every entry of `measures` against `tags`.
    ///
    /// Measures without a registered view are skipped silently; recording
    /// never fails.
    pub fn record(&self, measures: &MeasureMap, tags: &TagContext) {
        let table = self.table.load();
        for (measure, value) in measures.entries() {
            let Some(views) = table.by_measure.get(measure.name()) else {
                continue;
            };
            for entry in views {
                if entry.view.measure == *measure {
                    entry.record(tags, *value);
                }
            }
        }
    }

    /// Snapshot one view, `None` if no view has that name.
    pub fn snapshot(&self, view_name: &str) -> Option<ViewSnapshot> {
        self.table.load().by_name.get(view_name).map(|e| e.snapshot())
    }

    /// Snapshot every registered view, ordered by name.
    pub fn snapshot_all(&self) -> Vec<ViewSnapshot> {
        let table = self.table.load();
        let mut snapshots: Vec<ViewSnapshot> = table.by_name.values().map(|e| e.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}
