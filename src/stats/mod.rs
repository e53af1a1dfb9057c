//! Dimensional metrics aggregation engine.
//!
//! Measures define typed channels, views bind a measure to an aggregation and
//! a set of dimension keys, and recordings are routed into one aggregation
//! bucket per observed combination of those keys' values.

pub mod aggregation;
pub mod exposition;
pub mod measure;
pub mod recorder;
pub mod view;

pub use aggregation::{Aggregation, AggregationData, BucketBoundaries, DistributionData};
pub use exposition::{render_prometheus, MetricsReader};
pub use measure::{Measure, MeasureKind, MeasureRegistry, MeasureValue};
pub use recorder::{MeasureMap, Recording, StatsRecorder};
pub use view::{BucketKey, View, ViewManager, ViewSnapshot};
