//! Aggregation strategies and their accumulated state.
//!
//! [`Aggregation`] is the template a view is declared with; every bucket of
//! the view owns one [`AggregationData`] created from that template. Both are
//! closed enums: adding a variant means touching every match below, the
//! exposition renderer and the config loader.

use crate::core::{Result, VigilError};
use crate::stats::measure::MeasureValue;
use std::sync::Arc;

/// Strictly increasing, finite bucket boundaries for a distribution.
///
/// `n` boundaries split the real line into `n + 1` half-open intervals:
/// `(-inf, b0), [b0, b1), ..., [b(n-1), +inf)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketBoundaries(Arc<[f64]>);

impl BucketBoundaries {
    /// Validate and wrap the boundaries
    pub fn new(boundaries: Vec<f64>) -> Result<Self> {
        if let Some(bad) = boundaries.iter().find(|b| !b.is_finite()) {
            return Err(VigilError::invalid_aggregation(format!(
                "bucket boundary {} is not finite",
                bad
            )));
        }
        if let Some(pair) = boundaries.windows(2).find(|w| w[0] >= w[1]) {
            return Err(VigilError::invalid_aggregation(format!(
                "bucket boundaries must be strictly increasing, found {} followed by {}",
                pair[0], pair[1]
            )));
        }
        Ok(Self(boundaries.into()))
    }

    /// The boundary values
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of buckets, one more than the number of boundaries
    pub fn bucket_count(&self) -> usize {
        self.0.len() + 1
    }

    /// Index of the bucket holding `value`, by binary search.
    #[inline]
    pub fn bucket_index(&self, value: f64) -> usize {
        self.0.partition_point(|b| *b <= value)
    }
}

/// Aggregation template declared on a view.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    /// Number of recorded samples
    Count,
    /// Sum of recorded samples
    Sum,
    /// Most recent sample
    LastValue,
    /// Histogram over fixed bucket boundaries
    Distribution(BucketBoundaries),
}

impl Aggregation {
    /// Distribution over the given boundaries
    pub fn distribution(boundaries: Vec<f64>) -> Result<Self> {
        Ok(Aggregation::Distribution(BucketBoundaries::new(boundaries)?))
    }

    /// Fresh accumulator for one bucket
    pub fn new_data(&self) -> AggregationData {
        match self {
            Aggregation::Count => AggregationData::Count(0),
            Aggregation::Sum => AggregationData::Sum(0.0),
            Aggregation::LastValue => AggregationData::LastValue(None),
            Aggregation::Distribution(boundaries) => {
                AggregationData::Distribution(DistributionData::new(boundaries.clone()))
            },
        }
    }

    /// Short name used in logs and exposition
    pub fn kind_name(&self) -> &'static str {
        match self {
            Aggregation::Count => "count",
            Aggregation::Sum => "sum",
            Aggregation::LastValue => "last_value",
            Aggregation::Distribution(_) => "distribution",
        }
    }
}

/// Accumulated state of a distribution bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionData {
    boundaries: BucketBoundaries,
    bucket_counts: Vec<u64>,
    count: u64,
    sum: f64,
    mean: f64,
    sum_of_squared_deviation: f64,
    min: f64,
    max: f64,
}

impl DistributionData {
    fn new(boundaries: BucketBoundaries) -> Self {
        Self {
            bucket_counts: vec![0; boundaries.bucket_count()],
            boundaries,
            count: 0,
            sum: 0.0,
            mean: 0.0,
            sum_of_squared_deviation: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn add(&mut self, value: f64) {
        let idx = self.boundaries.bucket_index(value);
        self.bucket_counts[idx] += 1;

        self.count += 1;
        self.sum += value;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.sum_of_squared_deviation += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Boundaries this distribution was created with
    pub fn boundaries(&self) -> &BucketBoundaries {
        &self.boundaries
    }

    /// Per-bucket (non-cumulative) counts, `boundaries + 1` entries
    pub fn bucket_counts(&self) -> &[u64] {
        &self.bucket_counts
    }

    /// Number of samples
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of samples
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Arithmetic mean, zero when empty
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sum of squared deviations from the mean
    pub fn sum_of_squared_deviation(&self) -> f64 {
        self.sum_of_squared_deviation
    }

    /// Smallest sample, if any
    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    /// Largest sample, if any
    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

/// Accumulated state of one aggregation bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationData {
    /// Count total
    Count(u64),
    /// Sum total
    Sum(f64),
    /// Last recorded sample, `None` until the first update
    LastValue(Option<MeasureValue>),
    /// Distribution state
    Distribution(DistributionData),
}

impl AggregationData {
    /// Apply one sample.
    #[inline]
    pub fn update(&mut self, sample: MeasureValue) {
        match self {
            AggregationData::Count(total) => *total += 1,
            AggregationData::Sum(total) => *total += sample.as_f64(),
            AggregationData::LastValue(value) => *value = Some(sample),
            AggregationData::Distribution(data) => data.add(sample.as_f64()),
        }
    }

    /// Immutable copy of the current state
    pub fn snapshot(&self) -> AggregationData {
        self.clone()
    }
}
