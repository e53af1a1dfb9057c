//! Head sampling policies.
//!
//! The decision is made once, when a span starts, and never revisited.

use crate::core::{Result, VigilError};
use crate::trace::types::{SpanContext, TraceId};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Sampling policy applied at span creation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Sampler {
    /// Keep every span
    #[default]
    AlwaysSample,
    /// Drop every span
    NeverSample,
    /// Keep a deterministic fraction of traces
    Probability(ProbabilitySampler),
}

impl Sampler {
    /// Probability sampler keeping roughly `rate` of all traces
    pub fn probability(rate: f64) -> Result<Self> {
        Ok(Sampler::Probability(ProbabilitySampler::new(rate)?))
    }

    /// Decide whether a new span is sampled.
    ///
    /// A span whose parent was sampled is always sampled, so a trace is never
    /// cut in the middle; otherwise the policy decides from the trace id.
    #[inline]
    pub fn should_sample(&self, parent: Option<&SpanContext>, trace_id: TraceId) -> bool {
        if parent.is_some_and(|p| p.sampled) {
            return true;
        }
        match self {
            Sampler::AlwaysSample => true,
            Sampler::NeverSample => false,
            Sampler::Probability(sampler) => sampler.should_sample(trace_id),
        }
    }

    /// Short description for logs
    pub fn description(&self) -> String {
        match self {
            Sampler::AlwaysSample => "always".to_string(),
            Sampler::NeverSample => "never".to_string(),
            Sampler::Probability(sampler) => format!("probability({})", sampler.rate()),
        }
    }
}

/// Samples a trace when the hash of its id falls below `rate * 2^64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbabilitySampler {
    rate: f64,
    id_upper_bound: u64,
}

impl ProbabilitySampler {
    /// Validates `rate` in `[0.0, 1.0]`
    pub fn new(rate: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(VigilError::InvalidSamplingRate(rate));
        }
        let id_upper_bound = if rate >= 1.0 {
            u64::MAX
        } else {
            (rate * u64::MAX as f64) as u64
        };
        Ok(Self {
            rate,
            id_upper_bound,
        })
    }

    /// Configured rate
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Pure function of the trace id and the rate.
    #[inline]
    pub fn should_sample(&self, trace_id: TraceId) -> bool {
        if self.rate >= 1.0 {
            return true;
        }
        trace_hash(trace_id) < self.id_upper_bound
    }
}

/// Fast non-cryptographic hash so sequential ids still spread evenly
#[inline]
fn trace_hash(trace_id: TraceId) -> u64 {
    let mut hasher = FxHasher::default();
    trace_id.hash(&mut hasher);
    hasher.finish()
}
