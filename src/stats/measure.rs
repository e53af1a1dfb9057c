//! Named, typed measurement channels.

use crate::core::{Result, VigilError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Numeric type carried by a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureKind {
    /// 64-bit floating point samples
    Float,
    /// 64-bit signed integer samples
    Integer,
}

impl MeasureKind {
    /// Lowercase name used in config files and messages
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasureKind::Float => "float",
            MeasureKind::Integer => "integer",
        }
    }
}

/// A single sample value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasureValue {
    /// Floating point sample
    Float(f64),
    /// Integer sample
    Integer(i64),
}

impl MeasureValue {
    /// The sample as a float, for aggregations that accumulate in f64.
    pub fn as_f64(&self) -> f64 {
        match *self {
            MeasureValue::Float(v) => v,
            MeasureValue::Integer(v) => v as f64,
        }
    }

    /// Converts the sample to the representation of `kind`.
    ///
    /// Floats recorded against integer measures are truncated toward zero.
    pub fn coerce(self, kind: MeasureKind) -> Self {
        match (self, kind) {
            (MeasureValue::Float(v), MeasureKind::Integer) => MeasureValue::Integer(v as i64),
            (MeasureValue::Integer(v), MeasureKind::Float) => MeasureValue::Float(v as f64),
            (value, _) => value,
        }
    }

    /// Returns true for NaN float samples.
    pub fn is_nan(&self) -> bool {
        matches!(self, MeasureValue::Float(v) if v.is_nan())
    }
}

impl From<f64> for MeasureValue {
    fn from(v: f64) -> Self {
        MeasureValue::Float(v)
    }
}

impl From<i64> for MeasureValue {
    fn from(v: i64) -> Self {
        MeasureValue::Integer(v)
    }
}

impl From<u32> for MeasureValue {
    fn from(v: u32) -> Self {
        MeasureValue::Integer(i64::from(v))
    }
}

impl From<i32> for MeasureValue {
    fn from(v: i32) -> Self {
        MeasureValue::Integer(i64::from(v))
    }
}

impl fmt::Display for MeasureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasureValue::Float(v) => write!(f, "{}", v),
            MeasureValue::Integer(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct MeasureInner {
    name: String,
    description: String,
    unit: String,
    kind: MeasureKind,
}

/// Handle to a defined measure. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measure(Arc<MeasureInner>);

impl Measure {
    /// Measure name, its identity
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Human-readable description
    pub fn description(&self) -> &str {
        &self.0.description
    }

    /// Unit string, e.g. `ms` or `1`
    pub fn unit(&self) -> &str {
        &self.0.unit
    }

    /// Value kind
    pub fn kind(&self) -> MeasureKind {
        self.0.kind
    }
}

/// Registry of measures keyed by name.
#[derive(Debug, Default)]
pub struct MeasureRegistry {
    measures: DashMap<String, Measure>,
}

impl MeasureRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a measure, or return the existing one with the same name and kind.
    pub fn define(
        &self,
        name: &str,
        description: &str,
        unit: &str,
        kind: MeasureKind,
    ) -> Result<Measure> {
        if name.is_empty() {
            return Err(VigilError::config("measure name cannot be empty"));
        }

        match self.measures.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                let existing = existing.get();
                if existing.kind() != kind {
                    return Err(VigilError::DuplicateMeasure {
                        name: name.to_string(),
                        existing: existing.kind().as_str(),
                        requested: kind.as_str(),
                    });
                }
                Ok(existing.clone())
            },
            Entry::Vacant(slot) => {
                let measure = Measure(Arc::new(MeasureInner {
                    name: name.to_string(),
                    description: description.to_string(),
                    unit: unit.to_string(),
                    kind,
                }));
                slot.insert(measure.clone());
                tracing::debug!(measure = name, kind = kind.as_str(), "Defined measure");
                Ok(measure)
            },
        }
    }

    /// Shorthand for a float measure
    pub fn define_float(&self, name: &str, description: &str, unit: &str) -> Result<Measure> {
        self.define(name, description, unit, MeasureKind::Float)
    }

    /// Shorthand for an integer measure
    pub fn define_integer(&self, name: &str, description: &str, unit: &str) -> Result<Measure> {
        self.define(name, description, unit, MeasureKind::Integer)
    }

    /// Look up a measure by name
    pub fn get(&self, name: &str) -> Option<Measure> {
        self.measures.get(name).map(|m| m.value().clone())
    }

    /// Number of defined measures
    pub fn len(&self) -> usize {
        self.measures.len()
    }

    /// Returns true if no measure is defined
    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }
}
