//! Configuration management for Vigil.
//!
//! Everything here is read once at initialization:
//! - sampling policy
//! - export buffer and flush behaviour
//! - declared measures and views
//! - log level
//!
//! Configuration comes from YAML, with CLI overrides applied through
//! [`ConfigBuilder`].

use crate::core::{Result, VigilError};
use crate::export::ExportConfig;
use crate::stats::{Aggregation, MeasureKind};
use crate::tags::TagKey;
use crate::trace::Sampler;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Complete configuration for Vigil
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Head sampling policy
    pub sampling: SamplingConfig,
    /// Span export settings
    pub export: ExportConfig,
    /// Measures and views registered at startup
    pub metrics: MetricsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Sampling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Which sampler to use
    pub policy: SamplingPolicy,
    /// Fraction of traces kept by the probability policy
    pub rate: f64,
}

/// Sampler selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingPolicy {
    Always,
    Never,
    Probability,
}

/// Declared measures and views
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Measures to define
    pub measures: Vec<MeasureConfig>,
    /// Views to register, after all measures are defined
    pub views: Vec<ViewConfig>,
}

/// One measure declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureConfig {
    /// Unique measure name
    pub name: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
    /// Unit of the recorded values, e.g. `ms` or `1`
    #[serde(default)]
    pub unit: String,
    /// Float or integer samples
    pub kind: MeasureKind,
}

/// One view declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Unique view name
    pub name: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
    /// Name of the measure the view aggregates
    pub measure: String,
    /// How samples are combined
    pub aggregation: AggregationConfig,
    /// Tag keys the view groups by
    #[serde(default)]
    pub dimensions: Vec<String>,
}

/// Aggregation declaration, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationConfig {
    Count,
    Sum,
    LastValue,
    Distribution {
        /// Strictly increasing bucket boundaries
        boundaries: Vec<f64>,
    },
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            policy: SamplingPolicy::Always,
            rate: 1.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.sampling.sampler()?;
        self.export.validate()?;
        self.metrics.validate()?;
        Ok(())
    }
}

impl SamplingConfig {
    /// Build the configured sampler
    pub fn sampler(&self) -> Result<Sampler> {
        match self.policy {
            SamplingPolicy::Always => Ok(Sampler::AlwaysSample),
            SamplingPolicy::Never => Ok(Sampler::NeverSample),
            SamplingPolicy::Probability => Sampler::probability(self.rate),
        }
    }
}

impl MetricsConfig {
    /// Check names, measure references, dimensions and boundaries
    pub fn validate(&self) -> Result<()> {
        let mut measures = HashSet::new();
        for measure in &self.measures {
            if measure.name.is_empty() {
                return Err(VigilError::config("measure name must not be empty"));
            }
            if !measures.insert(measure.name.as_str()) {
                return Err(VigilError::config(format!(
                    "measure '{}' is declared more than once",
                    measure.name
                )));
            }
        }

        let mut views = HashSet::new();
        for view in &self.views {
            if view.name.is_empty() {
                return Err(VigilError::config("view name must not be empty"));
            }
            if !views.insert(view.name.as_str()) {
                return Err(VigilError::config(format!(
                    "view '{}' is declared more than once",
                    view.name
                )));
            }
            if !measures.contains(view.measure.as_str()) {
                return Err(VigilError::UnknownMeasure(view.measure.clone()));
            }
            view.dimension_keys()?;
            view.aggregation.build()?;
        }
        Ok(())
    }
}

impl ViewConfig {
    /// Parse the dimension names into tag keys
    pub fn dimension_keys(&self) -> Result<Vec<TagKey>> {
        self.dimensions.iter().map(TagKey::new).collect()
    }
}

impl AggregationConfig {
    /// Build the aggregation, validating distribution boundaries
    pub fn build(&self) -> Result<Aggregation> {
        match self {
            AggregationConfig::Count => Ok(Aggregation::Count),
            AggregationConfig::Sum => Ok(Aggregation::Sum),
            AggregationConfig::LastValue => Ok(Aggregation::LastValue),
            AggregationConfig::Distribution { boundaries } => {
                Aggregation::distribution(boundaries.clone())
            },
        }
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| VigilError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Switch to probability sampling at `rate`
    pub fn sampling_rate(mut self, rate: f64) -> Self {
        self.config.sampling.policy = SamplingPolicy::Probability;
        self.config.sampling.rate = rate;
        self
    }

    /// Set the sampling policy
    pub fn sampling_policy(mut self, policy: SamplingPolicy) -> Self {
        self.config.sampling.policy = policy;
        self
    }

    /// Set the export buffer capacity
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.export.buffer_capacity = capacity;
        self
    }

    /// Set the export batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.export.batch_size = size;
        self
    }

    /// Set the background flush interval
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.export.flush_interval = interval;
        self
    }

    /// Set the shutdown deadline
    pub fn shutdown_deadline(mut self, deadline: Duration) -> Self {
        self.config.export.shutdown_deadline = deadline;
        self
    }

    /// Declare a measure
    pub fn measure(mut self, measure: MeasureConfig) -> Self {
        self.config.metrics.measures.push(measure);
        self
    }

    /// Declare a view
    pub fn view(mut self, view: ViewConfig) -> Self {
        self.config.metrics.views.push(view);
        self
    }

    /// Set the log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
