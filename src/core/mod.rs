//! Crate-wide error type and startup configuration.

#![warn(missing_docs)]

pub mod config;
pub mod error;

pub use config::{
    AggregationConfig, Config, ConfigBuilder, LogLevel, LoggingConfig, MeasureConfig,
    MetricsConfig, SamplingConfig, SamplingPolicy, ViewConfig,
};
pub use error::{Result, VigilError};
