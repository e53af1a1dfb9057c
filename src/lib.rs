//! Vigil - in-process metrics aggregation and distributed tracing.
//!
//! Vigil records measurements into dimensional views and traces work as
//! trees of spans, all inside the instrumented process.
//!
//! # Architecture
//!
//! - `tags`: validated tag keys/values and immutable tag contexts
//! - `stats`: measures, views, aggregation buckets and Prometheus exposition
//! - `trace`: span identities, samplers, explicit context and scoped spans
//! - `export`: bounded span buffer with a background flush to a sink
//! - `pipeline`: builds all of the above from one [`Config`]
//! - `core`: error type and configuration
//! - `cli`: the demo binary's command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vigil_lib::export::LoggingSink;
//! use vigil_lib::trace::Context;
//! use vigil_lib::{Config, Telemetry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let telemetry = Telemetry::new(Config::default(), Arc::new(LoggingSink))?;
//!     let mut cx = Context::new();
//!     {
//!         let _main = telemetry.tracer().span_builder("main").start_scoped_span(&mut cx);
//!     }
//!     telemetry.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cli;
pub mod core;
pub mod export;
pub mod pipeline;
pub mod stats;
pub mod tags;
pub mod trace;

pub use crate::core::{Config, Result, VigilError};
pub use crate::pipeline::Telemetry;
