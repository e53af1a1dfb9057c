//! Wiring of the metrics engine, tracer and exporter from one [`Config`].

use crate::core::{Config, Result, VigilError};
use crate::export::{ExportCoordinator, ExportStats, SpanSink};
use crate::stats::{MeasureRegistry, MetricsReader, StatsRecorder, View, ViewManager};
use crate::trace::{SpanProcessor, Tracer};
use std::sync::Arc;

/// Owns every telemetry component of a process.
///
/// Nothing is global: callers hold a `Telemetry` (or the `Arc`s it hands out)
/// and pass it to the code that records or traces.
pub struct Telemetry {
    measures: Arc<MeasureRegistry>,
    views: Arc<ViewManager>,
    recorder: StatsRecorder,
    tracer: Tracer,
    exporter: Arc<ExportCoordinator>,
    config: Config,
}

impl Telemetry {
    /// Define the configured measures and views, then start exporting spans
    /// to `sink`. Must be called inside a tokio runtime.
    pub fn new(config: Config, sink: Arc<dyn SpanSink>) -> Result<Self> {
        config.validate()?;

        let measures = Arc::new(MeasureRegistry::new());
        for measure in &config.metrics.measures {
            measures.define(&measure.name, &measure.description, &measure.unit, measure.kind)?;
        }

        let views = Arc::new(ViewManager::new(Arc::clone(&measures)));
        for view in &config.metrics.views {
            let measure = measures
                .get(&view.measure)
                .ok_or_else(|| VigilError::UnknownMeasure(view.measure.clone()))?;
            views.register_view(View::new(
                view.name.as_str(),
                view.description.as_str(),
                measure,
                view.aggregation.build()?,
                view.dimension_keys()?,
            ))?;
        }

        let sink_name = sink.name().to_string();
        let exporter = Arc::new(ExportCoordinator::start(sink, config.export.clone())?);
        let sampler = config.sampling.sampler()?;
        let tracer = Tracer::new(sampler, Arc::clone(&exporter) as Arc<dyn SpanProcessor>);

        tracing::info!(
            measures = measures.len(),
            views = config.metrics.views.len(),
            sampler = %sampler.description(),
            sink = %sink_name,
            "Telemetry initialized"
        );

        Ok(Self {
            recorder: StatsRecorder::new(Arc::clone(&views)),
            measures,
            views,
            tracer,
            exporter,
            config,
        })
    }

    /// Measure definitions
    pub fn measures(&self) -> &Arc<MeasureRegistry> {
        &self.measures
    }

    /// View registry and aggregation state
    pub fn views(&self) -> &Arc<ViewManager> {
        &self.views
    }

    /// Entry point for recording measurements
    pub fn recorder(&self) -> &StatsRecorder {
        &self.recorder
    }

    /// Span factory
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Read-only handle for exposition endpoints
    pub fn metrics_reader(&self) -> Arc<dyn MetricsReader> {
        Arc::clone(&self.views) as Arc<dyn MetricsReader>
    }

    /// Exporter counters
    pub fn export_stats(&self) -> ExportStats {
        self.exporter.stats()
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Flush every finished span under the configured shutdown deadline
    pub async fn shutdown(&self) -> Result<()> {
        self.exporter
            .shutdown(self.config.export.shutdown_deadline)
            .await
    }
}
