//! Command-line interface for Vigil.
//!
//! The `vigil` binary runs a small instrumented workload: every iteration of
//! `doWork` is traced as a child of a `main` span and records its latency and
//! a call count tagged with `method=doWork`. The aggregated views are printed
//! in the Prometheus text format before the exporter is shut down.

use crate::core::{Config, ConfigBuilder, LogLevel, Result, VigilError};
use crate::export::LoggingSink;
use crate::pipeline::Telemetry;
use crate::stats::{Aggregation, Measure, View};
use crate::tags::{TagContext, TagKey, TagValue};
use crate::trace::{Context, SpanStatus};
use clap::Parser;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latency buckets: >=0ms, >=25ms, >=50ms, ... >=4s, >=6s
pub const LATENCY_BOUNDARIES: [f64; 13] = [
    0.0, 25.0, 50.0, 75.0, 100.0, 200.0, 400.0, 600.0, 800.0, 1000.0, 2000.0, 4000.0, 6000.0,
];

/// In-process metrics and tracing demo
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/vigil/config.yaml)
    #[arg(short, long, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of doWork iterations
    #[arg(short = 'n', long, env = "VIGIL_ITERATIONS", default_value_t = 10)]
    pub iterations: u32,

    /// Upper bound of the simulated work per iteration, in milliseconds
    #[arg(long, env = "VIGIL_MAX_WORK_MS", default_value_t = 1000)]
    pub max_work_ms: u64,

    /// Probability sampling rate (default: sample everything)
    #[arg(long, env = "VIGIL_SAMPLE_RATE")]
    pub sample_rate: Option<f64>,

    /// Enable debug logging
    #[arg(short, long, env = "VIGIL_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Config file
    /// 3. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = if let Some(path) = &self.config {
            path.clone()
        } else {
            let default_path = dirs::config_dir()
                .map(|d| d.join("vigil").join("config.yaml"))
                .unwrap_or_else(|| PathBuf::from("~/.config/vigil/config.yaml"));

            if default_path.exists() {
                default_path
            } else {
                return self.build_config_from_args(builder);
            }
        };

        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                builder = builder.from_yaml(&content)?;
                tracing::info!("Loaded configuration from: {:?}", config_path);
            },
            Err(e) if self.config.is_some() => {
                return Err(VigilError::config(format!(
                    "Failed to read config file {:?}: {}",
                    config_path, e
                )));
            },
            Err(_) => {
                tracing::debug!("No config file found at {:?}, using defaults", config_path);
            },
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(rate) = self.sample_rate {
            builder = builder.sampling_rate(rate);
        }
        builder.debug(self.debug).build()
    }

    /// Initialize logging. `--debug` wins over `RUST_LOG`, which wins over
    /// `VIGIL_LOG_LEVEL`, which wins over the configured level.
    pub fn init_logging(&self, configured: LogLevel) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let env_log_level = std::env::var("VIGIL_LOG_LEVEL")
            .unwrap_or_else(|_| configured.as_str().to_string());
        let filter = if self.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&env_log_level))
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false).compact())
            .try_init()
            .map_err(|e| VigilError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the Vigil demo.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;
    cli.init_logging(config.logging.level)?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Sampler: {}", config.sampling.sampler()?.description());
        println!("  Buffer capacity: {}", config.export.buffer_capacity);
        println!("  Batch size: {}", config.export.batch_size);
        println!("  Flush interval: {:?}", config.export.flush_interval);
        println!("  Shutdown deadline: {:?}", config.export.shutdown_deadline);
        println!("  Measures: {}", config.metrics.measures.len());
        println!("  Views: {}", config.metrics.views.len());
        return Ok(());
    }

    let telemetry = Telemetry::new(config, Arc::new(LoggingSink))?;
    let result = run_workload(&telemetry, cli.iterations, cli.max_work_ms).await;
    let shutdown = telemetry.shutdown().await;

    print!("{}", telemetry.metrics_reader().render_prometheus());
    let stats = telemetry.export_stats();
    tracing::info!(
        exported = stats.exported,
        dropped = stats.dropped,
        lost = stats.lost_on_shutdown,
        "Demo finished"
    );

    result.and(shutdown)
}

/// Handles to the demo's measures
#[derive(Debug, Clone)]
pub struct DemoMeasures {
    /// Time spent in one `doWork` call, in milliseconds
    pub latency: Measure,
    /// One per `doWork` call
    pub count: Measure,
    /// Tag key the views group by
    pub method: TagKey,
}

/// Define the latency and count measures and their per-method views.
///
/// Idempotent, so a config file declaring the same views is fine.
pub fn register_demo_views(telemetry: &Telemetry) -> Result<DemoMeasures> {
    let latency = telemetry.measures().define_float("latency", "Latency", "ms")?;
    let count = telemetry
        .measures()
        .define_integer("count", "Number of times", "1")?;
    let method = TagKey::new("method")?;

    telemetry.views().register_view(View::new(
        "example/latency",
        "The distribution of latencies",
        latency.clone(),
        Aggregation::distribution(LATENCY_BOUNDARIES.to_vec())?,
        vec![method.clone()],
    ))?;
    telemetry.views().register_view(View::new(
        "example/count",
        "The number of times doWork was invoked",
        count.clone(),
        Aggregation::Count,
        vec![method.clone()],
    ))?;

    Ok(DemoMeasures {
        latency,
        count,
        method,
    })
}

/// Run `iterations` traced and measured `doWork` calls under a `main` span.
pub async fn run_workload(telemetry: &Telemetry, iterations: u32, max_work_ms: u64) -> Result<()> {
    let measures = register_demo_views(telemetry)?;
    let tags = TagContext::empty().with(measures.method.clone(), TagValue::new("doWork")?)?;
    let tracer = telemetry.tracer();

    let mut cx = Context::new();
    let mut main = tracer.span_builder("main").start_scoped_span(&mut cx);
    tracing::info!(trace_id = %main.span_context().trace_id, "About to do some busy work...");

    for i in 0..iterations {
        let mut work = tracer
            .span_builder("doWork")
            .attribute("iteration", i.to_string())
            .start_scoped_span(&mut main);
        let started = Instant::now();

        let duration = simulated_work(max_work_ms);
        tracing::debug!(iteration = i, ?duration, "doing busy work");
        tokio::time::sleep(duration).await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        telemetry
            .recorder()
            .new_measure_map()
            .put(&measures.count, 1)
            .put(&measures.latency, elapsed_ms)
            .record(&tags);
        work.set_status(SpanStatus::Ok);
    }

    main.set_attribute("iterations", iterations.to_string());
    Ok(())
}

fn simulated_work(max_work_ms: u64) -> Duration {
    if max_work_ms == 0 {
        return Duration::ZERO;
    }
    let ms = rand::thread_rng().gen_range(max_work_ms / 10..=max_work_ms);
    Duration::from_millis(ms)
}
