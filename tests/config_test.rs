//! Configuration system tests.

use clap::Parser;
use pretty_assertions::assert_eq;
use std::io::Write;
use std::time::Duration;
use vigil_lib::cli::Cli;
use vigil_lib::core::{
    AggregationConfig, Config, ConfigBuilder, LogLevel, SamplingPolicy, VigilError,
};
use vigil_lib::stats::MeasureKind;

const DEMO_YAML: &str = r#"
sampling:
  policy: probability
  rate: 0.25
export:
  buffer_capacity: 256
  batch_size: 32
  flush_interval: 100ms
  shutdown_deadline: 3s
metrics:
  measures:
    - { name: latency, description: Latency, unit: ms, kind: float }
    - { name: count, description: Number of times, unit: "1", kind: integer }
  views:
    - name: example/latency
      description: The distribution of latencies
      measure: latency
      aggregation:
        type: distribution
        boundaries: [0, 25, 50, 75, 100, 200, 400, 600, 800, 1000, 2000, 4000, 6000]
      dimensions: [method]
    - name: example/count
      description: The number of times doWork was invoked
      measure: count
      aggregation: { type: count }
      dimensions: [method]
logging:
  level: debug
"#;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.sampling.policy, SamplingPolicy::Always);
    assert_eq!(config.export.buffer_capacity, 2048);
    assert_eq!(config.export.shutdown_deadline, Duration::from_secs(10));
    assert_eq!(config.logging.level, LogLevel::Info);
}

#[test]
fn test_yaml_config() {
    let config = ConfigBuilder::new()
        .from_yaml(DEMO_YAML)
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(config.sampling.policy, SamplingPolicy::Probability);
    assert_eq!(config.sampling.rate, 0.25);
    assert_eq!(config.export.flush_interval, Duration::from_millis(100));
    assert_eq!(config.metrics.measures.len(), 2);
    assert_eq!(config.metrics.measures[0].kind, MeasureKind::Float);
    assert_eq!(config.metrics.views[0].dimensions, vec!["method".to_string()]);
    match &config.metrics.views[0].aggregation {
        AggregationConfig::Distribution { boundaries } => assert_eq!(boundaries.len(), 13),
        other => panic!("unexpected aggregation {:?}", other),
    }
}

#[test]
fn test_invalid_yaml_is_a_config_error() {
    let err = ConfigBuilder::new().from_yaml("export: [1, 2").unwrap_err();
    assert!(matches!(err, VigilError::Config(_)));
    assert!(err.is_configuration());
}

#[test]
fn test_view_with_bad_dimension_rejected() {
    let yaml = r#"
metrics:
  measures: [{ name: m, kind: integer }]
  views: [{ name: v, measure: m, aggregation: { type: sum }, dimensions: [""] }]
"#;
    let result = ConfigBuilder::new().from_yaml(yaml).unwrap().build();
    assert!(matches!(result, Err(VigilError::InvalidTag(_))));
}

#[tokio::test]
async fn test_load_config_from_file_with_cli_override() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(DEMO_YAML.as_bytes()).unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let cli = Cli::parse_from(["vigil", "--config", path.as_str(), "--sample-rate", "0.75"]);
    let config = cli.load_config().await.unwrap();

    assert_eq!(config.sampling.policy, SamplingPolicy::Probability);
    assert_eq!(config.sampling.rate, 0.75);
    assert_eq!(config.export.buffer_capacity, 256);
    assert_eq!(config.metrics.views.len(), 2);
}

#[tokio::test]
async fn test_load_config_rejects_invalid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vigil.yaml");
    std::fs::write(&path, "export:\n  batch_size: 0\n").unwrap();

    let cli = Cli::parse_from(["vigil", "--config", path.to_str().unwrap()]);
    assert!(matches!(cli.load_config().await, Err(VigilError::Config(_))));
}
