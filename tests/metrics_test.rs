//! End-to-end tests of measure recording, view aggregation and exposition.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use vigil_lib::cli::LATENCY_BOUNDARIES;
use vigil_lib::core::VigilError;
use vigil_lib::stats::{
    Aggregation, AggregationData, MeasureMap, MeasureRegistry, MeasureValue, MetricsReader,
    StatsRecorder, View, ViewManager,
};
use vigil_lib::tags::{TagContext, TagKey};

struct Fixture {
    measures: Arc<MeasureRegistry>,
    views: Arc<ViewManager>,
    recorder: StatsRecorder,
}

fn fixture() -> Fixture {
    let measures = Arc::new(MeasureRegistry::new());
    let views = Arc::new(ViewManager::new(Arc::clone(&measures)));
    Fixture {
        recorder: StatsRecorder::new(Arc::clone(&views)),
        measures,
        views,
    }
}

fn key(name: &str) -> TagKey {
    TagKey::new(name).unwrap()
}

fn tags(pairs: &[(&str, &str)]) -> TagContext {
    pairs
        .iter()
        .fold(TagContext::builder(), |b, (k, v)| b.put(k, v))
        .build()
        .unwrap()
}

#[test]
fn test_demo_scenario_latency_bucket_and_count() {
    let f = fixture();
    let latency = f.measures.define_float("latency", "Latency", "ms").unwrap();
    let count = f.measures.define_integer("count", "Number of times", "1").unwrap();
    f.views
        .register_view(View::new(
            "example/latency",
            "The distribution of latencies",
            latency.clone(),
            Aggregation::distribution(LATENCY_BOUNDARIES.to_vec()).unwrap(),
            vec![key("method")],
        ))
        .unwrap();
    f.views
        .register_view(View::new(
            "example/count",
            "The number of times doWork was invoked",
            count.clone(),
            Aggregation::Count,
            vec![key("method")],
        ))
        .unwrap();

    f.recorder
        .new_measure_map()
        .put(&count, 1)
        .put(&latency, 150.0)
        .record(&tags(&[("method", "doWork")]));

    let snapshot = f.views.view_snapshot("example/latency").unwrap();
    let Some(AggregationData::Distribution(dist)) = snapshot.row(&[Some("doWork")]) else {
        panic!("missing doWork row");
    };
    let mut expected = vec![0u64; 14];
    expected[5] = 1;
    assert_eq!(dist.bucket_counts(), expected.as_slice());
    assert_eq!(dist.mean(), 150.0);
    assert_eq!(dist.min(), Some(150.0));

    let counts = f.views.view_snapshot("example/count").unwrap();
    assert_eq!(counts.row(&[Some("doWork")]), Some(&AggregationData::Count(1)));
}

#[test]
fn test_projection_ignores_extra_tags_and_fills_missing() {
    let f = fixture();
    let bytes = f.measures.define_integer("bytes", "Bytes sent", "By").unwrap();
    f.views
        .register_view(View::new(
            "bytes_by_method",
            "",
            bytes.clone(),
            Aggregation::Sum,
            vec![key("method")],
        ))
        .unwrap();

    let map = MeasureMap::new().put(&bytes, 10);
    f.recorder.record(&map, &tags(&[("method", "get"), ("host", "a")]));
    f.recorder.record(&map, &tags(&[("host", "b"), ("method", "get")]));
    f.recorder.record(&map, &tags(&[("host", "c")]));

    let snapshot = f.views.view_snapshot("bytes_by_method").unwrap();
    assert_eq!(snapshot.rows.len(), 2);
    // Rows are ordered with the missing value first
    assert_eq!(snapshot.rows[0].0, vec![None]);
    assert_eq!(snapshot.row(&[None]), Some(&AggregationData::Sum(10.0)));
    assert_eq!(snapshot.row(&[Some("get")]), Some(&AggregationData::Sum(20.0)));
}

#[test]
fn test_view_registration_rules() {
    let f = fixture();
    let latency = f.measures.define_float("latency", "Latency", "ms").unwrap();
    let view = || {
        View::new(
            "latency_by_method",
            "first",
            latency.clone(),
            Aggregation::Count,
            vec![key("method")],
        )
    };

    f.views.register_view(view()).unwrap();
    // Identical definition is a no-op
    f.views.register_view(view()).unwrap();
    assert_eq!(f.views.view_names(), vec!["latency_by_method".to_string()]);

    let different_dims = View::new(
        "latency_by_method",
        "first",
        latency.clone(),
        Aggregation::Count,
        vec![key("host")],
    );
    assert!(matches!(
        f.views.register_view(different_dims),
        Err(VigilError::ViewConflict(_))
    ));

    let unknown = View::new(
        "ghost",
        "",
        MeasureRegistry::new().define_float("ghost", "", "").unwrap(),
        Aggregation::Sum,
        vec![],
    );
    assert!(matches!(f.views.register_view(unknown), Err(VigilError::UnknownMeasure(_))));
}

#[test]
fn test_measure_redefinition() {
    let registry = MeasureRegistry::new();
    let first = registry.define_float("latency", "Latency", "ms").unwrap();
    let again = registry.define_float("latency", "Other text", "s").unwrap();
    assert_eq!(first, again);
    assert!(matches!(
        registry.define_integer("latency", "", ""),
        Err(VigilError::DuplicateMeasure { .. })
    ));
}

#[test]
fn test_recording_without_views_is_ignored() {
    let f = fixture();
    let orphan = f.measures.define_float("orphan", "", "").unwrap();
    f.recorder
        .new_measure_map()
        .put(&orphan, 1.0)
        .put(&orphan, f64::NAN)
        .record(&TagContext::empty());
    assert!(f.views.snapshots().is_empty());
}

#[test]
fn test_last_value_and_integer_coercion() {
    let f = fixture();
    let queue = f.measures.define_integer("queue_depth", "", "1").unwrap();
    f.views
        .register_view(View::new("queue_depth", "", queue.clone(), Aggregation::LastValue, vec![]))
        .unwrap();

    f.recorder.record(&MeasureMap::new().put(&queue, 3), &TagContext::empty());
    f.recorder.record(&MeasureMap::new().put(&queue, 7.9), &TagContext::empty());

    let snapshot = f.views.view_snapshot("queue_depth").unwrap();
    assert_eq!(
        snapshot.row(&[]),
        Some(&AggregationData::LastValue(Some(MeasureValue::Integer(7))))
    );
}

#[test]
fn test_concurrent_recordings_are_not_lost() {
    let f = fixture();
    let hits = f.measures.define_integer("hits", "", "1").unwrap();
    let size = f.measures.define_float("size", "", "By").unwrap();
    f.views
        .register_view(View::new("hits", "", hits.clone(), Aggregation::Count, vec![key("worker")]))
        .unwrap();
    f.views
        .register_view(View::new(
            "size",
            "",
            size.clone(),
            Aggregation::distribution(vec![10.0, 100.0]).unwrap(),
            vec![],
        ))
        .unwrap();

    const THREADS: usize = 8;
    const PER_THREAD: usize = 2_000;
    let recorder = Arc::new(f.recorder);
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let recorder = Arc::clone(&recorder);
            let hits = hits.clone();
            let size = size.clone();
            thread::spawn(move || {
                let worker = if t % 2 == 0 { "even" } else { "odd" };
                let tags = TagContext::builder().put("worker", worker).build().unwrap();
                for i in 0..PER_THREAD {
                    recorder
                        .new_measure_map()
                        .put(&hits, 1)
                        .put(&size, (i % 200) as f64)
                        .record(&tags);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let hits = f.views.view_snapshot("hits").unwrap();
    let per_worker = (THREADS / 2 * PER_THREAD) as u64;
    assert_eq!(hits.row(&[Some("even")]), Some(&AggregationData::Count(per_worker)));
    assert_eq!(hits.row(&[Some("odd")]), Some(&AggregationData::Count(per_worker)));

    let size = f.views.view_snapshot("size").unwrap();
    let Some(AggregationData::Distribution(dist)) = size.row(&[]) else {
        panic!("missing size row");
    };
    let total = (THREADS * PER_THREAD) as u64;
    assert_eq!(dist.count(), total);
    assert_eq!(dist.bucket_counts().iter().sum::<u64>(), total);
}

#[test]
fn test_prometheus_exposition_of_registered_views() {
    let f = fixture();
    let requests = f.measures.define_integer("requests", "Requests", "1").unwrap();
    f.views
        .register_view(View::new(
            "http/requests",
            "Requests served",
            requests.clone(),
            Aggregation::Sum,
            vec![key("code")],
        ))
        .unwrap();
    f.recorder.record(&MeasureMap::new().put(&requests, 2), &tags(&[("code", "200")]));

    let reader: Arc<dyn MetricsReader> = Arc::clone(&f.views) as Arc<dyn MetricsReader>;
    let text = reader.render_prometheus();
    assert_eq!(
        text,
        "# HELP http_requests Requests served\n\
         # TYPE http_requests counter\n\
         http_requests{code=\"200\"} 2\n"
    );
}
