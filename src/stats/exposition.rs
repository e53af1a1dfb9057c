//! Read-only access to aggregated views and Prometheus text rendering.
//!
//! The HTTP listener that serves a scrape lives outside this crate; it only
//! needs a [`MetricsReader`] and, if it speaks Prometheus, [`render_prometheus`].

use crate::stats::aggregation::{Aggregation, AggregationData};
use crate::stats::view::{ViewManager, ViewSnapshot};
use std::borrow::Cow;

/// Publish-on-demand contract consumed by exposition endpoints.
///
/// Implementations must never mutate aggregation state.
pub trait MetricsReader: Send + Sync {
    /// Snapshot of one view, `None` if it is not registered
    fn view_snapshot(&self, view_name: &str) -> Option<ViewSnapshot>;

    /// Snapshots of every registered view, ordered by name
    fn snapshots(&self) -> Vec<ViewSnapshot>;

    /// All views in the Prometheus text exposition format
    fn render_prometheus(&self) -> String {
        render_prometheus(&self.snapshots())
    }
}

impl MetricsReader for ViewManager {
    fn view_snapshot(&self, view_name: &str) -> Option<ViewSnapshot> {
        self.snapshot(view_name)
    }

    fn snapshots(&self) -> Vec<ViewSnapshot> {
        self.snapshot_all()
    }
}

/// Render snapshots in the Prometheus text format (version 0.0.4).
///
/// Count and Sum become counters, LastValue a gauge and Distribution a
/// histogram with cumulative `le` buckets. Missing dimensions render as an
/// empty label value.
///
/// Buckets are half-open `[b_i, b_{i+1})` while Prometheus reads `le` as
/// `<= b`, so a sample exactly on a boundary is counted in the next bucket up.
pub fn render_prometheus(snapshots: &[ViewSnapshot]) -> String {
    let mut out = String::new();

    for snapshot in snapshots {
        let name = sanitize_metric_name(&snapshot.name);
        let metric_type = match snapshot.aggregation {
            Aggregation::Count | Aggregation::Sum => "counter",
            Aggregation::LastValue => "gauge",
            Aggregation::Distribution(_) => "histogram",
        };
        if !snapshot.description.is_empty() {
            out.push_str(&format!("# HELP {} {}\n", name, escape_help(&snapshot.description)));
        }
        out.push_str(&format!("# TYPE {} {}\n", name, metric_type));

        for (key, data) in &snapshot.rows {
            let labels: Vec<String> = snapshot
                .dimensions
                .iter()
                .zip(key)
                .map(|(k, v)| {
                    format!(
                        "{}=\"{}\"",
                        sanitize_metric_name(k.as_str()),
                        escape_label_value(v.as_ref().map_or("", |v| v.as_str()))
                    )
                })
                .collect();

            match data {
                AggregationData::Count(total) => {
                    out.push_str(&format!("{}{} {}\n", name, braces(&labels), total));
                },
                AggregationData::Sum(total) => {
                    out.push_str(&format!("{}{} {}\n", name, braces(&labels), total));
                },
                AggregationData::LastValue(value) => {
                    if let Some(value) = value {
                        out.push_str(&format!("{}{} {}\n", name, braces(&labels), value));
                    }
                },
                AggregationData::Distribution(dist) => {
                    let mut cumulative = 0u64;
                    let bounds = dist.boundaries().as_slice();
                    for (idx, count) in dist.bucket_counts().iter().enumerate() {
                        cumulative += count;
                        let le = bounds
                            .get(idx)
                            .map_or_else(|| "+Inf".to_string(), |b| b.to_string());
                        let mut bucket_labels = labels.clone();
                        bucket_labels.push(format!("le=\"{}\"", le));
                        out.push_str(&format!(
                            "{}_bucket{} {}\n",
                            name,
                            braces(&bucket_labels),
                            cumulative
                        ));
                    }
                    out.push_str(&format!("{}_sum{} {}\n", name, braces(&labels), dist.sum()));
                    out.push_str(&format!("{}_count{} {}\n", name, braces(&labels), dist.count()));
                },
            }
        }
    }

    out
}

fn braces(labels: &[String]) -> String {
    if labels.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", labels.join(","))
    }
}

fn sanitize_metric_name(name: &str) -> Cow<'_, str> {
    let valid = |(i, ch): (usize, char)| match ch {
        'a'..='z' | 'A'..='Z' | '_' | ':' => true,
        '0'..='9' => i > 0,
        _ => false,
    };
    if name.chars().enumerate().all(valid) {
        return Cow::Borrowed(name);
    }
    let mut sanitized = String::with_capacity(name.len() + 1);
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.push('_');
    }
    for ch in name.chars() {
        match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | ':' => sanitized.push(ch),
            _ => sanitized.push('_'),
        }
    }
    Cow::Owned(sanitized)
}

fn escape_label_value(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '"', '\n']) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n"),
    )
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{MeasureMap, MeasureRegistry, View};
    use crate::tags::{TagContext, TagKey};
    use std::sync::Arc;

    #[test]
    fn test_sanitize_metric_name() {
        assert_eq!(sanitize_metric_name("example/latency"), "example_latency");
        assert_eq!(sanitize_metric_name("ok_name"), "ok_name");
        assert_eq!(sanitize_metric_name("9lives"), "_9lives");
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("plain"), "plain");
        assert_eq!(escape_label_value("a\"b\\c"), "a\\\"b\\\\c");
    }

    #[test]
    fn test_render_histogram_and_counter() {
        let measures = Arc::new(MeasureRegistry::new());
        let latency = measures.define_float("latency", "Latency", "ms").unwrap();
        let count = measures.define_integer("count", "Number of times", "1").unwrap();
        let views = ViewManager::new(Arc::clone(&measures));
        let method = TagKey::new("method").unwrap();
        views
            .register_view(View::new(
                "example/latency",
                "The distribution of latencies",
                latency.clone(),
                Aggregation::distribution(vec![100.0, 200.0]).unwrap(),
                vec![method.clone()],
            ))
            .unwrap();
        views
            .register_view(View::new(
                "example/count",
                "The number of times doWork was invoked",
                count.clone(),
                Aggregation::Count,
                vec![method],
            ))
            .unwrap();

        let tags = TagContext::builder().put("method", "doWork").build().unwrap();
        views.record(&MeasureMap::new().put(&latency, 150.0).put(&count, 1), &tags);
        views.record(&MeasureMap::new().put(&latency, 50.0).put(&count, 1), &tags);

        let text = views.render_prometheus();
        assert!(text.contains("# TYPE example_count counter\n"));
        assert!(text.contains("example_count{method=\"doWork\"} 2\n"));
        assert!(text.contains("# TYPE example_latency histogram\n"));
        assert!(text.contains("example_latency_bucket{method=\"doWork\",le=\"100\"} 1\n"));
        assert!(text.contains("example_latency_bucket{method=\"doWork\",le=\"200\"} 2\n"));
        assert!(text.contains("example_latency_bucket{method=\"doWork\",le=\"+Inf\"} 2\n"));
        assert!(text.contains("example_latency_sum{method=\"doWork\"} 200\n"));
        assert!(text.contains("example_latency_count{method=\"doWork\"} 2\n"));
    }

    #[test]
    fn test_boundary_sample_counts_in_next_bucket() {
        let measures = Arc::new(MeasureRegistry::new());
        let latency = measures.define_float("latency", "", "ms").unwrap();
        let views = ViewManager::new(Arc::clone(&measures));
        views
            .register_view(View::new(
                "edge",
                "",
                latency.clone(),
                Aggregation::distribution(vec![100.0]).unwrap(),
                vec![],
            ))
            .unwrap();
        views.record(&MeasureMap::new().put(&latency, 100.0), &TagContext::empty());

        let text = views.render_prometheus();
        assert!(text.contains("edge_bucket{le=\"100\"} 0\n"));
        assert!(text.contains("edge_bucket{le=\"+Inf\"} 1\n"));
    }
}
