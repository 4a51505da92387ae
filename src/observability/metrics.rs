//! HTTP metrics collection and Prometheus export

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Path served by the exporter; requests to it are not recorded
pub const METRICS_PATH: &str = "/prometheus-metrics";

/// Latency histogram buckets (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0];

/// Histogram for tracking latency distribution
#[derive(Debug)]
struct Histogram {
    buckets: Vec<(f64, AtomicU64)>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn new(buckets: &[f64]) -> Self {
        Self {
            buckets: buckets.iter().map(|&b| (b, AtomicU64::new(0))).collect(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, duration: Duration) {
        let secs = duration.as_secs_f64();
        self.sum_micros.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        // Cumulative: every bucket at or above the value is incremented
        for (bucket, counter) in &self.buckets {
            if secs <= *bucket {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn write_prometheus(&self, out: &mut String, name: &str, labels: &str) {
        for (bucket, counter) in &self.buckets {
            let _ = writeln!(
                out,
                "{}_bucket{{{},le=\"{}\"}} {}",
                name,
                labels,
                bucket,
                counter.load(Ordering::Relaxed)
            );
        }

        let count = self.count.load(Ordering::Relaxed);
        let sum = self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(out, "{}_bucket{{{},le=\"+Inf\"}} {}", name, labels, count);
        let _ = writeln!(out, "{}_sum{{{}}} {:.6}", name, labels, sum);
        let _ = writeln!(out, "{}_count{{{}}} {}", name, labels, count);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct RequestLabels {
    method: String,
    path: String,
    status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct RouteLabels {
    method: String,
    path: String,
}

/// Request counters and latency histograms keyed by route
#[derive(Debug, Default)]
pub struct HttpMetrics {
    requests: DashMap<RequestLabels, AtomicU64>,
    durations: DashMap<RouteLabels, Histogram>,
}

impl HttpMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed request
    pub fn record(&self, method: &str, path: &str, status: u16, elapsed: Duration) {
        self.requests
            .entry(RequestLabels {
                method: method.to_string(),
                path: path.to_string(),
                status,
            })
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);

        self.durations
            .entry(RouteLabels {
                method: method.to_string(),
                path: path.to_string(),
            })
            .or_insert_with(|| Histogram::new(LATENCY_BUCKETS))
            .observe(elapsed);
    }

    /// Requests counted for a label set
    pub fn request_count(&self, method: &str, path: &str, status: u16) -> u64 {
        self.requests
            .get(&RequestLabels {
                method: method.to_string(),
                path: path.to_string(),
                status,
            })
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Total requests recorded across all labels
    pub fn total_requests(&self) -> u64 {
        self.requests.iter().map(|entry| entry.value().load(Ordering::Relaxed)).sum()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP http_requests_total Total number of HTTP requests\n");
        out.push_str("# TYPE http_requests_total counter\n");
        let mut requests: Vec<(RequestLabels, u64)> = self
            .requests
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        requests.sort();
        for (labels, count) in requests {
            let _ = writeln!(
                out,
                "http_requests_total{{method=\"{}\",path=\"{}\",status=\"{}\"}} {}",
                labels.method, labels.path, labels.status, count
            );
        }

        out.push('\n');
        out.push_str("# HELP http_request_duration_seconds Duration of HTTP requests in seconds\n");
        out.push_str("# TYPE http_request_duration_seconds histogram\n");
        let mut routes: Vec<RouteLabels> = self.durations.iter().map(|entry| entry.key().clone()).collect();
        routes.sort();
        for route in routes {
            if let Some(histogram) = self.durations.get(&route) {
                let labels = format!("method=\"{}\",path=\"{}\"", route.method, route.path);
                histogram.write_prometheus(&mut out, "http_request_duration_seconds", &labels);
            }
        }

        out
    }
}

/// Observability stage: records method, route template, status and latency
/// for every request except scrapes of the exporter itself
pub async fn track_metrics(
    State(metrics): State<Arc<HttpMetrics>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.uri().path() == METRICS_PATH {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let start = Instant::now();
    let response = next.run(req).await;
    metrics.record(&method, &path, response.status().as_u16(), start.elapsed());

    response
}
