/// Metrics and telemetry for the dispatch service
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Transport request lifecycle events
/// - Position reports by role
/// - Estimated match distances
/// - Background job execution

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // ========== Dispatch Metrics ==========

    /// Lifecycle events: submitted, accepted, finished, rejected
    pub static ref DISPATCH_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dispatch_requests_total",
        "Transport request lifecycle events",
        &["event"]
    )
    .unwrap();

    /// Position reports by actor role
    pub static ref POSITION_REPORTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "position_reports_total",
        "Total number of position reports",
        &["role"]
    )
    .unwrap();

    /// Estimated distance of each reported match, in kilometers
    pub static ref MATCH_DISTANCE_KM: Histogram = register_histogram!(
        "match_distance_km",
        "Approximate client to ambulance distance of estimated matches",
        vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0]
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method])
        .observe(duration);
}

/// Record a lifecycle event
pub fn record_dispatch_event(event: &str) {
    DISPATCH_REQUESTS_TOTAL.with_label_values(&[event]).inc();
}

/// Record a position report
pub fn record_position_report(role: &str) {
    POSITION_REPORTS_TOTAL.with_label_values(&[role]).inc();
}

/// Record the display distance of an estimated match
pub fn record_match_distance(km: f64) {
    MATCH_DISTANCE_KM.observe(km);
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
}
