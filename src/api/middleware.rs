/// HTTP middleware
use crate::metrics;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Record request counts and latencies
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    metrics::record_http_request(
        &method,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}
