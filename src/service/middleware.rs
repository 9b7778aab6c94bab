//! Service middleware for request metrics.
//!
//! ## Metrics Exposed
//!
//! - `request` events: path pattern, method, status, latency
//! - `update` events: see [`crate::updater::record_update_metrics`]
//!
//! Both are log events under the `topology_history::metrics` target, to be
//! aggregated from logs.

use std::sync::OnceLock;
use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use regex_lite::Regex;
use tracing::info;

/// Metrics middleware that records request counts and latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "topology_history::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

fn uuid_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}").ok())
        .as_ref()
}

/// Normalize path for metrics to avoid high cardinality.
///
/// Topology UUIDs become `:id`.
pub fn normalize_path(path: &str) -> String {
    match uuid_pattern() {
        Some(pattern) => pattern.replace_all(path, ":id").to_string(),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_replaces_uuid() {
        let path = "/api/topology/550e8400-e29b-41d4-a716-446655440000/history";
        assert_eq!(normalize_path(path), "/api/topology/:id/history");
    }

    #[test]
    fn test_normalize_path_preserves_regular_path() {
        assert_eq!(normalize_path("/health/ready"), "/health/ready");
    }
}
