//! Prometheus metrics middleware.
//!
//! Provides HTTP request/response metrics collection and export. Workflow
//! counters (`permit_requests_*`, `roster_sync_total`) are recorded by the
//! domain crate; database timings by the persistence crate.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Records `http_requests_total{method, route, audience, status}` and
/// `http_request_duration_seconds{method, route, audience}`.
///
/// Paths no route matched share the `unmatched` label.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = method_to_str(req.method());
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
    let audience = audience(&route);

    let response = next.run(req).await;

    counter!(
        "http_requests_total",
        "method" => method,
        "route" => route.clone(),
        "audience" => audience,
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "route" => route,
        "audience" => audience
    )
    .record(start.elapsed().as_secs_f64());

    response
}

const UNMATCHED_ROUTE: &str = "unmatched";

/// Which side of the desk a route serves.
fn audience(route: &str) -> &'static str {
    if route.starts_with("/api/v1/admin/") {
        "admin"
    } else if route.starts_with("/api/v1/") {
        "student"
    } else {
        "public"
    }
}

fn method_to_str(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        _ => "OTHER",
    }
}

/// Handler for /metrics endpoint that returns Prometheus text format.
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Installs the global Prometheus recorder. A second call is a no-op.
pub fn init_metrics() -> Result<(), BuildError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(&[0.001, 0.005, 0.01, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0])?
        .install_recorder()?;

    let _ = PROMETHEUS_HANDLE.set(handle);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_labels() {
        assert_eq!(method_to_str(&Method::GET), "GET");
        assert_eq!(method_to_str(&Method::DELETE), "DELETE");
        assert_eq!(method_to_str(&Method::PATCH), "OTHER");
    }

    #[test]
    fn test_audience() {
        assert_eq!(audience("/api/v1/admin/requests/:id/approve"), "admin");
        assert_eq!(audience("/api/v1/requests/:id/permit"), "student");
        assert_eq!(audience("/api/health/live"), "public");
        assert_eq!(audience(UNMATCHED_ROUTE), "public");
    }

    #[tokio::test]
    async fn test_handler_before_init_is_unavailable() {
        if PROMETHEUS_HANDLE.get().is_none() {
            let response = metrics_handler().await.into_response();
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }
}
