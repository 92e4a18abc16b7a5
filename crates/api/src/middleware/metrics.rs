//! Prometheus metrics.
//!
//! HTTP traffic is recorded by [`metrics_middleware`]; the ingestion pipeline
//! reports through the `record_*` helpers from the sync and device handlers.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use domain::services::{RegistrationPath, SyncOutcome};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const DURATION_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0];

/// Installs the global Prometheus recorder. Later calls are no-ops, so
/// several apps may be built in one process.
pub fn init_metrics() {
    if PROMETHEUS_HANDLE.get().is_some() {
        return;
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(DURATION_BUCKETS)
        .and_then(|builder| builder.install_recorder());

    match handle {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);
        }
        Err(err) => tracing::warn!(error = %err, "Prometheus recorder not installed"),
    }
}

/// Records `http_requests_total{method,path,status}` and
/// `http_request_duration_seconds{method,path}`.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = method_label(req.method());
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    counter!(
        "http_requests_total",
        "method" => method,
        "path" => path.clone(),
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(start.elapsed().as_secs_f64());

    response
}

fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::PATCH => "PATCH",
        Method::OPTIONS => "OPTIONS",
        _ => "OTHER",
    }
}

pub fn record_device_registration(path: RegistrationPath) {
    counter!("device_registrations_total", "path" => path.as_str()).increment(1);
}

/// Pipeline counters for one completed sync.
pub fn record_sync(outcome: &SyncOutcome) {
    counter!("events_ingested_total").increment(outcome.processed);

    for reason in &outcome.rejected {
        counter!("events_rejected_total", "reason" => *reason).increment(1);
    }

    if outcome.duplicates_in_batch > 0 {
        counter!("events_duplicate_total", "stage" => "batch")
            .increment(outcome.duplicates_in_batch as u64);
    }
    if outcome.duplicates_in_store > 0 {
        counter!("events_duplicate_total", "stage" => "store")
            .increment(outcome.duplicates_in_store as u64);
    }

    if let Some(path) = outcome.registration {
        record_device_registration(path);
    }
}

pub fn record_events_cleaned(count: usize) {
    counter!("events_cleaned_total").increment(count as u64);
}

/// `GET /metrics` in the Prometheus text format.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized",
        )
            .into_response(),
    }
}
