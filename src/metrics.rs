use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, HistogramOpts, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chat_service_http_requests_total",
        "Total HTTP requests handled by chat-service",
        &["method", "path", "status"]
    )
    .expect("failed to register chat_service_http_requests_total")
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "chat_service_http_request_duration_seconds",
            "HTTP request latencies for chat-service",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
        ]),
        &["method", "path", "status"],
    )
    .expect("failed to create chat_service_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register chat_service_http_request_duration_seconds");
    histogram
});

static SWEEP_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chat_service_sweep_runs_total",
        "Expiry sweep cycles by outcome",
        &["status"]
    )
    .expect("failed to register chat_service_sweep_runs_total")
});

static MESSAGES_DELETED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chat_service_messages_deleted_total",
        "Messages tombstoned, by deletion reason",
        &["reason"]
    )
    .expect("failed to register chat_service_messages_deleted_total")
});

static MEDIA_DELETE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "chat_service_media_delete_failures_total",
        "Media blob deletions that failed and were left behind"
    )
    .expect("failed to register chat_service_media_delete_failures_total")
});

static DELETION_JOBS_SCHEDULED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "chat_service_deletion_jobs_scheduled_total",
        "Grace-delay deletion jobs queued after full delivery"
    )
    .expect("failed to register chat_service_deletion_jobs_scheduled_total")
});

pub fn record_sweep_run(status: &str) {
    SWEEP_RUNS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_message_deleted(reason: &str) {
    MESSAGES_DELETED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_media_delete_failure() {
    MEDIA_DELETE_FAILURES_TOTAL.inc();
}

pub fn record_deletion_scheduled() {
    DELETION_JOBS_SCHEDULED_TOTAL.inc();
}

pub async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    let method = req.method().as_str().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let start = Instant::now();

    let response = next.run(req).await;
    let status = response.status().as_u16().to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path, &status])
        .observe(start.elapsed().as_secs_f64());

    response
}

pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }

    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(Body::from(buffer))
    {
        Ok(response) => response,
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
