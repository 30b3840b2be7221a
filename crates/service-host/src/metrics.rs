// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics module
//!
//! Provides global metrics using the default Prometheus registry via macros and
//! an Axum-compatible metrics handler.

use std::{sync::LazyLock, time::Duration};

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, TextEncoder, register_histogram_vec,
    register_int_counter_vec, register_int_gauge,
};
use tracing::error;

/// Total number of requests served, labeled by method and status
pub static REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "service_host_requests_total",
        "Total number of requests served, labeled by method and status",
        &["method", "status"]
    )
    .expect("Failed to create service_host_requests_total counter vec")
});

/// Histogram for request durations in seconds
pub static REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "service_host_request_duration_seconds",
        "Request durations in seconds",
        &["method"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to create request duration histogram")
});

/// Connections currently open
pub static OPEN_CONNECTIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "service_host_open_connections",
        "Number of currently open connections"
    )
    .expect("Failed to create open connections gauge")
});

/// Record one served request
pub fn record_request(method: &str, status: StatusCode, duration: Duration) {
    REQUESTS_TOTAL
        .with_label_values(&[method, status.as_str()])
        .inc();
    REQUEST_DURATION
        .with_label_values(&[method])
        .observe(duration.as_secs_f64());
}

/// Axum handler that exports metrics in Prometheus text format
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
