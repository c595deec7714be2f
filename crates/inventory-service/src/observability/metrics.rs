//! Metrics definitions for the inventory service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `inventory_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: HTTP methods seen by the router
//! - `endpoint`: 5 values (known paths, everything else is `/other`)
//! - `outcome`: 7 values (`admitted` plus one per rejection cause)
//! - `reason`: bounded by `MalformedReason` and `InvalidTokenReason`
//! - `status`: 2 values for JWKS refreshes (success, error)
//!
//! # Budget Alignment
//!
//! Admission and JWKS buckets are dense below 800ms, the admission budget.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("inventory_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.400, 0.800, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Cache hits are sub-millisecond; misses include a JWKS fetch
        .set_buckets_for_metric(
            Matcher::Prefix("inventory_admission".to_string()),
            &[
                0.0005, 0.001, 0.002, 0.005, 0.010, 0.050, 0.100, 0.250, 0.500, 0.800, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set admission buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("inventory_jwks_refresh".to_string()),
            &[0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 0.800, 1.000],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `inventory_http_requests_total`, `inventory_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// Captures all responses, including rejections from the auth middleware
/// and framework-level 404s.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("inventory_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("inventory_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/api/v1/inventory" => "/api/v1/inventory",
        _ => "/other",
    }
}

// ============================================================================
// Admission Metrics
// ============================================================================

/// Record the outcome of one admission decision
///
/// Metric: `inventory_admissions_total`, `inventory_admission_duration_seconds`
/// Labels: `outcome`, `reason`
///
/// `reason` is `none` for admitted requests and for causes without detail.
pub fn record_admission(outcome: &'static str, reason: Option<&'static str>, duration: Duration) {
    histogram!("inventory_admission_duration_seconds",
        "outcome" => outcome
    )
    .record(duration.as_secs_f64());

    counter!("inventory_admissions_total",
        "outcome" => outcome,
        "reason" => reason.unwrap_or("none")
    )
    .increment(1);
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record a JWKS refresh attempt
///
/// Metric: `inventory_jwks_refresh_total`, `inventory_jwks_refresh_duration_seconds`
/// Labels: `status`, `error_type`
pub fn record_jwks_refresh(status: &'static str, error_type: Option<&'static str>, duration: Duration) {
    histogram!("inventory_jwks_refresh_duration_seconds",
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("inventory_jwks_refresh_total",
        "status" => status,
        "error_type" => error_type.unwrap_or("none")
    )
    .increment(1);
}

/// Set the number of signing keys in the current key set
///
/// Metric: `inventory_jwks_keys_cached`
#[allow(clippy::cast_precision_loss)] // Key counts are tiny
pub fn set_jwks_keys_cached(count: usize) {
    gauge!("inventory_jwks_keys_cached").set(count as f64);
}

// ============================================================================
// Tests
// ============================================================================
