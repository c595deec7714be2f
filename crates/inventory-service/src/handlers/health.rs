//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - checks the signing key set can be loaded

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Liveness probe handler.
///
/// Does NOT check any dependencies - failure means the process is hung.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 200 when a fresh signing key set is available, loading or
/// refreshing it if needed. Returns 503 when the key set cannot be fetched,
/// which is exactly when admissions fail with `keys_unavailable`.
///
/// ## Security
///
/// Error messages are generic. The fetch error is logged server-side.
#[tracing::instrument(skip_all, name = "inventory.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.gate.jwks_client().ensure_loaded().await {
        Ok(key_state) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                signing_keys: key_state.as_str(),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(target: "inventory.health", error = %e, "Readiness check failed: signing keys unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    signing_keys: state.gate.jwks_client().state().await.as_str(),
                    error: Some("Service dependencies unavailable"),
                }),
            )
        }
    }
}
