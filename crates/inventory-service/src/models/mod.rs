//! Response models for the inventory service.

use serde::Serialize;

/// Body of a successful inventory write.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryWriteResponse {
    pub message: &'static str,
    pub status: &'static str,
}

/// Body of inventory responses that carry only a message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Readiness check response.
///
/// Returned by the `/ready` endpoint (readiness probe).
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Service readiness status ("ready" or "not_ready").
    pub status: &'static str,

    /// Signing key set state ("fresh", "stale" or "unloaded").
    pub signing_keys: &'static str,

    /// Error message (generic, no infrastructure details).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}
