//! Inventory endpoint.
//!
//! Authentication has already run in the `require_auth` route layer when
//! these handlers are reached; dispatch is on method only.

use crate::auth::Claims;
use crate::models::{InventoryWriteResponse, MessageResponse};
use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};

/// Handler for `/api/v1/inventory`, any method.
///
/// - `POST` - 200 `{"message": "Inventory write succeeded", "status": "success"}`
/// - `GET` - 200 `{"message": "Inventory listing"}`
/// - anything else - 405 `{"message": "Method not allowed"}`
#[tracing::instrument(skip_all, name = "inventory.handlers.inventory", fields(method = %method))]
pub async fn inventory_handler(method: Method, Extension(claims): Extension<Claims>) -> Response {
    tracing::debug!(
        target: "inventory.handlers",
        scopes = claims.scopes().len(),
        "Handling inventory request"
    );

    match method {
        Method::POST => (
            StatusCode::OK,
            Json(InventoryWriteResponse {
                message: "Inventory write succeeded",
                status: "success",
            }),
        )
            .into_response(),
        Method::GET => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Inventory listing",
            }),
        )
            .into_response(),
        _ => (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(MessageResponse {
                message: "Method not allowed",
            }),
        )
            .into_response(),
    }
}
