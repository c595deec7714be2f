//! Authentication middleware for protected routes.
//!
//! Extracts the bearer token from the `Authorization` header, runs it through
//! the admission gate, and injects the admitted claims into request
//! extensions. Rejections are rendered by `AdmissionError`'s `IntoResponse`.

use crate::auth::{extract_from_header, TokenAdmissionGate};
use crate::errors::AdmissionError;
use crate::observability::metrics::record_admission;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Admission gate with its JWKS cache.
    pub gate: Arc<TokenAdmissionGate>,
}

/// Admission middleware.
///
/// # Response
///
/// - Returns 401 if the header is missing or malformed, or the token is rejected
/// - Returns 503 if the signing keys cannot be fetched
/// - Continues to next handler with `Claims` in extensions if admitted
#[instrument(skip_all, name = "inventory.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AdmissionError> {
    let start = Instant::now();

    let result = match extract_from_header(req.headers().get(header::AUTHORIZATION)) {
        Ok(token) => state.gate.admit(&token).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(claims) => {
            record_admission("admitted", None, start.elapsed());
            req.extensions_mut().insert(claims);
            Ok(next.run(req).await)
        }
        Err(e) => {
            record_admission(e.outcome(), e.reason(), start.elapsed());
            tracing::debug!(target: "inventory.middleware.auth", outcome = e.outcome(), "Request not admitted");
            Err(e)
        }
    }
}
