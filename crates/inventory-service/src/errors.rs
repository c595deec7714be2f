//! Admission error types.
//!
//! Every rejection the admission gate can produce is a variant of
//! [`AdmissionError`]. The HTTP mapping (status, `code` slug, description)
//! lives here and nowhere else; it is part of the contract with existing
//! clients and must not drift.
//!
//! Causes of `InvalidSignatureOrClaims` are distinguished internally by
//! [`InvalidTokenReason`] for logs and metrics, but the client only ever sees
//! the generic description.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// `WWW-Authenticate` challenge attached to every 401.
const WWW_AUTHENTICATE_CHALLENGE: &str = "Bearer realm=\"inventory-api\", error=\"invalid_token\"";

/// Why an `Authorization` header value was not a usable bearer credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// First segment is not `Bearer`.
    WrongScheme,
    /// `Bearer` with no token after it.
    MissingToken,
    /// More than one segment after the scheme, or stray whitespace.
    ExtraSegments,
    /// Header bytes are not visible ASCII.
    InvalidEncoding,
}

impl MalformedReason {
    pub fn description(self) -> &'static str {
        match self {
            MalformedReason::WrongScheme | MalformedReason::InvalidEncoding => {
                "Authorization header must start with Bearer"
            }
            MalformedReason::MissingToken => "Token not found",
            MalformedReason::ExtraSegments => "Authorization header must be Bearer token",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MalformedReason::WrongScheme => "wrong_scheme",
            MalformedReason::MissingToken => "missing_token",
            MalformedReason::ExtraSegments => "extra_segments",
            MalformedReason::InvalidEncoding => "invalid_encoding",
        }
    }
}

/// Internal cause of an `InvalidSignatureOrClaims` rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTokenReason {
    /// Token too large, not a JWS, or header unparseable / missing `kid`.
    MalformedToken,
    /// Header `alg` is not in the allow-list.
    DisallowedAlgorithm,
    /// Key type or key `alg` does not match the header algorithm.
    KeyAlgorithmMismatch,
    /// Signature did not verify.
    BadSignature,
    /// Signature verified but the payload is not a valid claims set.
    MalformedClaims,
    /// `nbf` is in the future.
    NotYetValid,
    /// `iss` does not match the configured issuer.
    IssuerMismatch,
    /// `aud` does not contain the configured audience.
    AudienceMismatch,
}

impl InvalidTokenReason {
    pub fn as_str(self) -> &'static str {
        match self {
            InvalidTokenReason::MalformedToken => "malformed_token",
            InvalidTokenReason::DisallowedAlgorithm => "disallowed_algorithm",
            InvalidTokenReason::KeyAlgorithmMismatch => "key_algorithm_mismatch",
            InvalidTokenReason::BadSignature => "bad_signature",
            InvalidTokenReason::MalformedClaims => "malformed_claims",
            InvalidTokenReason::NotYetValid => "not_yet_valid",
            InvalidTokenReason::IssuerMismatch => "issuer_mismatch",
            InvalidTokenReason::AudienceMismatch => "audience_mismatch",
        }
    }
}

/// Rejection produced by the admission gate.
///
/// Maps to HTTP as follows:
/// - MissingHeader: 401 `authorization_header_missing`
/// - MalformedHeader, UnknownSigningKey, InvalidSignatureOrClaims: 401 `invalid_header`
/// - ExpiredToken: 401 `token_expired`
/// - KeySetUnavailable: 503 `keys_unavailable`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("Authorization header is missing")]
    MissingHeader,

    #[error("Authorization header is malformed: {}", .0.as_str())]
    MalformedHeader(MalformedReason),

    #[error("Signing key not found in key set")]
    UnknownSigningKey,

    #[error("Token is expired")]
    ExpiredToken,

    #[error("Token signature or claims are invalid: {}", .0.as_str())]
    InvalidSignatureOrClaims(InvalidTokenReason),

    #[error("Signing key set is unavailable")]
    KeySetUnavailable,
}

impl AdmissionError {
    /// HTTP status code for this rejection.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdmissionError::KeySetUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Machine-readable `code` returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AdmissionError::MissingHeader => "authorization_header_missing",
            AdmissionError::MalformedHeader(_)
            | AdmissionError::UnknownSigningKey
            | AdmissionError::InvalidSignatureOrClaims(_) => "invalid_header",
            AdmissionError::ExpiredToken => "token_expired",
            AdmissionError::KeySetUnavailable => "keys_unavailable",
        }
    }

    /// Human-readable `description` returned to clients.
    pub fn description(&self) -> &'static str {
        match self {
            AdmissionError::MissingHeader => "Authorization header is expected",
            AdmissionError::MalformedHeader(reason) => reason.description(),
            AdmissionError::UnknownSigningKey => "Unable to find appropriate key",
            AdmissionError::ExpiredToken => "Token is expired",
            AdmissionError::InvalidSignatureOrClaims(_) => "Unable to parse authentication token",
            AdmissionError::KeySetUnavailable => {
                "Unable to verify authentication token at this time"
            }
        }
    }

    /// Bounded label for metrics: the cause, without internal detail.
    pub fn outcome(&self) -> &'static str {
        match self {
            AdmissionError::MissingHeader => "missing_header",
            AdmissionError::MalformedHeader(_) => "malformed_header",
            AdmissionError::UnknownSigningKey => "unknown_signing_key",
            AdmissionError::ExpiredToken => "expired_token",
            AdmissionError::InvalidSignatureOrClaims(_) => "invalid_signature_or_claims",
            AdmissionError::KeySetUnavailable => "key_set_unavailable",
        }
    }

    /// Bounded label for metrics: the internal reason, if there is one.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            AdmissionError::MalformedHeader(reason) => Some(reason.as_str()),
            AdmissionError::InvalidSignatureOrClaims(reason) => Some(reason.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub description: &'static str,
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::warn!(target: "inventory.availability", error = %self, "Rejecting request: key set unavailable");
        } else {
            tracing::debug!(target: "inventory.auth", error = %self, "Rejecting request");
        }

        let body = ErrorResponse {
            code: self.code(),
            description: self.description(),
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(WWW_AUTHENTICATE_CHALLENGE),
            );
        }

        response
    }
}
