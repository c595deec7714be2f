//! Bearer credential extraction.
//!
//! Turns a raw `Authorization` header value into a [`BearerToken`]. The
//! accepted shape is exactly `Bearer <token>`: a case-insensitive scheme, one
//! ASCII space, and a single non-empty token with no whitespace. Anything
//! else is a header-shape rejection, distinct from cryptographic failure.

use crate::errors::{AdmissionError, MalformedReason};
use axum::http::HeaderValue;
use secrecy::{ExposeSecret, SecretString};

/// Opaque compact token taken from an `Authorization: Bearer` header.
///
/// The token grants access to whoever holds it, so `Debug` is redacted.
#[derive(Debug, Clone)]
pub struct BearerToken(SecretString);

impl BearerToken {
    /// Wrap a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// The raw token, for signature verification only.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Extract a bearer token from an `Authorization` header value.
///
/// # Errors
///
/// - `MissingHeader` - header absent or empty
/// - `MalformedHeader` - wrong scheme, no token, extra segments or whitespace
pub fn extract_token(header_value: Option<&str>) -> Result<BearerToken, AdmissionError> {
    let value = match header_value {
        Some(value) if !value.is_empty() => value,
        _ => {
            tracing::debug!(target: "inventory.auth.bearer", "Missing Authorization header");
            return Err(AdmissionError::MissingHeader);
        }
    };

    let (scheme, rest) = match value.split_once(' ') {
        Some((scheme, rest)) => (scheme, Some(rest)),
        None => (value, None),
    };

    if !scheme.eq_ignore_ascii_case("bearer") {
        tracing::debug!(target: "inventory.auth.bearer", "Authorization scheme is not Bearer");
        return Err(AdmissionError::MalformedHeader(MalformedReason::WrongScheme));
    }

    let token = match rest {
        None | Some("") => {
            tracing::debug!(target: "inventory.auth.bearer", "Bearer scheme without token");
            return Err(AdmissionError::MalformedHeader(MalformedReason::MissingToken));
        }
        Some(token) => token,
    };

    if token.chars().any(char::is_whitespace) {
        tracing::debug!(target: "inventory.auth.bearer", "Authorization header has extra segments");
        return Err(AdmissionError::MalformedHeader(MalformedReason::ExtraSegments));
    }

    Ok(BearerToken::new(token))
}

/// Extract a bearer token from an HTTP header, if present.
///
/// A header that is present but not visible ASCII is malformed, not missing.
///
/// # Errors
///
/// Same as [`extract_token`], plus `MalformedHeader` for non-ASCII bytes.
pub fn extract_from_header(header: Option<&HeaderValue>) -> Result<BearerToken, AdmissionError> {
    match header {
        None => extract_token(None),
        Some(value) => {
            let value = value.to_str().map_err(|_| {
                tracing::debug!(target: "inventory.auth.bearer", "Authorization header is not visible ASCII");
                AdmissionError::MalformedHeader(MalformedReason::InvalidEncoding)
            })?;
            extract_token(Some(value))
        }
    }
}
