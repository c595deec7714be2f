//! JWT utilities shared by the inventory services.
//!
//! This module provides the token-level checks that run before and after
//! signature verification:
//! - Size limits for DoS prevention
//! - Clock skew constants for time-window validation
//! - Unverified header parsing (`kid` and `alg`) for key lookup
//! - `exp` / `nbf` validation against an explicit evaluation time
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The header is parsed only to select a key; nothing in it is trusted
//! - `alg: none` and unknown algorithm names are rejected at parse time
//! - Error messages are generic to prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_unverified_header, validate_exp, DEFAULT_CLOCK_SKEW};
//!
//! let header = decode_unverified_header(token)?;
//! let key = key_set.get(&header.kid)?;
//! // ... verify signature with `header.alg` ...
//! validate_exp(claims.exp, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::Algorithm;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical access tokens issued by an identity provider are 700-1500 bytes
/// (RS256 signature plus standard claims). Anything larger than this is
/// rejected BEFORE base64 decoding or any cryptographic work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default clock skew tolerance applied to `exp` and `nbf`.
///
/// Zero: a token is expired the second after its `exp`.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::ZERO;

/// Maximum allowed clock skew tolerance (10 minutes).
///
/// Guards against a misconfiguration that would keep expired tokens usable
/// for an unbounded time.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during token-level JWT validation.
///
/// Display strings are intentionally generic. Detailed information is logged
/// at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWS compact structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token header is missing the `kid` field, or it is empty.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token header names `none` or an algorithm this library cannot verify.
    #[error("The access token is invalid or expired")]
    UnsupportedAlgorithm,

    /// Token `exp` is in the past beyond the clock skew tolerance.
    #[error("The access token is invalid or expired")]
    Expired,

    /// Token `nbf` is in the future beyond the clock skew tolerance.
    #[error("The access token is invalid or expired")]
    NotYetValid,
}

// =============================================================================
// Header
// =============================================================================

/// The parts of a JWT header needed to select and apply a verification key.
///
/// Produced WITHOUT signature verification. The `kid` is only ever used as a
/// lookup key into a trusted key set, and the `alg` is only ever compared
/// against an allow-list and the selected key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedHeader {
    /// Key ID selecting the signing key.
    pub kid: String,

    /// Declared signature algorithm.
    pub alg: Algorithm,
}

/// Parse the header of a compact JWS without verifying the signature.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - not three dot-separated parts, bad base64, bad JSON,
///   or `alg` missing / not a string
/// - `UnsupportedAlgorithm` - `alg` is `none` or an unknown name
/// - `MissingKid` - `kid` missing, not a string, or empty
pub fn decode_unverified_header(token: &str) -> Result<UnverifiedHeader, JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWS compact format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    let header_part = parts.first().ok_or(JwtValidationError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let alg_name = header
        .get("alg")
        .and_then(|v| v.as_str())
        .ok_or(JwtValidationError::MalformedToken)?;

    // `none` is not a variant of `Algorithm`, so it fails here along with
    // any name the verifier does not know.
    let alg = Algorithm::from_str(alg_name).map_err(|_| {
        tracing::debug!(target: "common.jwt", alg = %alg_name, "Token rejected: unsupported alg");
        JwtValidationError::UnsupportedAlgorithm
    })?;

    let kid = header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)?;

    Ok(UnverifiedHeader { kid, alg })
}

// =============================================================================
// Time window
// =============================================================================

/// Validate the `exp` claim against the current time.
///
/// # Errors
///
/// Returns `JwtValidationError::Expired` if `exp` is more than `clock_skew`
/// in the past.
pub fn validate_exp(exp: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    validate_exp_at(exp, clock_skew, chrono::Utc::now().timestamp())
}

/// Deterministic `exp` validation against an explicit `now` timestamp.
///
/// A token whose `exp` equals `now - clock_skew` is still accepted.
///
/// # Errors
///
/// Returns `JwtValidationError::Expired` if `exp < now - clock_skew`.
pub fn validate_exp_at(exp: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let clock_skew_secs = skew_secs(clock_skew);
    let min_exp = now.saturating_sub(clock_skew_secs);

    if exp < min_exp {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }

    Ok(())
}

/// Deterministic `nbf` (not-before) validation against an explicit `now`.
///
/// # Errors
///
/// Returns `JwtValidationError::NotYetValid` if `nbf > now + clock_skew`.
pub fn validate_nbf_at(nbf: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let clock_skew_secs = skew_secs(clock_skew);
    let max_nbf = now.saturating_add(clock_skew_secs);

    if nbf > max_nbf {
        tracing::debug!(
            target: "common.jwt",
            nbf = nbf,
            now = now,
            max_allowed = max_nbf,
            "Token rejected: not yet valid"
        );
        return Err(JwtValidationError::NotYetValid);
    }

    Ok(())
}

fn skew_secs(clock_skew: Duration) -> i64 {
    // Bounded by MAX_CLOCK_SKEW in configuration; saturate rather than wrap.
    i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX)
}

// =============================================================================
// Tests
// =============================================================================
