//! Token admission gate.
//!
//! Decides whether a bearer token is admitted, using signing keys from the
//! issuer's JWKS.
//!
//! # Security Checks
//!
//! In order, each failing closed:
//! 1. Size check and unverified header parse (`kid`, `alg`)
//! 2. Header `alg` must be in the allow-list, before any key lookup, so an
//!    attacker-chosen algorithm never triggers network I/O
//! 3. Key lookup by `kid` (cache, then at most one refresh)
//! 4. Key type and key `alg` must match the header algorithm
//! 5. Signature verification with exactly that algorithm
//! 6. `exp` (with clock-skew leeway), then `nbf`
//! 7. `iss` and `aud`
//!
//! The token's signature is verified before any claim is looked at, so an
//! expired token is reported as expired only when it is genuine.

use crate::auth::bearer::BearerToken;
use crate::auth::claims::Claims;
use crate::auth::jwks::{JwksClient, KeyFamily, SigningKey};
use crate::config::Config;
use crate::errors::{AdmissionError, InvalidTokenReason};
use common::jwt::{decode_unverified_header, validate_exp_at, validate_nbf_at};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::time::Duration;
use tracing::instrument;

/// Validates bearer tokens against the issuer's current signing keys.
pub struct TokenAdmissionGate {
    /// Shared key-set cache.
    jwks_client: JwksClient,

    /// Algorithms accepted from token headers.
    allowed_algorithms: Vec<Algorithm>,

    /// Exact `iss` value, `https://{issuer_domain}/`.
    expected_issuer: String,

    /// Audience that must appear in `aud`.
    audience: String,

    /// Leeway for `exp` and `nbf`.
    clock_skew: Duration,
}

impl TokenAdmissionGate {
    /// Create a gate from service configuration.
    pub fn new(jwks_client: JwksClient, config: &Config) -> Self {
        Self {
            jwks_client,
            allowed_algorithms: config.allowed_algorithms.clone(),
            expected_issuer: config.expected_issuer(),
            audience: config.audience.clone(),
            clock_skew: config.jwt_clock_skew,
        }
    }

    /// The key-set cache this gate verifies against.
    pub fn jwks_client(&self) -> &JwksClient {
        &self.jwks_client
    }

    /// Admit or reject a token at the current time.
    ///
    /// # Errors
    ///
    /// - `UnknownSigningKey` - `kid` absent from the key set after one refresh
    /// - `KeySetUnavailable` - the key set could not be fetched
    /// - `ExpiredToken` - genuine token past `exp`
    /// - `InvalidSignatureOrClaims` - everything else
    #[instrument(skip_all)]
    pub async fn admit(&self, token: &BearerToken) -> Result<Claims, AdmissionError> {
        self.admit_at(token, chrono::Utc::now().timestamp()).await
    }

    /// Admit or reject a token at evaluation time `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Same as [`TokenAdmissionGate::admit`].
    pub async fn admit_at(&self, token: &BearerToken, now: i64) -> Result<Claims, AdmissionError> {
        let raw = token.expose();

        let header = decode_unverified_header(raw).map_err(|e| {
            tracing::debug!(target: "inventory.auth.gate", error = ?e, "Token header rejected");
            AdmissionError::InvalidSignatureOrClaims(InvalidTokenReason::MalformedToken)
        })?;

        if !self.allowed_algorithms.contains(&header.alg) {
            tracing::debug!(target: "inventory.auth.gate", alg = ?header.alg, "Token algorithm not allowed");
            return Err(AdmissionError::InvalidSignatureOrClaims(
                InvalidTokenReason::DisallowedAlgorithm,
            ));
        }

        let key = self.jwks_client.get_key(&header.kid).await?;

        check_key_algorithm(&key, header.alg)?;

        let claims = verify_signature(raw, &key, header.alg)?;

        validate_exp_at(claims.exp, self.clock_skew, now).map_err(|_| {
            tracing::debug!(target: "inventory.auth.gate", exp = claims.exp, now, "Token expired");
            AdmissionError::ExpiredToken
        })?;

        if let Some(nbf) = claims.nbf {
            validate_nbf_at(nbf, self.clock_skew, now).map_err(|_| {
                tracing::debug!(target: "inventory.auth.gate", nbf, now, "Token not yet valid");
                AdmissionError::InvalidSignatureOrClaims(InvalidTokenReason::NotYetValid)
            })?;
        }

        if claims.iss != self.expected_issuer {
            tracing::debug!(target: "inventory.auth.gate", iss = %claims.iss, "Token issuer mismatch");
            return Err(AdmissionError::InvalidSignatureOrClaims(
                InvalidTokenReason::IssuerMismatch,
            ));
        }

        if !claims.aud.contains(&self.audience) {
            tracing::debug!(target: "inventory.auth.gate", aud = ?claims.aud, "Token audience mismatch");
            return Err(AdmissionError::InvalidSignatureOrClaims(
                InvalidTokenReason::AudienceMismatch,
            ));
        }

        tracing::debug!(target: "inventory.auth.gate", kid = %key.kid, "Token admitted");
        Ok(claims)
    }
}

/// The key must belong to the header algorithm's family, and its own `alg`,
/// when published, must be exactly the header algorithm.
fn check_key_algorithm(key: &SigningKey, alg: Algorithm) -> Result<(), AdmissionError> {
    let family_matches = KeyFamily::for_algorithm(alg) == Some(key.family);
    let alg_matches = key.alg.map_or(true, |key_alg| key_alg == alg);

    if family_matches && alg_matches {
        Ok(())
    } else {
        tracing::warn!(
            target: "inventory.auth.gate",
            kid = %key.kid,
            header_alg = ?alg,
            key_alg = ?key.alg,
            key_family = ?key.family,
            "Token algorithm does not match signing key"
        );
        Err(AdmissionError::InvalidSignatureOrClaims(
            InvalidTokenReason::KeyAlgorithmMismatch,
        ))
    }
}

/// Verify the signature with exactly `alg` and decode the claims.
///
/// Time, issuer and audience checks are done by the caller so that each
/// failure maps to its own cause.
fn verify_signature(token: &str, key: &SigningKey, alg: Algorithm) -> Result<Claims, AdmissionError> {
    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &key.decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::Json(_) => {
                tracing::debug!(target: "inventory.auth.gate", error = %e, "Token claims did not decode");
                AdmissionError::InvalidSignatureOrClaims(InvalidTokenReason::MalformedClaims)
            }
            _ => {
                tracing::debug!(target: "inventory.auth.gate", error = %e, "Token signature verification failed");
                AdmissionError::InvalidSignatureOrClaims(InvalidTokenReason::BadSignature)
            }
        })
}
