//! Inventory service configuration.
//!
//! Configuration is loaded from environment variables. The identity provider
//! settings are required; everything else has a default tuned for the 800ms
//! admission budget.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use jsonwebtoken::Algorithm;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default JWKS cache TTL in seconds (10 minutes).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 600;

/// Maximum JWKS cache TTL in seconds (24 hours).
pub const MAX_JWKS_CACHE_TTL_SECONDS: u64 = 86_400;

/// Default JWKS fetch timeout in milliseconds.
///
/// Leaves headroom for verification inside the 800ms admission budget.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_MS: u64 = 500;

/// Maximum JWKS fetch timeout in milliseconds (the whole admission budget).
pub const MAX_JWKS_FETCH_TIMEOUT_MS: u64 = 800;

/// Default allowed signature algorithms.
pub const DEFAULT_ALLOWED_ALGORITHMS: &[Algorithm] = &[Algorithm::RS256];

/// Inventory service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Identity provider domain, e.g. `tenant.auth0.com`.
    pub issuer_domain: String,

    /// Expected `aud` claim.
    pub audience: String,

    /// Signature algorithms accepted from token headers.
    pub allowed_algorithms: Vec<Algorithm>,

    /// URL of the issuer's JWKS document.
    pub jwks_url: String,

    /// How long a fetched key set stays fresh.
    pub jwks_cache_ttl: Duration,

    /// HTTP timeout for a single JWKS fetch.
    pub jwks_fetch_timeout: Duration,

    /// Leeway applied to `exp` and `nbf`.
    pub jwt_clock_skew: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid issuer domain: {0}")]
    InvalidIssuerDomain(String),

    #[error("Invalid allowed algorithms configuration: {0}")]
    InvalidAlgorithms(String),

    #[error("Invalid JWKS cache TTL configuration: {0}")]
    InvalidCacheTtl(String),

    #[error("Invalid JWKS fetch timeout configuration: {0}")]
    InvalidFetchTimeout(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let issuer_domain = required(vars, "ISSUER_DOMAIN")?;
        validate_issuer_domain(&issuer_domain)?;

        let audience = required(vars, "API_AUDIENCE")?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let allowed_algorithms = match vars.get("ALLOWED_ALGORITHMS") {
            Some(value) => parse_algorithms(value)?,
            None => DEFAULT_ALLOWED_ALGORITHMS.to_vec(),
        };

        let jwks_url = vars
            .get("JWKS_URL")
            .cloned()
            .unwrap_or_else(|| format!("https://{}/.well-known/jwks.json", issuer_domain));

        // Parse JWKS cache TTL with validation
        let jwks_cache_ttl_seconds = if let Some(value_str) = vars.get("JWKS_CACHE_TTL_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidCacheTtl(format!(
                    "JWKS_CACHE_TTL_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidCacheTtl(
                    "JWKS_CACHE_TTL_SECONDS must be greater than 0".to_string(),
                ));
            }

            if value > MAX_JWKS_CACHE_TTL_SECONDS {
                return Err(ConfigError::InvalidCacheTtl(format!(
                    "JWKS_CACHE_TTL_SECONDS must not exceed {} seconds, got {}",
                    MAX_JWKS_CACHE_TTL_SECONDS, value
                )));
            }

            value
        } else {
            DEFAULT_JWKS_CACHE_TTL_SECONDS
        };

        // Parse JWKS fetch timeout with validation
        let jwks_fetch_timeout_ms = if let Some(value_str) = vars.get("JWKS_FETCH_TIMEOUT_MS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidFetchTimeout(format!(
                    "JWKS_FETCH_TIMEOUT_MS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidFetchTimeout(
                    "JWKS_FETCH_TIMEOUT_MS must be greater than 0".to_string(),
                ));
            }

            if value > MAX_JWKS_FETCH_TIMEOUT_MS {
                return Err(ConfigError::InvalidFetchTimeout(format!(
                    "JWKS_FETCH_TIMEOUT_MS must not exceed {} ms, got {}",
                    MAX_JWKS_FETCH_TIMEOUT_MS, value
                )));
            }

            value
        } else {
            DEFAULT_JWKS_FETCH_TIMEOUT_MS
        };

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value < 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not be negative, got {}",
                    value
                )));
            }

            let value = value.unsigned_abs();
            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs()
        };

        Ok(Config {
            bind_address,
            issuer_domain,
            audience,
            allowed_algorithms,
            jwks_url,
            jwks_cache_ttl: Duration::from_secs(jwks_cache_ttl_seconds),
            jwks_fetch_timeout: Duration::from_millis(jwks_fetch_timeout_ms),
            jwt_clock_skew: Duration::from_secs(jwt_clock_skew_seconds),
        })
    }

    /// Expected `iss` claim: `https://{issuer_domain}/`.
    pub fn expected_issuer(&self) -> String {
        format!("https://{}/", self.issuer_domain)
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// The domain is interpolated into both the issuer and the JWKS URL, so it
/// must be a bare host (optionally with port).
fn validate_issuer_domain(domain: &str) -> Result<(), ConfigError> {
    if domain.contains("://") {
        return Err(ConfigError::InvalidIssuerDomain(format!(
            "ISSUER_DOMAIN must not include a scheme, got '{}'",
            domain
        )));
    }

    if domain.contains('/') || domain.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidIssuerDomain(format!(
            "ISSUER_DOMAIN must be a bare host name, got '{}'",
            domain
        )));
    }

    Ok(())
}

/// Parse a comma-separated algorithm list.
///
/// Only asymmetric JWS algorithms are accepted: a JWKS only publishes public
/// keys, and allowing an HMAC algorithm would let a public key be used as a
/// shared secret.
fn parse_algorithms(value: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let mut algorithms = Vec::new();

    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let alg = Algorithm::from_str(name).map_err(|_| {
            ConfigError::InvalidAlgorithms(format!("unknown algorithm '{}'", name))
        })?;

        if matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::InvalidAlgorithms(format!(
                "symmetric algorithm '{}' cannot be verified against a JWKS",
                name
            )));
        }

        if !algorithms.contains(&alg) {
            algorithms.push(alg);
        }
    }

    if algorithms.is_empty() {
        return Err(ConfigError::InvalidAlgorithms(
            "ALLOWED_ALGORITHMS must name at least one algorithm".to_string(),
        ));
    }

    Ok(algorithms)
}
