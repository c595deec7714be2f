//! JWKS client for fetching and caching the issuer's signing keys.
//!
//! The client fetches the JSON Web Key Set from the issuer's
//! `/.well-known/jwks.json` endpoint, parses every usable entry into a
//! verification key up front, and caches the resulting set with a TTL.
//!
//! # Refresh
//!
//! - A key set is replaced as a whole, never mutated in place.
//! - Each published set carries a generation number. A refresh is keyed by the
//!   generation the caller observed: concurrent callers that observed the same
//!   generation share one fetch, and a caller whose generation has already been
//!   superseded re-reads the newer set instead of fetching.
//! - The fetch runs in a spawned task, so a caller that gives up (client
//!   disconnect, timeout) never cancels it for the others.
//! - A failed fetch is reported to every waiter. The previous set is kept for
//!   `state()` but never used to admit tokens once it is stale.
//!
//! # Security
//!
//! - Only keys with `use` absent or `"sig"` are admitted into the set
//! - Keys for symmetric algorithms are ignored
//! - The fetch is bounded by an HTTP timeout well inside the admission budget

use crate::config::Config;
use crate::errors::AdmissionError;
use crate::observability::metrics::{record_jwks_refresh, set_jwks_keys_cached};
use futures::future::{BoxFuture, FutureExt, Shared};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// JSON Web Key from the JWKS endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type: "RSA", "EC" or "OKP".
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm this key is meant for, if published.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (must be "sig" when present).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// JWKS document as served by the issuer.
///
/// Entries are kept as raw JSON so one malformed key does not reject the
/// whole document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<serde_json::Value>,
}

/// Key type family, shared by a key's `kty` and the algorithms it can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Ec,
    Okp,
}

impl KeyFamily {
    /// Family named by a JWK `kty`.
    pub fn from_kty(kty: &str) -> Option<Self> {
        match kty {
            "RSA" => Some(KeyFamily::Rsa),
            "EC" => Some(KeyFamily::Ec),
            "OKP" => Some(KeyFamily::Okp),
            _ => None,
        }
    }

    /// Family an algorithm verifies with. `None` for symmetric algorithms.
    pub fn for_algorithm(alg: Algorithm) -> Option<Self> {
        match alg {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Some(KeyFamily::Rsa),
            Algorithm::ES256 | Algorithm::ES384 => Some(KeyFamily::Ec),
            Algorithm::EdDSA => Some(KeyFamily::Okp),
            _ => None,
        }
    }
}

/// A verification key parsed from one JWKS entry.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    pub family: KeyFamily,
    /// The key's own `alg`, if the issuer published one.
    pub alg: Option<Algorithm>,
    pub decoding_key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Parse a JWK into a verification key.
    ///
    /// # Errors
    ///
    /// Returns a short reason when the entry is not a usable signing key.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, &'static str> {
        if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
            return Err("key use is not sig");
        }

        let kid = match jwk.kid.as_deref() {
            Some(kid) if !kid.is_empty() => kid.to_string(),
            _ => return Err("missing kid"),
        };

        let family = KeyFamily::from_kty(&jwk.kty).ok_or("unsupported key type")?;

        let alg = match jwk.alg.as_deref() {
            Some(name) => {
                let alg = Algorithm::from_str(name).map_err(|_| "unknown algorithm")?;
                if KeyFamily::for_algorithm(alg) != Some(family) {
                    return Err("algorithm does not match key type");
                }
                Some(alg)
            }
            None => None,
        };

        let decoding_key = match family {
            KeyFamily::Rsa => {
                let (n, e) = jwk.n.as_deref().zip(jwk.e.as_deref()).ok_or("missing RSA components")?;
                DecodingKey::from_rsa_components(n, e).map_err(|_| "invalid RSA components")?
            }
            KeyFamily::Ec => {
                let (x, y) = jwk.x.as_deref().zip(jwk.y.as_deref()).ok_or("missing EC coordinates")?;
                DecodingKey::from_ec_components(x, y).map_err(|_| "invalid EC coordinates")?
            }
            KeyFamily::Okp => {
                if jwk.crv.as_deref() != Some("Ed25519") {
                    return Err("unsupported OKP curve");
                }
                let x = jwk.x.as_deref().ok_or("missing OKP public key")?;
                DecodingKey::from_ed_components(x).map_err(|_| "invalid OKP public key")?
            }
        };

        Ok(Self {
            kid,
            family,
            alg,
            decoding_key,
        })
    }
}

/// Lifecycle state of the cached key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySetState {
    /// No key set has been loaded yet.
    Unloaded,
    /// Loaded and within its TTL.
    Fresh,
    /// Loaded but past its TTL; the next lookup refreshes it.
    Stale,
}

impl KeySetState {
    pub fn as_str(self) -> &'static str {
        match self {
            KeySetState::Unloaded => "unloaded",
            KeySetState::Fresh => "fresh",
            KeySetState::Stale => "stale",
        }
    }
}

/// Why a JWKS refresh failed.
///
/// Cloneable so one failure can be handed to every caller awaiting the same
/// refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JwksFetchError {
    #[error("Failed to build JWKS HTTP client: {0}")]
    Client(String),

    #[error("JWKS request timed out")]
    Timeout,

    #[error("JWKS request failed: {0}")]
    Request(String),

    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    #[error("Failed to parse JWKS response: {0}")]
    Parse(String),

    #[error("JWKS refresh task failed: {0}")]
    Task(String),
}

impl JwksFetchError {
    /// Bounded label for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            JwksFetchError::Client(_) => "client",
            JwksFetchError::Timeout => "timeout",
            JwksFetchError::Request(_) => "request",
            JwksFetchError::Status(_) => "status",
            JwksFetchError::Parse(_) => "parse",
            JwksFetchError::Task(_) => "task",
        }
    }
}

/// One published key set.
struct CachedJwks {
    /// Map of key ID to parsed key.
    keys: HashMap<String, Arc<SigningKey>>,

    /// When this set stops being fresh.
    expires_at: Instant,

    /// Monotonic publication counter, starting at 1.
    generation: u64,
}

impl CachedJwks {
    fn state(&self, now: Instant) -> KeySetState {
        if now < self.expires_at {
            KeySetState::Fresh
        } else {
            KeySetState::Stale
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<Arc<CachedJwks>, JwksFetchError>>>;

/// The refresh currently running, and the generation it replaces.
struct InflightRefresh {
    base_generation: u64,
    future: SharedRefresh,
}

struct Inner {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client with the fetch timeout applied.
    http_client: reqwest::Client,

    /// Cache TTL duration.
    cache_ttl: Duration,

    /// Current key set, swapped as a whole.
    current: RwLock<Option<Arc<CachedJwks>>>,

    /// Decides who fetches. Lock order: `inflight` before `current`.
    inflight: Mutex<Option<InflightRefresh>>,
}

/// JWKS client for fetching and caching signing keys.
///
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct JwksClient {
    inner: Arc<Inner>,
}

impl JwksClient {
    /// Create a new JWKS client.
    ///
    /// # Arguments
    ///
    /// * `jwks_url` - URL to the issuer's JWKS endpoint
    /// * `cache_ttl` - How long a fetched key set stays fresh
    /// * `fetch_timeout` - Upper bound on a single fetch, connect included
    ///
    /// # Errors
    ///
    /// Returns `JwksFetchError::Client` if the HTTP client cannot be built.
    pub fn new(
        jwks_url: String,
        cache_ttl: Duration,
        fetch_timeout: Duration,
    ) -> Result<Self, JwksFetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .connect_timeout(fetch_timeout)
            .build()
            .map_err(|e| JwksFetchError::Client(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                jwks_url,
                http_client,
                cache_ttl,
                current: RwLock::new(None),
                inflight: Mutex::new(None),
            }),
        })
    }

    /// Create a JWKS client from service configuration.
    ///
    /// # Errors
    ///
    /// Returns `JwksFetchError::Client` if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, JwksFetchError> {
        Self::new(
            config.jwks_url.clone(),
            config.jwks_cache_ttl,
            config.jwks_fetch_timeout,
        )
    }

    /// URL this client fetches from.
    pub fn jwks_url(&self) -> &str {
        &self.inner.jwks_url
    }

    /// Get a signing key by key ID.
    ///
    /// Serves from a fresh cache when the key is present. Otherwise performs
    /// (or joins) exactly one refresh and looks the key up in the result.
    ///
    /// # Errors
    ///
    /// - `AdmissionError::KeySetUnavailable` if the refresh fails
    /// - `AdmissionError::UnknownSigningKey` if the key is absent after refresh
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Arc<SigningKey>, AdmissionError> {
        let observed_generation = match self.snapshot().await {
            Some(cached) if cached.state(Instant::now()) == KeySetState::Fresh => {
                if let Some(key) = cached.keys.get(kid) {
                    tracing::debug!(target: "inventory.auth.jwks", kid = %kid, "JWKS cache hit");
                    return Ok(Arc::clone(key));
                }
                tracing::debug!(target: "inventory.auth.jwks", kid = %kid, "Key not found in JWKS cache");
                cached.generation
            }
            Some(cached) => {
                tracing::debug!(target: "inventory.auth.jwks", "JWKS cache is stale");
                cached.generation
            }
            None => 0,
        };

        let refreshed = self.refresh_after(observed_generation).await.map_err(|e| {
            tracing::warn!(target: "inventory.auth.jwks", error = %e, "Signing keys unavailable");
            AdmissionError::KeySetUnavailable
        })?;

        refreshed.keys.get(kid).cloned().ok_or_else(|| {
            tracing::warn!(target: "inventory.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
            AdmissionError::UnknownSigningKey
        })
    }

    /// Current cache state.
    pub async fn state(&self) -> KeySetState {
        match self.snapshot().await {
            Some(cached) => cached.state(Instant::now()),
            None => KeySetState::Unloaded,
        }
    }

    /// Make sure a fresh key set is loaded.
    ///
    /// Used by the readiness probe and the startup warm-up. An unloaded or
    /// stale set is refreshed through the same coalesced path as lookups, so
    /// this fails exactly when admissions would see `KeySetUnavailable`.
    ///
    /// # Errors
    ///
    /// Returns the fetch error if the load or refresh fails.
    pub async fn ensure_loaded(&self) -> Result<KeySetState, JwksFetchError> {
        let observed_generation = match self.snapshot().await {
            Some(cached) if cached.state(Instant::now()) == KeySetState::Fresh => {
                return Ok(KeySetState::Fresh);
            }
            Some(cached) => cached.generation,
            None => 0,
        };

        let cached = self.refresh_after(observed_generation).await?;
        Ok(cached.state(Instant::now()))
    }

    /// Number of keys in the current set (0 when unloaded).
    pub async fn key_count(&self) -> usize {
        self.snapshot().await.map_or(0, |cached| cached.keys.len())
    }

    async fn snapshot(&self) -> Option<Arc<CachedJwks>> {
        self.inner.current.read().await.clone()
    }

    /// Return a key set newer than `observed_generation`, fetching at most once.
    async fn refresh_after(
        &self,
        observed_generation: u64,
    ) -> Result<Arc<CachedJwks>, JwksFetchError> {
        let refresh = {
            let mut inflight = self.inner.inflight.lock().await;

            if let Some(current) = self.snapshot().await {
                if current.generation > observed_generation {
                    tracing::debug!(
                        target: "inventory.auth.jwks",
                        generation = current.generation,
                        "Key set already refreshed by another caller"
                    );
                    return Ok(current);
                }
            }

            match inflight.as_ref() {
                Some(running) if running.base_generation >= observed_generation => {
                    tracing::debug!(target: "inventory.auth.jwks", "Joining in-flight JWKS refresh");
                    running.future.clone()
                }
                _ => {
                    let future = self.spawn_refresh(observed_generation);
                    *inflight = Some(InflightRefresh {
                        base_generation: observed_generation,
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        refresh.await
    }

    fn spawn_refresh(&self, base_generation: u64) -> SharedRefresh {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.refresh(base_generation).await })
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(JwksFetchError::Task(e.to_string())),
            })
            .boxed()
            .shared()
    }
}

impl Inner {
    /// Fetch, publish generation `base_generation + 1`, and retire the
    /// in-flight marker.
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    async fn refresh(&self, base_generation: u64) -> Result<Arc<CachedJwks>, JwksFetchError> {
        tracing::debug!(target: "inventory.auth.jwks", "Fetching JWKS");

        let start = Instant::now();
        let fetched = fetch_signing_keys(&self.http_client, &self.jwks_url).await;
        let duration = start.elapsed();

        let outcome = match fetched {
            Ok(keys) => {
                record_jwks_refresh("success", None, duration);
                set_jwks_keys_cached(keys.len());

                let cached = Arc::new(CachedJwks {
                    keys,
                    expires_at: Instant::now() + self.cache_ttl,
                    generation: base_generation + 1,
                });
                *self.current.write().await = Some(Arc::clone(&cached));

                tracing::info!(
                    target: "inventory.auth.jwks",
                    key_count = cached.keys.len(),
                    generation = cached.generation,
                    duration_ms = duration.as_millis(),
                    "JWKS cache refreshed"
                );
                Ok(cached)
            }
            Err(e) => {
                record_jwks_refresh("error", Some(e.error_type()), duration);
                tracing::error!(target: "inventory.auth.jwks", error = %e, "JWKS refresh failed");
                Err(e)
            }
        };

        let mut inflight = self.inflight.lock().await;
        if inflight
            .as_ref()
            .is_some_and(|running| running.base_generation == base_generation)
        {
            *inflight = None;
        }

        outcome
    }
}

/// Fetch the JWKS document and parse every usable entry.
async fn fetch_signing_keys(
    http_client: &reqwest::Client,
    jwks_url: &str,
) -> Result<HashMap<String, Arc<SigningKey>>, JwksFetchError> {
    let response = http_client.get(jwks_url).send().await.map_err(|e| {
        if e.is_timeout() {
            JwksFetchError::Timeout
        } else {
            JwksFetchError::Request(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(JwksFetchError::Status(response.status().as_u16()));
    }

    let jwks: JwksResponse = response.json().await.map_err(|e| {
        if e.is_timeout() {
            JwksFetchError::Timeout
        } else {
            JwksFetchError::Parse(e.to_string())
        }
    })?;

    Ok(parse_key_set(jwks))
}

/// Build the key map, skipping entries that are not usable signing keys.
fn parse_key_set(jwks: JwksResponse) -> HashMap<String, Arc<SigningKey>> {
    let mut keys = HashMap::with_capacity(jwks.keys.len());

    for entry in jwks.keys {
        let jwk: Jwk = match serde_json::from_value(entry) {
            Ok(jwk) => jwk,
            Err(e) => {
                tracing::warn!(target: "inventory.auth.jwks", error = %e, "Skipping unparseable JWKS entry");
                continue;
            }
        };

        match SigningKey::from_jwk(&jwk) {
            Ok(key) => {
                if keys.contains_key(&key.kid) {
                    tracing::warn!(target: "inventory.auth.jwks", kid = %key.kid, "Skipping duplicate kid in JWKS");
                    continue;
                }
                keys.insert(key.kid.clone(), Arc::new(key));
            }
            Err(reason) => {
                tracing::warn!(
                    target: "inventory.auth.jwks",
                    kid = ?jwk.kid,
                    kty = %jwk.kty,
                    reason,
                    "Skipping JWKS entry"
                );
            }
        }
    }

    keys
}
