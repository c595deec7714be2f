//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating test token claims.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Issuer domain used by test configurations.
pub const TEST_ISSUER_DOMAIN: &str = "tenant.example.com";

/// Issuer claim matching [`TEST_ISSUER_DOMAIN`].
pub const TEST_ISSUER: &str = "https://tenant.example.com/";

/// Audience used by test configurations.
pub const TEST_AUDIENCE: &str = "https://inventory.example.com";

/// Builder for creating test JWT claims
///
/// Defaults produce claims the test server admits: matching issuer and
/// audience, expiring in one hour.
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_scope("read:inventory")
///     .expires_in(3600)
///     .build();
/// let token = TestKeypair::primary().sign(&claims);
/// ```
pub struct TestTokenBuilder {
    iss: String,
    aud: Value,
    sub: String,
    scope: Option<String>,
    exp: i64,
    iat: i64,
    nbf: Option<i64>,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            iss: TEST_ISSUER.to_string(),
            aud: json!(TEST_AUDIENCE),
            sub: "auth0|test-subject".to_string(),
            scope: None,
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            nbf: None,
            extra: Map::new(),
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the scope (space-separated)
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }

    /// Set the issuer
    pub fn issuer(mut self, iss: &str) -> Self {
        self.iss = iss.to_string();
        self
    }

    /// Set a single audience
    pub fn audience(mut self, aud: &str) -> Self {
        self.aud = json!(aud);
        self
    }

    /// Set an audience array
    pub fn audiences(mut self, auds: &[&str]) -> Self {
        self.aud = json!(auds);
        self
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set an absolute expiration timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = timestamp;
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Add a custom claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = self.extra;
        claims.insert("iss".to_string(), json!(self.iss));
        claims.insert("aud".to_string(), self.aud);
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("exp".to_string(), json!(self.exp));
        claims.insert("iat".to_string(), json!(self.iat));
        if let Some(scope) = self.scope {
            claims.insert("scope".to_string(), json!(scope));
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        Value::Object(claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
