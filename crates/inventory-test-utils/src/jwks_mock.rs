//! Mock JWKS endpoint helpers
//!
//! Wraps `wiremock` for the issuer's `/.well-known/jwks.json` endpoint.

use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the issuer serves its key set from.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Full JWKS URL on a mock server.
pub fn jwks_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), JWKS_PATH)
}

/// Serve `jwks` from the mock server.
pub async fn mount_jwks(server: &MockServer, jwks: Value) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
        .mount(server)
        .await;
}

/// Serve `jwks` after `delay`, to hold refreshes in flight.
pub async fn mount_jwks_with_delay(server: &MockServer, jwks: Value, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks)
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Answer every JWKS request with `status` and no key set.
pub async fn mount_jwks_error(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Answer every JWKS request with a body that is not JSON.
pub async fn mount_jwks_garbage(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(server)
        .await;
}

/// Number of JWKS requests the mock server has received.
pub async fn jwks_request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| {
            requests
                .iter()
                .filter(|r| r.url.path() == JWKS_PATH)
                .count()
        })
        .unwrap_or(0)
}
