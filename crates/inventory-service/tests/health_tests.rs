//! Operational endpoint integration tests.
//!
//! Covers `/health`, `/ready` and `/metrics`.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use inventory_service::auth::KeySetState;
use inventory_test_utils::*;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use wiremock::MockServer;

#[tokio::test]
async fn test_health_is_ok_without_jwks() -> Result<()> {
    let jwks = MockServer::start().await;
    mount_jwks_error(&jwks, 500).await;
    let server = TestInventoryServer::spawn(&jwks_url(&jwks)).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "OK");
    assert_eq!(jwks_request_count(&jwks).await, 0);
    Ok(())
}

#[tokio::test]
async fn test_ready_loads_signing_keys() -> Result<()> {
    let jwks = MockServer::start().await;
    mount_jwks(&jwks, jwks_json(&[&TestKeypair::primary()])).await;
    let server = TestInventoryServer::spawn(&jwks_url(&jwks)).await?;

    assert_eq!(
        server.state().gate.jwks_client().state().await,
        KeySetState::Unloaded
    );

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["signing_keys"], "fresh");
    assert!(body.get("error").is_none());

    // Second readiness check is served from the cache.
    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(jwks_request_count(&jwks).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_ready_is_503_when_keys_unavailable() -> Result<()> {
    let jwks = MockServer::start().await;
    mount_jwks_error(&jwks, 502).await;
    let server = TestInventoryServer::spawn(&jwks_url(&jwks)).await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["signing_keys"], "unloaded");
    assert_eq!(body["error"], "Service dependencies unavailable");
    Ok(())
}

#[tokio::test]
async fn test_ready_is_503_when_stale_keys_cannot_refresh() -> Result<()> {
    let jwks = MockServer::start().await;
    mount_jwks(&jwks, jwks_json(&[&TestKeypair::primary()])).await;
    let server = TestInventoryServer::spawn_with_vars(
        &jwks_url(&jwks),
        HashMap::from([("JWKS_CACHE_TTL_SECONDS".to_string(), "1".to_string())]),
    )
    .await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    jwks.reset().await;
    mount_jwks_error(&jwks, 500).await;

    // Admissions fail once the stale set cannot be refreshed...
    let token = TestKeypair::primary().sign(&TestTokenBuilder::new().build());
    let response = reqwest::Client::new()
        .get(server.inventory_url())
        .bearer_auth(token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // ...and readiness agrees.
    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["signing_keys"], "stale");
    assert_eq!(jwks_request_count(&jwks).await, 2);
    Ok(())
}

#[tokio::test]
async fn test_ready_refreshes_stale_keys() -> Result<()> {
    let jwks = MockServer::start().await;
    mount_jwks(&jwks, jwks_json(&[&TestKeypair::primary()])).await;
    let server = TestInventoryServer::spawn_with_vars(
        &jwks_url(&jwks),
        HashMap::from([("JWKS_CACHE_TTL_SECONDS".to_string(), "1".to_string())]),
    )
    .await?;

    reqwest::get(format!("{}/ready", server.url())).await?;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(
        server.state().gate.jwks_client().state().await,
        KeySetState::Stale
    );

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["signing_keys"], "fresh");
    assert_eq!(jwks_request_count(&jwks).await, 2);
    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_is_public() -> Result<()> {
    let jwks = MockServer::start().await;
    mount_jwks(&jwks, jwks_json(&[&TestKeypair::primary()])).await;
    let server = TestInventoryServer::spawn(&jwks_url(&jwks)).await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_unknown_route_is_404() -> Result<()> {
    let jwks = MockServer::start().await;
    let server = TestInventoryServer::spawn(&jwks_url(&jwks)).await?;

    let response = reqwest::get(format!("{}/api/v1/unknown", server.url())).await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}
