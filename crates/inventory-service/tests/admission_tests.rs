//! Admission gate integration tests.
//!
//! Exercises `TokenAdmissionGate` and the JWKS cache against a mocked JWKS
//! endpoint, counting fetches to check the refresh policy.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Utc;
use futures::future::join_all;
use inventory_service::auth::{BearerToken, JwksClient, KeySetState, TokenAdmissionGate};
use inventory_service::config::Config;
use inventory_service::errors::{AdmissionError, InvalidTokenReason};
use inventory_test_utils::*;
use jsonwebtoken::Algorithm;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::MockServer;

fn test_gate(server: &MockServer, overrides: &[(&str, &str)]) -> TokenAdmissionGate {
    let mut vars = HashMap::from([
        ("ISSUER_DOMAIN".to_string(), TEST_ISSUER_DOMAIN.to_string()),
        ("API_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
        ("JWKS_URL".to_string(), jwks_url(server)),
    ]);
    for (name, value) in overrides {
        vars.insert((*name).to_string(), (*value).to_string());
    }
    let config = Config::from_vars(&vars).unwrap();
    TokenAdmissionGate::new(JwksClient::from_config(&config).unwrap(), &config)
}

fn invalid(reason: InvalidTokenReason) -> AdmissionError {
    AdmissionError::InvalidSignatureOrClaims(reason)
}

fn bearer(token: String) -> BearerToken {
    BearerToken::new(token)
}

async fn primary_key_server() -> MockServer {
    let server = MockServer::start().await;
    mount_jwks(&server, jwks_json(&[&TestKeypair::primary()])).await;
    server
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn test_valid_token_is_admitted() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    let token = TestKeypair::primary().sign(
        &TestTokenBuilder::new()
            .for_user("auth0|alice")
            .with_scope("read:inventory write:inventory")
            .with_claim("https://example.com/email", json!("alice@example.com"))
            .build(),
    );

    let claims = gate.admit(&bearer(token)).await.unwrap();

    assert_eq!(claims.iss, TEST_ISSUER);
    assert!(claims.aud.contains(TEST_AUDIENCE));
    assert_eq!(claims.sub.as_deref(), Some("auth0|alice"));
    assert!(claims.has_scope("write:inventory"));
    assert_eq!(
        claims.extra.get("https://example.com/email"),
        Some(&json!("alice@example.com"))
    );
}

#[tokio::test]
async fn test_audience_array_containing_audience_is_admitted() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    let token = TestKeypair::primary().sign(
        &TestTokenBuilder::new()
            .audiences(&[TEST_AUDIENCE, "https://tenant.example.com/userinfo"])
            .build(),
    );

    assert!(gate.admit(&bearer(token)).await.is_ok());
}

#[tokio::test]
async fn test_cache_hit_does_not_refetch() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);
    let key = TestKeypair::primary();

    for _ in 0..5 {
        let token = key.sign(&TestTokenBuilder::new().build());
        gate.admit(&bearer(token)).await.unwrap();
    }

    assert_eq!(jwks_request_count(&server).await, 1);
    assert_eq!(gate.jwks_client().state().await, KeySetState::Fresh);
}

// ============================================================================
// Refresh policy
// ============================================================================

#[tokio::test]
async fn test_unknown_kid_triggers_exactly_one_fetch() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    let token = TestKeypair::primary()
        .with_kid("never-published")
        .sign(&TestTokenBuilder::new().build());

    let err = gate.admit(&bearer(token)).await.unwrap_err();

    assert_eq!(err, AdmissionError::UnknownSigningKey);
    assert_eq!(jwks_request_count(&server).await, 1);
}

#[tokio::test]
async fn test_unknown_kid_on_warm_cache_refreshes_once() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    let good = TestKeypair::primary().sign(&TestTokenBuilder::new().build());
    gate.admit(&bearer(good)).await.unwrap();
    assert_eq!(jwks_request_count(&server).await, 1);

    let unknown = TestKeypair::secondary().sign(&TestTokenBuilder::new().build());
    let err = gate.admit(&bearer(unknown)).await.unwrap_err();

    assert_eq!(err, AdmissionError::UnknownSigningKey);
    assert_eq!(jwks_request_count(&server).await, 2);
}

#[tokio::test]
async fn test_concurrent_cold_misses_share_one_fetch() {
    let server = MockServer::start().await;
    mount_jwks_with_delay(
        &server,
        jwks_json(&[&TestKeypair::primary()]),
        Duration::from_millis(200),
    )
    .await;
    let gate = Arc::new(test_gate(&server, &[]));
    let token = TestKeypair::primary().sign(&TestTokenBuilder::new().build());

    let admissions = (0..20).map(|_| {
        let gate = Arc::clone(&gate);
        let token = bearer(token.clone());
        tokio::spawn(async move { gate.admit(&token).await })
    });
    let results = join_all(admissions).await;

    for result in results {
        assert!(result.unwrap().is_ok());
    }
    assert_eq!(jwks_request_count(&server).await, 1);
}

#[tokio::test]
async fn test_concurrent_unknown_kids_share_one_refresh() {
    let server = MockServer::start().await;
    mount_jwks_with_delay(
        &server,
        jwks_json(&[&TestKeypair::primary()]),
        Duration::from_millis(200),
    )
    .await;
    let gate = Arc::new(test_gate(&server, &[]));

    let good = TestKeypair::primary().sign(&TestTokenBuilder::new().build());
    gate.admit(&bearer(good)).await.unwrap();
    assert_eq!(jwks_request_count(&server).await, 1);

    let admissions = (0..10).map(|i| {
        let gate = Arc::clone(&gate);
        let token = TestKeypair::primary()
            .with_kid(&format!("unknown-{i}"))
            .sign(&TestTokenBuilder::new().build());
        tokio::spawn(async move { gate.admit(&bearer(token)).await })
    });
    let results = join_all(admissions).await;

    for result in results {
        assert_eq!(result.unwrap().unwrap_err(), AdmissionError::UnknownSigningKey);
    }
    assert_eq!(jwks_request_count(&server).await, 2);
}

#[tokio::test]
async fn test_cancelled_caller_does_not_cancel_refresh() {
    let server = MockServer::start().await;
    mount_jwks_with_delay(
        &server,
        jwks_json(&[&TestKeypair::primary()]),
        Duration::from_millis(200),
    )
    .await;
    let gate = Arc::new(test_gate(&server, &[]));
    let token = TestKeypair::primary().sign(&TestTokenBuilder::new().build());

    // The first caller gives up while the fetch is in flight.
    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        gate.admit(&bearer(token.clone())),
    )
    .await;
    assert!(abandoned.is_err());

    // The second caller joins the same fetch and is admitted.
    gate.admit(&bearer(token)).await.unwrap();
    assert_eq!(jwks_request_count(&server).await, 1);
}

#[tokio::test]
async fn test_key_rotation_picks_up_new_key() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    let old = TestKeypair::primary().sign(&TestTokenBuilder::new().build());
    gate.admit(&bearer(old)).await.unwrap();

    // Issuer rotates to the secondary key only.
    server.reset().await;
    mount_jwks(&server, jwks_json(&[&TestKeypair::secondary()])).await;

    let new = TestKeypair::secondary().sign(&TestTokenBuilder::new().build());
    gate.admit(&bearer(new)).await.unwrap();
    assert_eq!(jwks_request_count(&server).await, 1);

    // The retired key is gone with the old set.
    let old = TestKeypair::primary().sign(&TestTokenBuilder::new().build());
    assert_eq!(
        gate.admit(&bearer(old)).await.unwrap_err(),
        AdmissionError::UnknownSigningKey
    );
}

#[tokio::test]
async fn test_ttl_expiry_refreshes_key_set() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[("JWKS_CACHE_TTL_SECONDS", "1")]);
    let key = TestKeypair::primary();

    gate.admit(&bearer(key.sign(&TestTokenBuilder::new().build())))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(gate.jwks_client().state().await, KeySetState::Stale);

    gate.admit(&bearer(key.sign(&TestTokenBuilder::new().build())))
        .await
        .unwrap();

    assert_eq!(jwks_request_count(&server).await, 2);
    assert_eq!(gate.jwks_client().state().await, KeySetState::Fresh);
}

#[tokio::test]
async fn test_unusable_keys_are_skipped() {
    let server = MockServer::start().await;
    let mut enc_key = TestKeypair::primary().jwk();
    enc_key["use"] = json!("enc");
    mount_jwks(
        &server,
        json!({"keys": [enc_key, {"kty": "oct", "kid": "hmac", "k": "c2VjcmV0"}, TestKeypair::secondary().jwk()]}),
    )
    .await;
    let gate = test_gate(&server, &[]);

    let enc_signed = TestKeypair::primary().sign(&TestTokenBuilder::new().build());
    assert_eq!(
        gate.admit(&bearer(enc_signed)).await.unwrap_err(),
        AdmissionError::UnknownSigningKey
    );

    let sig_signed = TestKeypair::secondary().sign(&TestTokenBuilder::new().build());
    assert!(gate.admit(&bearer(sig_signed)).await.is_ok());
    assert_eq!(gate.jwks_client().key_count().await, 1);
}

// ============================================================================
// Key set unavailable
// ============================================================================

#[tokio::test]
async fn test_jwks_server_error_is_unavailable() {
    let server = MockServer::start().await;
    mount_jwks_error(&server, 500).await;
    let gate = test_gate(&server, &[]);

    let token = TestKeypair::primary().sign(&TestTokenBuilder::new().build());

    assert_eq!(
        gate.admit(&bearer(token)).await.unwrap_err(),
        AdmissionError::KeySetUnavailable
    );
}

#[tokio::test]
async fn test_jwks_garbage_is_unavailable() {
    let server = MockServer::start().await;
    mount_jwks_garbage(&server).await;
    let gate = test_gate(&server, &[]);

    let token = TestKeypair::primary().sign(&TestTokenBuilder::new().build());

    assert_eq!(
        gate.admit(&bearer(token)).await.unwrap_err(),
        AdmissionError::KeySetUnavailable
    );
}

#[tokio::test]
async fn test_jwks_timeout_is_unavailable_within_budget() {
    let server = MockServer::start().await;
    mount_jwks_with_delay(
        &server,
        jwks_json(&[&TestKeypair::primary()]),
        Duration::from_secs(2),
    )
    .await;
    let gate = test_gate(&server, &[("JWKS_FETCH_TIMEOUT_MS", "100")]);

    let token = TestKeypair::primary().sign(&TestTokenBuilder::new().build());
    let start = Instant::now();

    let err = gate.admit(&bearer(token)).await.unwrap_err();

    assert_eq!(err, AdmissionError::KeySetUnavailable);
    assert!(start.elapsed() < Duration::from_millis(800));
}

#[tokio::test]
async fn test_recovers_after_failed_refresh() {
    let server = MockServer::start().await;
    mount_jwks_error(&server, 503).await;
    let gate = test_gate(&server, &[]);
    let key = TestKeypair::primary();

    assert_eq!(
        gate.admit(&bearer(key.sign(&TestTokenBuilder::new().build())))
            .await
            .unwrap_err(),
        AdmissionError::KeySetUnavailable
    );
    assert_eq!(gate.jwks_client().state().await, KeySetState::Unloaded);

    server.reset().await;
    mount_jwks(&server, jwks_json(&[&key])).await;

    assert!(gate
        .admit(&bearer(key.sign(&TestTokenBuilder::new().build())))
        .await
        .is_ok());
}

// ============================================================================
// Algorithm checks
// ============================================================================

#[tokio::test]
async fn test_hs256_token_rejected_without_fetch() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    let token = sign_hs256(b"shared-secret", KEY1_KID, &TestTokenBuilder::new().build());

    assert_eq!(
        gate.admit(&bearer(token)).await.unwrap_err(),
        invalid(InvalidTokenReason::DisallowedAlgorithm)
    );
    assert_eq!(jwks_request_count(&server).await, 0);
}

#[tokio::test]
async fn test_alg_none_token_rejected_without_fetch() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    let token = unsigned_token(KEY1_KID, &TestTokenBuilder::new().build());

    let err = gate.admit(&bearer(token)).await.unwrap_err();

    assert!(matches!(err, AdmissionError::InvalidSignatureOrClaims(_)));
    assert_eq!(jwks_request_count(&server).await, 0);
}

#[tokio::test]
async fn test_allowed_algorithm_not_matching_key_alg() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[("ALLOWED_ALGORITHMS", "RS256,PS256")]);

    // The published key declares RS256.
    let token = TestKeypair::primary()
        .sign_with_algorithm(Algorithm::PS256, &TestTokenBuilder::new().build());

    assert_eq!(
        gate.admit(&bearer(token)).await.unwrap_err(),
        invalid(InvalidTokenReason::KeyAlgorithmMismatch)
    );
}

#[tokio::test]
async fn test_es256_token_is_admitted() {
    let server = MockServer::start().await;
    mount_jwks(&server, jwks_json(&[&TestKeypair::ec_p256()])).await;
    let gate = test_gate(&server, &[("ALLOWED_ALGORITHMS", "ES256")]);

    let token = TestKeypair::ec_p256().sign(&TestTokenBuilder::new().for_user("ec-user").build());
    let claims = gate.admit(&bearer(token)).await.unwrap();

    assert_eq!(claims.sub.as_deref(), Some("ec-user"));
}

#[tokio::test]
async fn test_eddsa_token_is_admitted_from_mixed_key_set() {
    let server = MockServer::start().await;
    mount_jwks(
        &server,
        jwks_json(&[
            &TestKeypair::primary(),
            &TestKeypair::ec_p256(),
            &TestKeypair::ed25519(),
        ]),
    )
    .await;
    let gate = test_gate(&server, &[("ALLOWED_ALGORITHMS", "RS256,ES256,EdDSA")]);

    for key in [
        TestKeypair::primary(),
        TestKeypair::ec_p256(),
        TestKeypair::ed25519(),
    ] {
        let token = key.sign(&TestTokenBuilder::new().build());
        assert!(gate.admit(&bearer(token)).await.is_ok(), "kid {}", key.kid);
    }

    assert_eq!(gate.jwks_client().key_count().await, 3);
    assert_eq!(jwks_request_count(&server).await, 1);
}

#[tokio::test]
async fn test_es256_header_naming_rsa_key_is_mismatch() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[("ALLOWED_ALGORITHMS", "RS256,ES256")]);

    let token = TestKeypair::ec_p256()
        .with_kid(KEY1_KID)
        .sign(&TestTokenBuilder::new().build());

    assert_eq!(
        gate.admit(&bearer(token)).await.unwrap_err(),
        invalid(InvalidTokenReason::KeyAlgorithmMismatch)
    );
}

#[tokio::test]
async fn test_eddsa_not_allowed_by_default() {
    let server = MockServer::start().await;
    mount_jwks(&server, jwks_json(&[&TestKeypair::ed25519()])).await;
    let gate = test_gate(&server, &[]);

    let token = TestKeypair::ed25519().sign(&TestTokenBuilder::new().build());

    assert_eq!(
        gate.admit(&bearer(token)).await.unwrap_err(),
        invalid(InvalidTokenReason::DisallowedAlgorithm)
    );
    assert_eq!(jwks_request_count(&server).await, 0);
}

#[tokio::test]
async fn test_signature_from_other_key_rejected() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    // Signed by the secondary key but claiming the primary key's kid.
    let token = TestKeypair::secondary()
        .with_kid(KEY1_KID)
        .sign(&TestTokenBuilder::new().build());

    assert_eq!(
        gate.admit(&bearer(token)).await.unwrap_err(),
        invalid(InvalidTokenReason::BadSignature)
    );
}

#[tokio::test]
async fn test_tampered_payload_rejected() {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    let token = TestKeypair::primary().sign(&TestTokenBuilder::new().for_user("alice").build());
    let (header, rest) = token.split_once('.').unwrap();
    let (_, signature) = rest.split_once('.').unwrap();
    let forged_payload = URL_SAFE_NO_PAD.encode(
        TestTokenBuilder::new()
            .for_user("mallory")
            .build()
            .to_string(),
    );
    let forged = format!("{header}.{forged_payload}.{signature}");

    assert_eq!(
        gate.admit(&bearer(forged)).await.unwrap_err(),
        invalid(InvalidTokenReason::BadSignature)
    );
}

// ============================================================================
// Claims checks
// ============================================================================

#[tokio::test]
async fn test_expired_token_rejected() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    let token = TestKeypair::primary().sign(&TestTokenBuilder::new().expires_in(-60).build());

    assert_eq!(
        gate.admit(&bearer(token)).await.unwrap_err(),
        AdmissionError::ExpiredToken
    );
}

#[tokio::test]
async fn test_expired_token_with_wrong_claims_is_still_expired() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    let token = TestKeypair::primary().sign(
        &TestTokenBuilder::new()
            .expires_in(-60)
            .issuer("https://evil.example.com/")
            .audience("someone-else")
            .build(),
    );

    assert_eq!(
        gate.admit(&bearer(token)).await.unwrap_err(),
        AdmissionError::ExpiredToken
    );
}

#[tokio::test]
async fn test_expired_token_with_forged_signature_is_invalid() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    let token = TestKeypair::secondary()
        .with_kid(KEY1_KID)
        .sign(&TestTokenBuilder::new().expires_in(-60).build());

    assert_eq!(
        gate.admit(&bearer(token)).await.unwrap_err(),
        invalid(InvalidTokenReason::BadSignature)
    );
}

#[tokio::test]
async fn test_expiry_boundary() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);
    let now = Utc::now().timestamp();

    let at_now = TestKeypair::primary().sign(&TestTokenBuilder::new().expires_at(now).build());
    assert!(gate.admit_at(&bearer(at_now), now).await.is_ok());

    let just_before =
        TestKeypair::primary().sign(&TestTokenBuilder::new().expires_at(now - 1).build());
    assert_eq!(
        gate.admit_at(&bearer(just_before), now).await.unwrap_err(),
        AdmissionError::ExpiredToken
    );
}

#[tokio::test]
async fn test_clock_skew_leeway_admits_recently_expired() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[("JWT_CLOCK_SKEW_SECONDS", "120")]);

    let token = TestKeypair::primary().sign(&TestTokenBuilder::new().expires_in(-60).build());

    assert!(gate.admit(&bearer(token)).await.is_ok());
}

#[tokio::test]
async fn test_not_yet_valid_token_rejected() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    let token =
        TestKeypair::primary().sign(&TestTokenBuilder::new().not_before_in(300).build());

    assert_eq!(
        gate.admit(&bearer(token)).await.unwrap_err(),
        invalid(InvalidTokenReason::NotYetValid)
    );
}

#[tokio::test]
async fn test_wrong_issuer_rejected() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    for iss in [
        "https://evil.example.com/",
        "https://tenant.example.com",
        "http://tenant.example.com/",
    ] {
        let token = TestKeypair::primary().sign(&TestTokenBuilder::new().issuer(iss).build());
        assert_eq!(
            gate.admit(&bearer(token)).await.unwrap_err(),
            invalid(InvalidTokenReason::IssuerMismatch),
            "issuer {iss} should be rejected"
        );
    }
}

#[tokio::test]
async fn test_wrong_audience_rejected() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    let single = TestKeypair::primary().sign(&TestTokenBuilder::new().audience("other-api").build());
    assert_eq!(
        gate.admit(&bearer(single)).await.unwrap_err(),
        invalid(InvalidTokenReason::AudienceMismatch)
    );

    let array = TestKeypair::primary()
        .sign(&TestTokenBuilder::new().audiences(&["a", "b"]).build());
    assert_eq!(
        gate.admit(&bearer(array)).await.unwrap_err(),
        invalid(InvalidTokenReason::AudienceMismatch)
    );
}

#[tokio::test]
async fn test_token_without_exp_rejected() {
    let server = primary_key_server().await;
    let gate = test_gate(&server, &[]);

    let mut claims = TestTokenBuilder::new().build();
    claims.as_object_mut().unwrap().remove("exp");
    let token = TestKeypair::primary().sign(&claims);

    assert_eq!(
        gate.admit(&bearer(token)).await.unwrap_err(),
        invalid(InvalidTokenReason::MalformedClaims)
    );
}
