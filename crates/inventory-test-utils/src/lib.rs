//! # Inventory Test Utilities
//!
//! Shared test utilities for the inventory service.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed RSA keys and their JWKs)
//! - Test data builders (`TestTokenBuilder`)
//! - Mock JWKS endpoint helpers (wiremock)
//! - Server test harness (`TestInventoryServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use inventory_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let jwks = MockServer::start().await;
//!     let key = TestKeypair::primary();
//!     mount_jwks(&jwks, jwks_json(&[&key])).await;
//!
//!     let token = key.sign(&TestTokenBuilder::new().build());
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_mock;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_mock::*;
pub use server_harness::*;
pub use token_builders::*;
