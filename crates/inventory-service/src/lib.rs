//! Inventory Service Library
//!
//! An HTTP inventory API whose single business endpoint is protected by
//! bearer-token authentication. Tokens are verified against the identity
//! provider's published JWKS, which is cached with a TTL and refreshed with
//! at most one in-flight fetch.
//!
//! # Request Flow
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth/gate.rs -> auth/jwks.rs
//!                                     -> handlers/inventory.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Bearer extraction, JWKS cache, admission gate, claims
//! - `config` - Service configuration from environment
//! - `errors` - Admission error taxonomy with HTTP mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Admission and HTTP metrics middleware
//! - `models` - Response bodies
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
