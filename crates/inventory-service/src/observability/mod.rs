//! Observability module for the inventory service.
//!
//! Provides metrics definitions and recording helpers.

pub mod metrics;
