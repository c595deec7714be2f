//! HTTP request handlers for the inventory service.

pub mod health;
pub mod inventory;
pub mod metrics;

pub use health::{health_check, readiness_check};
pub use inventory::inventory_handler;
pub use metrics::metrics_handler;
