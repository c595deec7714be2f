//! Common utilities shared across the inventory workspace crates.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (header parsing, time-window checks, constants)
pub mod jwt;
