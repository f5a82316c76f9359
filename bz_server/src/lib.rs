//! HTTP server for the Betzona betting backend.
//!
//! The binary in `main.rs` only parses arguments and wires these modules
//! together; everything it serves lives here so integration tests can drive
//! the router directly.

pub mod api;
pub mod cache;
pub mod config;
pub mod logging;
pub mod metrics;
