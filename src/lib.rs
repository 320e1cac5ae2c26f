//! Distributed service registry and job dispatcher for media processing clusters.

#![warn(unused_crate_dependencies)]
// These dependencies are only used in the binary (src/bin/main.rs)
// Test dependencies are only used in test code
#[cfg(test)]
use assert_cmd as _;
use ctrlc as _;
// OpenSSL is only needed for static linking on Linux
#[cfg(target_os = "linux")]
use openssl_sys as _;
#[cfg(test)]
use predicates as _;
use serde_json as _;
use tracing_subscriber as _;

/// CLI parsing.
pub mod cli;

/// Worker HTTP client.
pub mod client;

/// Config loading.
pub mod config;

/// Constants.
pub mod constants;

/// Node lifecycle daemon.
pub mod daemon;

/// Identity resolution.
pub mod directory;

/// Periodic job dispatcher.
pub mod dispatcher;

/// Errors.
pub mod error;

/// Service-health state machine.
pub mod health;

/// Service liveness probing.
pub mod heartbeat;

/// Data model.
pub mod model;

/// Registry API.
pub mod registry;

/// Runtime paths and modes.
pub mod runtime;

/// Job statistics.
pub mod stats;

/// Persistence contract and memory store.
pub mod store;

/// Test utils.
#[doc(hidden)]
pub mod test_utils;

/// Job XML wire format.
pub mod wire;
