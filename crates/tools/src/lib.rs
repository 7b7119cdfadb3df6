//! Chainkit Tools Library
//!
//! Resolves the compiler, network and verification settings used by the
//! contract toolchain from the environment and a local secrets file.

pub mod config;
pub mod env;
pub mod logging;

pub use config::{Config, ConfigError, Network, NetworkProfile, VerificationConfig, SOLIDITY_VERSION};
pub use env::{Environment, DEFAULT_SECRETS_FILE};
