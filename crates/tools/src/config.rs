//! Deployment configuration for the contract toolchain
//!
//! This module assembles the record the toolchain reads before compiling,
//! deploying and verifying contracts:
//!
//! - the fixed compiler version,
//! - one profile per network (RPC endpoint plus signing keys),
//! - the API key for the contract-verification service.
//!
//! Values come from an [`Environment`] snapshot. The resolver never fails:
//! a missing variable becomes an absent field, and the point of use decides
//! whether that is an error. [`Config::check_network`] runs those checks
//! ahead of time.
//!
//! # Examples
//!
//! ```rust,no_run
//! use chainkit_tools::config::{Config, Network};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load();
//! println!("Compiler: {}", config.compiler_version);
//! config.check_network(Network::Testnet)?;
//! # Ok(())
//! # }
//! ```

use crate::env::{Environment, DEFAULT_SECRETS_FILE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

/// Contract compiler version passed to the toolchain
pub const SOLIDITY_VERSION: &str = "0.8.17";

/// Test-network RPC endpoint
pub const TESTNET_URL_VAR: &str = "URL1";
/// Main-network RPC endpoint
pub const MAINNET_URL_VAR: &str = "URL2";
/// Signing key shared by both networks
pub const PRIVATE_KEY_VAR: &str = "PRIVATE_KEY";
/// Verification service credential
pub const API_KEY_VAR: &str = "API_KEY";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid network: {0}. Must be: testnet or mainnet")]
    InvalidNetwork(String),

    #[error("Invalid RPC URL for {network}: {reason}")]
    InvalidUrl { network: Network, reason: String },

    #[error("No signing keys configured for {0} (set PRIVATE_KEY)")]
    NoSigningKeys(Network),

    #[error("Serialization error: {0}")]
    Serialize(String),
}

/// Supported networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Public test network
    Testnet,
    /// Production network
    Mainnet,
}

impl Network {
    pub const ALL: [Network; 2] = [Network::Testnet, Network::Mainnet];

    /// Get network as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }

    /// Environment variable holding this network's RPC endpoint
    pub fn url_var(&self) -> &'static str {
        match self {
            Network::Testnet => TESTNET_URL_VAR,
            Network::Mainnet => MAINNET_URL_VAR,
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "testnet" | "goerli" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(ConfigError::InvalidNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How to reach and sign for one network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// RPC endpoint URL
    pub url: Option<String>,
    /// Signing keys, in order
    #[serde(default)]
    pub accounts: Vec<String>,
}

impl NetworkProfile {
    /// Keys that are present and non-empty
    pub fn signing_keys(&self) -> impl Iterator<Item = &str> {
        self.accounts.iter().map(String::as_str).filter(|k| !k.is_empty())
    }
}

/// Contract-verification service settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationConfig {
    pub api_key: Option<String>,
}

/// Resolved toolchain configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Compiler version selector
    pub compiler_version: &'static str,
    /// Network profiles by network
    pub networks: BTreeMap<Network, NetworkProfile>,
    /// Verification service settings
    pub verification: VerificationConfig,
}

impl Config {
    /// Load configuration from the process environment and `./process.env`
    pub fn load() -> Self {
        Self::load_from(DEFAULT_SECRETS_FILE)
    }

    /// Load configuration using a specific secrets file
    ///
    /// The file is optional. Variables already set in the process
    /// environment take precedence over the file.
    pub fn load_from(secrets_path: impl AsRef<Path>) -> Self {
        let env = Environment::load(secrets_path);
        Self::from_env(&env)
    }

    /// Build the record from an environment snapshot
    pub fn from_env(env: &Environment) -> Self {
        let var = |name: &str| env.get(name).map(str::to_string);

        // A single key signs for every network
        let accounts: Vec<String> = var(PRIVATE_KEY_VAR).into_iter().collect();

        let networks = Network::ALL
            .into_iter()
            .map(|network| {
                let profile = NetworkProfile {
                    url: var(network.url_var()),
                    accounts: accounts.clone(),
                };
                (network, profile)
            })
            .collect();

        let config = Config {
            compiler_version: SOLIDITY_VERSION,
            networks,
            verification: VerificationConfig {
                api_key: var(API_KEY_VAR),
            },
        };

        debug!(
            testnet_url = config.has_url(Network::Testnet),
            mainnet_url = config.has_url(Network::Mainnet),
            signing_keys = accounts.len(),
            api_key = config.verification.api_key.is_some(),
            "configuration resolved"
        );
        config
    }

    /// Profile for a network
    pub fn network(&self, network: Network) -> Option<&NetworkProfile> {
        self.networks.get(&network)
    }

    fn has_url(&self, network: Network) -> bool {
        self.network(network)
            .and_then(|p| p.url.as_deref())
            .is_some_and(|u| !u.is_empty())
    }

    /// Check that a network can be deployed to
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The endpoint URL is missing or empty
    /// - The URL does not parse or uses an unsupported scheme
    /// - No non-empty signing key is configured
    pub fn check_network(&self, network: Network) -> Result<(), ConfigError> {
        let profile = self
            .network(network)
            .ok_or_else(|| ConfigError::InvalidNetwork(network.to_string()))?;

        let url = profile
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ConfigError::MissingField(network.url_var().to_string()))?;
        Self::validate_url(network, url)?;

        if profile.signing_keys().next().is_none() {
            return Err(ConfigError::NoSigningKeys(network));
        }

        info!(%network, "network configuration ok");
        Ok(())
    }

    /// Check every network, collecting all failures
    pub fn check_all(&self) -> Vec<(Network, ConfigError)> {
        Network::ALL
            .into_iter()
            .filter_map(|network| self.check_network(network).err().map(|e| (network, e)))
            .collect()
    }

    /// Validate RPC URL format
    fn validate_url(network: Network, url: &str) -> Result<(), ConfigError> {
        let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
            network,
            reason: e.to_string(),
        })?;

        match parsed.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => {
                return Err(ConfigError::InvalidUrl {
                    network,
                    reason: format!("unsupported scheme '{}'", other),
                })
            }
        }

        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::InvalidUrl {
                network,
                reason: "missing host".to_string(),
            });
        }

        Ok(())
    }

    /// Copy with signing keys and the API key masked
    pub fn redacted(&self) -> Self {
        let networks = self
            .networks
            .iter()
            .map(|(network, profile)| {
                let profile = NetworkProfile {
                    url: profile.url.clone(),
                    accounts: profile.accounts.iter().map(|k| mask(k)).collect(),
                };
                (*network, profile)
            })
            .collect();

        Config {
            compiler_version: self.compiler_version,
            networks,
            verification: VerificationConfig {
                api_key: self.verification.api_key.as_deref().map(mask),
            },
        }
    }

    /// Print the resolved configuration, secrets masked
    pub fn print_summary(&self) {
        let shown = self.redacted();
        println!("╔════════════════════════════════════════════════════════════════╗");
        println!("║          TOOLCHAIN DEPLOYMENT CONFIGURATION RESOLVED           ║");
        println!("╚════════════════════════════════════════════════════════════════╝");
        println!("  Compiler:            solc {}", shown.compiler_version);

        for (network, profile) in &shown.networks {
            println!("  [{}]", network);
            match profile.url.as_deref() {
                Some(url) if !url.is_empty() => println!("    RPC URL:           {}", url),
                _ => println!("    RPC URL:           (not configured)"),
            }
            if profile.accounts.is_empty() {
                println!("    Accounts:          (not configured)");
            } else {
                println!("    Accounts:          {}", profile.accounts.join(", "));
            }
        }

        match shown.verification.api_key.as_deref() {
            Some(key) => println!("  Verification Key:    {}", key),
            None => println!("  Verification Key:    (not configured)"),
        }

        println!("╚════════════════════════════════════════════════════════════════╝");
    }

    /// Get configuration as JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Get configuration as TOML. Absent values are omitted.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

/// Keep a short prefix of long secrets, hide short ones entirely
fn mask(secret: &str) -> String {
    const VISIBLE: usize = 6;
    if secret.is_empty() {
        return String::new();
    }
    if secret.chars().count() <= VISIBLE * 2 {
        return "…".to_string();
    }
    let prefix: String = secret.chars().take(VISIBLE).collect();
    format!("{}…", prefix)
}

// Manual Serialize impl so the record keeps the toolchain's field names
impl Serialize for Config {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let networks: BTreeMap<&str, &NetworkProfile> = self
            .networks
            .iter()
            .map(|(network, profile)| (network.as_str(), profile))
            .collect();

        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("compilerVersion", self.compiler_version)?;
        map.serialize_entry("networks", &networks)?;
        map.serialize_entry("verification", &self.verification)?;
        map.end()
    }
}
