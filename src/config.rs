//! Configuration module for the transaction pipeline
//!
//! This module handles configuration loading from TOML files and
//! `TXFLOW_*` environment variables, and provides structured configuration
//! types for the worker pool, RPC engine, chain, era policy, fee cache and
//! logging.

use crate::types::{ChainFamily, ChainModel};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// RPC endpoint configuration
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Chain the service talks to
    #[serde(default)]
    pub chain: ChainConfig,

    /// Transaction lifetime policy
    #[serde(default)]
    pub era: EraConfig,

    /// Fee proxy cache
    #[serde(default)]
    pub fee: FeeConfig,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of operation bodies running at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_operations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC HTTP endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_chain_id")]
    pub chain_id: String,

    #[serde(default = "default_chain_name")]
    pub name: String,

    /// "substrate" or "evm"
    #[serde(default = "default_family")]
    pub family: String,

    /// Numeric chain id, required for EVM chains
    #[serde(default)]
    pub evm_chain_id: Option<u64>,

    #[serde(default)]
    pub default_tip: Option<u64>,

    #[serde(default)]
    pub fee_via_runtime_call: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EraConfig {
    /// Build mortal transactions; immortal otherwise
    #[serde(default = "default_true")]
    pub mortal: bool,

    /// Mortal period in blocks, rounded to a power of two
    #[serde(default = "default_era_period")]
    pub period: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Maximum number of loaded fee entries kept in the cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    #[serde(default = "default_true")]
    pub with_target: bool,
}

// Default value functions
fn default_max_concurrent() -> usize { 8 }
fn default_endpoint() -> String { "http://127.0.0.1:9933".to_string() }
fn default_rpc_timeout_ms() -> u64 { 30_000 }
fn default_chain_id() -> String { "local".to_string() }
fn default_chain_name() -> String { "Local Testnet".to_string() }
fn default_family() -> String { "substrate".to_string() }
fn default_true() -> bool { true }
fn default_era_period() -> u64 { 64 }
fn default_cache_capacity() -> usize { 64 }
fn default_log_level() -> String { "info".to_string() }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations: default_max_concurrent(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_ms: default_rpc_timeout_ms(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            name: default_chain_name(),
            family: default_family(),
            evm_chain_id: None,
            default_tip: None,
            fee_via_runtime_call: false,
        }
    }
}

impl Default for EraConfig {
    fn default() -> Self {
        Self {
            mortal: true,
            period: default_era_period(),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            with_target: true,
        }
    }
}

impl ChainConfig {
    /// Convert into the chain model used by the services
    pub fn to_chain_model(&self) -> Result<ChainModel, ConfigError> {
        let family = match self.family.to_ascii_lowercase().as_str() {
            "substrate" => ChainFamily::Substrate,
            "evm" => ChainFamily::Evm {
                chain_id: self.evm_chain_id.ok_or_else(|| {
                    ConfigError::Validation("chain.evm_chain_id is required for evm chains".to_string())
                })?,
            },
            other => {
                return Err(ConfigError::Validation(format!(
                    "unknown chain family '{}'",
                    other
                )))
            }
        };

        Ok(ChainModel {
            chain_id: self.chain_id.clone(),
            name: self.name.clone(),
            family,
            default_tip: self.default_tip.map(u128::from),
            fee_via_runtime_call: self.fee_via_runtime_call,
        })
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `.env` and `TXFLOW_*` environment overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides looked up by `TXFLOW_*` key
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidOverride {
                    key: key.to_string(),
                    value,
                })
        }

        if let Some(value) = lookup("TXFLOW_RPC_ENDPOINT") {
            self.rpc.endpoint = value;
        }
        if let Some(value) = lookup("TXFLOW_RPC_TIMEOUT_MS") {
            self.rpc.timeout_ms = parse("TXFLOW_RPC_TIMEOUT_MS", value)?;
        }
        if let Some(value) = lookup("TXFLOW_QUEUE_MAX_CONCURRENT") {
            self.queue.max_concurrent_operations = parse("TXFLOW_QUEUE_MAX_CONCURRENT", value)?;
        }
        if let Some(value) = lookup("TXFLOW_FEE_CACHE_CAPACITY") {
            self.fee.cache_capacity = parse("TXFLOW_FEE_CACHE_CAPACITY", value)?;
        }
        if let Some(value) = lookup("TXFLOW_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = lookup("TXFLOW_LOG_JSON") {
            self.logging.json = parse("TXFLOW_LOG_JSON", value)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.max_concurrent_operations == 0 {
            return Err(ConfigError::Validation(
                "queue.max_concurrent_operations must be greater than 0".to_string(),
            ));
        }
        if self.rpc.endpoint.is_empty() {
            return Err(ConfigError::Validation("rpc.endpoint must not be empty".to_string()));
        }
        if self.rpc.timeout_ms == 0 {
            return Err(ConfigError::Validation("rpc.timeout_ms must be greater than 0".to_string()));
        }
        if self.fee.cache_capacity == 0 {
            return Err(ConfigError::Validation("fee.cache_capacity must be greater than 0".to_string()));
        }
        if self.era.mortal && self.era.period < 4 {
            return Err(ConfigError::Validation("era.period must be at least 4".to_string()));
        }
        self.chain.to_chain_model()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fee.cache_capacity, 64);
        assert_eq!(config.era.period, 64);
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[rpc]
endpoint = "http://node.example:9933"

[chain]
chain_id = "eth"
name = "Ethereum"
family = "evm"
evm_chain_id = 1
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.rpc.endpoint, "http://node.example:9933");
        assert_eq!(config.rpc.timeout_ms, 30_000);
        assert_eq!(config.queue.max_concurrent_operations, 8);
        assert_eq!(
            config.chain.to_chain_model().unwrap().family,
            ChainFamily::Evm { chain_id: 1 }
        );
    }

    #[test]
    fn test_evm_requires_chain_id() {
        let mut config = Config::default();
        config.chain.family = "evm".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("TXFLOW_RPC_ENDPOINT", "http://override:9933"),
            ("TXFLOW_FEE_CACHE_CAPACITY", "8"),
            ("TXFLOW_LOG_JSON", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.rpc.endpoint, "http://override:9933");
        assert_eq!(config.fee.cache_capacity, 8);
        assert!(config.logging.json);
    }

    #[test]
    fn test_invalid_override() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|key| (key == "TXFLOW_RPC_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }
}
