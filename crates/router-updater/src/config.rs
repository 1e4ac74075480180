use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_primitives::Address;
use router_core::{
    ConfigError, Create2Factory, StoreScope, DEFAULT_FACTORY, DEFAULT_VANITY_PREFIX, ROUTER_ROLE,
};
use serde::{Deserialize, Serialize};

/// How the delay grows between verification attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

/// Bounded retry policy for source verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Delay to wait before attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = Duration::from_millis(self.delay_ms);
        match self.backoff {
            Backoff::Fixed => base,
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            delay_ms: 10_000,
            backoff: Backoff::Fixed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// JSON-RPC endpoint of the node holding the sender's key
    pub rpc_url: String,
    /// Account transactions are sent from (node-managed signer)
    pub sender: Option<Address>,
    /// Ethereum chain ID (1=mainnet, 11155111=sepolia)
    pub chain_id: u64,
    /// Deployment environment (dev, beta, prod)
    pub env: String,
    /// Network name used in the address book file name
    pub network: String,
    /// Directory holding `addresses-{env}-{network}.json`
    pub data_dir: PathBuf,
    /// Directory holding `{env}.json` deploy records
    pub records_dir: PathBuf,
    /// Build output with `fun-sig/` and `bytecode/`
    pub artifacts_dir: PathBuf,
    pub factory: Address,
    pub vanity_prefix: String,
    /// Address book key of the router proxy
    pub router_key: String,
    pub gas_limit: u64,
    pub poll_interval_ms: u64,
    pub confirmation_timeout_ms: u64,
    /// Run source verification after fresh deployments
    pub verify: bool,
    pub verify_retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".into(),
            sender: None,
            chain_id: 11155111, // Sepolia
            env: "dev".into(),
            network: "sepolia".into(),
            data_dir: PathBuf::from("."),
            records_dir: PathBuf::from("./create2"),
            artifacts_dir: PathBuf::from("./target"),
            factory: DEFAULT_FACTORY,
            vanity_prefix: DEFAULT_VANITY_PREFIX.into(),
            router_key: ROUTER_ROLE.into(),
            gas_limit: 9_000_000,
            poll_interval_ms: 1_000,
            confirmation_timeout_ms: 300_000,
            verify: false,
            verify_retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Load from a JSON file; absent keys keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn scope(&self) -> StoreScope {
        StoreScope::new(&self.env, &self.network)
    }

    pub fn factory(&self) -> Create2Factory {
        Create2Factory::new(self.factory)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}
