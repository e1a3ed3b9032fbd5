use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Result, WalletError};

pub const SEPOLIA_CHAIN_ID: u64 = 11155111;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub gas: GasConfig,
    pub confirm: ConfirmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Candidate RPC endpoints, tried in order until one answers a
    /// latest-block probe.
    pub endpoints: Vec<String>,
    pub chain_id: u64,
    pub explorer_url: Option<String>,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    /// Fixed limit for state-changing contract calls; no estimation step.
    pub call_gas_limit: u64,
    /// Fixed limit for plain value transfers.
    pub transfer_gas_limit: u64,
    /// Upward buffer applied to the quoted gas price so back-to-back
    /// submissions are not rejected as underpriced replacements.
    pub price_buffer_percent: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmConfig {
    pub receipt_timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                endpoints: vec![
                    "https://eth-sepolia.g.alchemy.com/v2/demo".to_string(),
                    "https://rpc.sepolia.org".to_string(),
                    "https://ethereum-sepolia.blockpi.network/v1/rpc/public".to_string(),
                ],
                chain_id: SEPOLIA_CHAIN_ID,
                explorer_url: Some("https://sepolia.etherscan.io".to_string()),
                connect_timeout_secs: 10,
            },
            gas: GasConfig {
                call_gas_limit: 300_000,
                transfer_gas_limit: 21_000,
                price_buffer_percent: 20,
            },
            confirm: ConfirmConfig {
                receipt_timeout_secs: 120,
                poll_interval_secs: 2,
            },
        }
    }
}

impl Config {
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WalletError::ConfigNotFound(path.display().to_string())
            } else {
                WalletError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
            }
        })?;

        toml::from_str(&content).map_err(|e| {
            WalletError::InvalidConfig(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Load configuration with fallback to defaults. An explicitly named but
    /// broken config file is a hard error; an absent implicit one is not.
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(path) => {
                let config = Self::load_from_file(path).await?;
                tracing::info!("Loaded configuration from file");
                Ok(config)
            }
            None => match Self::default_config_path() {
                Ok(default_path) if default_path.exists() => {
                    Self::load_from_file(default_path).await
                }
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.network.connect_timeout_secs)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm.receipt_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.confirm.poll_interval_secs)
    }

    pub fn explorer_tx_url(&self, tx_hash: &str) -> Option<String> {
        self.network
            .explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), tx_hash))
    }

    pub fn default_config_path() -> Result<std::path::PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            WalletError::InvalidConfig("could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("vault-wallet").join("config.toml"))
    }

    pub fn generate_sample() -> String {
        let sample = r#"# vault-wallet configuration

[network]
# Candidate Sepolia RPC endpoints, tried in order at startup.
endpoints = [
    "https://eth-sepolia.g.alchemy.com/v2/demo",
    "https://rpc.sepolia.org",
    "https://ethereum-sepolia.blockpi.network/v1/rpc/public",
]
chain_id = 11155111
explorer_url = "https://sepolia.etherscan.io"
connect_timeout_secs = 10

[gas]
call_gas_limit = 300000
transfer_gas_limit = 21000
price_buffer_percent = 20

[confirm]
receipt_timeout_secs = 120
poll_interval_secs = 2
"#;
        sample.to_string()
    }
}

/// Deployed-contract addresses, read from an external JSON file:
/// `{"contracts": {"MockUSDC": {"address": "0x..."}, ...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    pub contracts: HashMap<String, ContractEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractEntry {
    pub address: String,
}

impl ContractsConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WalletError::ConfigNotFound(path.display().to_string())
            } else {
                WalletError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
            }
        })?;

        serde_json::from_str(&content).map_err(|e| {
            WalletError::InvalidConfig(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    pub fn address_of(&self, name: &str) -> Result<Address> {
        let entry = self
            .contracts
            .get(name)
            .ok_or_else(|| WalletError::InvalidConfig(format!("missing contract entry '{}'", name)))?;
        Address::from_str(&entry.address)
            .map_err(|e| WalletError::InvalidConfig(format!("bad address for '{}': {}", name, e)))
    }

    pub fn usdc(&self) -> Result<Address> {
        self.address_of("MockUSDC")
    }

    pub fn vault(&self) -> Result<Address> {
        self.address_of("BrowserVault")
    }

    pub fn reward_pool(&self) -> Result<Address> {
        self.address_of("RewardPool")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_sepolia() {
        let config = Config::default();
        assert_eq!(config.network.chain_id, SEPOLIA_CHAIN_ID);
        assert_eq!(config.network.endpoints.len(), 3);
        assert_eq!(config.gas.price_buffer_percent, 20);
    }

    #[test]
    fn sample_config_parses() {
        let config: Config = toml::from_str(&Config::generate_sample()).unwrap();
        assert_eq!(config.gas.call_gas_limit, 300_000);
        assert_eq!(config.confirm.receipt_timeout_secs, 120);
    }

    #[test]
    fn contracts_config_resolves_required_keys() {
        let raw = r#"{
            "contracts": {
                "MockUSDC": {"address": "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"},
                "BrowserVault": {"address": "0x0000000000000000000000000000000000000001"},
                "RewardPool": {"address": "0x0000000000000000000000000000000000000002"}
            }
        }"#;
        let config: ContractsConfig = serde_json::from_str(raw).unwrap();
        assert!(config.usdc().is_ok());
        assert!(config.vault().is_ok());
        assert!(config.reward_pool().is_ok());
        assert!(config.address_of("Unknown").is_err());
    }

    #[test]
    fn explorer_link_formats_tx() {
        let config = Config::default();
        let url = config.explorer_tx_url("0xabc").unwrap();
        assert_eq!(url, "https://sepolia.etherscan.io/tx/0xabc");
    }
}
