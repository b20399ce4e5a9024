//! Configuration management for chainsig
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::signer::PayloadOrder;

use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub signer: SignerConfig,
    pub derivation: DerivationConfig,
    pub chains: HashMap<String, ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignerConfig {
    pub url: String,
    pub derivation_path: String,
    #[serde(default = "default_signer_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub payload_order: PayloadOrder,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DerivationConfig {
    pub master_public_key: String,
    pub account_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub currency: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    pub rpc_urls: Vec<String>,
    pub explorer: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_deploy_gas_limit")]
    pub deploy_gas_limit: u64,
    /// Gas limit for state-changing contract calls
    #[serde(default = "default_call_gas_limit")]
    pub call_gas_limit: u64,
    pub fee_oracle_url: Option<String>,
    pub fallback_gas_price_gwei: u64,
    #[serde(default = "default_balance_check_delay_secs")]
    pub balance_check_delay_secs: u64,
    pub address: Option<String>,
    pub enabled: bool,
}

fn default_signer_timeout_secs() -> u64 {
    60
}

fn default_decimals() -> u32 {
    18
}

fn default_gas_limit() -> u64 {
    21_000
}

fn default_deploy_gas_limit() -> u64 {
    6_000_000
}

fn default_call_gas_limit() -> u64 {
    1_000_000
}

fn default_balance_check_delay_secs() -> u64 {
    60
}

impl SignerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ChainConfig {
    /// Fallback gas price in wei, used when the fee feed has nothing usable
    pub fn fallback_gas_price(&self) -> U256 {
        U256::from(self.fallback_gas_price_gwei) * U256::exp10(9)
    }

    pub fn balance_check_delay(&self) -> Duration {
        Duration::from_secs(self.balance_check_delay_secs)
    }

    pub fn tx_link(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer.trim_end_matches('/'), tx_hash)
    }

    pub fn address_link(&self, address: &str) -> String {
        format!("{}/address/{}", self.explorer.trim_end_matches('/'), address)
    }
}

impl Settings {
    /// Load settings from the file named by `CHAINSIG_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("CHAINSIG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(raw);

        let mut settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        // An unset ${VAR} leaves an empty address
        for chain in settings.chains.values_mut() {
            if chain.address.as_deref().is_some_and(|a| a.trim().is_empty()) {
                chain.address = None;
            }
        }

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.signer.url.is_empty() {
            anyhow::bail!("Signer URL must be set");
        }
        if self.signer.timeout_secs == 0 {
            anyhow::bail!("Signer timeout must be non-zero");
        }

        // At least one chain must be enabled
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        for (name, chain) in &self.chains {
            if !chain.enabled {
                continue;
            }
            if chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", name);
            }
            if chain.fallback_gas_price_gwei == 0 {
                anyhow::bail!("Chain {} needs a non-zero fallback gas price", name);
            }
            match &chain.address {
                Some(address) => {
                    address
                        .parse::<Address>()
                        .with_context(|| format!("Chain {} has an invalid address", name))?;
                }
                None => {
                    tracing::warn!("Chain {} has no sender address - sends will fail", name);
                }
            }
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get an enabled chain by its config key
    pub fn chain(&self, name: &str) -> Result<&ChainConfig> {
        match self.chains.get(name) {
            Some(chain) if chain.enabled => Ok(chain),
            Some(_) => anyhow::bail!("Chain {} is disabled", name),
            None => anyhow::bail!("Chain {} is not configured", name),
        }
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
