//! Environment configuration

use std::str::FromStr;

use anyhow::{Context, Result};
use bitcoin::Network;

use chainsig::signer::near::{DEFAULT_MPC_CONTRACT_ID, DEFAULT_NEAR_RPC_URL};
use chainsig::signer::NearSignerConfig;
use chainsig::transaction::{ProviderConfig, DEFAULT_ETHEREUM_CHAIN_ID, DEFAULT_FEE_SATS};

pub const DEFAULT_ETHEREUM_RPC_URL: &str = "https://ethereum-sepolia-rpc.publicnode.com";
pub const DEFAULT_BITCOIN_API_URL: &str = "https://mempool.space/testnet4/api";
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 30;

/// Settings read once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// `MPC_PUBLIC_KEY`
    pub master_public_key: String,
    /// `NEAR_ACCOUNT_ID`
    pub account_id: String,
    /// `MPC_PATH`
    pub path: String,
    pub near_private_key: String,
    pub mpc_contract_id: String,
    pub near_rpc_url: String,
    pub ethereum_rpc_url: String,
    pub ethereum_chain_id: u64,
    pub bitcoin_api_url: String,
    pub bitcoin_network: Network,
    pub bitcoin_fee_sats: u64,
    pub rpc_timeout_secs: u64,
}

impl Config {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            master_public_key: string("MPC_PUBLIC_KEY", ""),
            account_id: string("NEAR_ACCOUNT_ID", ""),
            path: string("MPC_PATH", ""),
            near_private_key: string("NEAR_PRIVATE_KEY", ""),
            mpc_contract_id: string("MPC_CONTRACT_ID", DEFAULT_MPC_CONTRACT_ID),
            near_rpc_url: string("NEAR_RPC_URL", DEFAULT_NEAR_RPC_URL),
            ethereum_rpc_url: string("ETHEREUM_RPC_URL", DEFAULT_ETHEREUM_RPC_URL),
            ethereum_chain_id: parse_var(&lookup, "ETHEREUM_CHAIN_ID", DEFAULT_ETHEREUM_CHAIN_ID)?,
            bitcoin_api_url: string("BITCOIN_API_URL", DEFAULT_BITCOIN_API_URL),
            bitcoin_network: parse_var(&lookup, "BITCOIN_NETWORK", Network::Testnet)?,
            bitcoin_fee_sats: parse_var(&lookup, "BITCOIN_FEE_SATS", DEFAULT_FEE_SATS)?,
            rpc_timeout_secs: parse_var(&lookup, "RPC_TIMEOUT_SECS", DEFAULT_RPC_TIMEOUT_SECS)?,
        })
    }

    pub fn near_signer_config(&self) -> NearSignerConfig {
        let mut config = NearSignerConfig::new(&self.account_id, &self.near_private_key);
        config.rpc_url = self.near_rpc_url.clone();
        config.contract_id = self.mpc_contract_id.clone();
        config.timeout = Some(self.rpc_timeout_secs);
        config
    }

    pub fn ethereum_provider(&self) -> ProviderConfig {
        ProviderConfig::new(&self.ethereum_rpc_url).with_timeout(self.rpc_timeout_secs)
    }

    pub fn bitcoin_provider(&self) -> ProviderConfig {
        ProviderConfig::new(&self.bitcoin_api_url).with_timeout(self.rpc_timeout_secs)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("invalid {}: {:?}", key, value)),
        _ => Ok(default),
    }
}
