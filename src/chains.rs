//! Chain registry: the immutable table of chains whose vault deposits are reconciled.
//!
//! The table is loaded once at startup, either from the built-in defaults or from the JSON file
//! named by `CHAINS_CONFIG_PATH`, and is shared read-only by the fetcher and the reconciler.

use crate::{
    config::Config,
    constants::{BASE_CHAIN_ID, BASE_EXPLORER_API_URL, BASE_USDC, BASE_VAULT_CONTRACT},
    error::{AppError, Result},
};
use anyhow::Context;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub chain_id: String,
    pub name: String,
    pub explorer_api_url: String,
    #[serde(default, skip_serializing)]
    pub explorer_api_key: String,
    pub vault_contract_address: String,
    /// Discard transfers of tokens missing from `erc20_tokens`.
    #[serde(default)]
    pub only_tracked_tokens: bool,
    #[serde(default)]
    pub erc20_tokens: BTreeMap<String, TokenInfo>,
}

impl ChainConfig {
    /// Case-insensitive match against the vault address.
    pub fn is_vault(&self, address: &str) -> bool {
        normalize_address(address) == normalize_address(&self.vault_contract_address)
    }

    pub fn token(&self, address: &str) -> Option<&TokenInfo> {
        self.erc20_tokens.get(&normalize_address(address))
    }

    fn validate(&mut self) -> anyhow::Result<()> {
        if self.chain_id.trim().is_empty() {
            anyhow::bail!("chain id must not be empty");
        }
        url::Url::parse(&self.explorer_api_url).with_context(|| {
            format!(
                "chain {}: invalid explorer url {}",
                self.chain_id, self.explorer_api_url
            )
        })?;
        parse_address(&self.vault_contract_address)
            .with_context(|| format!("chain {}: invalid vault address", self.chain_id))?;

        let mut tokens = BTreeMap::new();
        for (address, info) in std::mem::take(&mut self.erc20_tokens) {
            parse_address(&address)
                .with_context(|| format!("chain {}: invalid token {}", self.chain_id, address))?;
            if tokens.insert(normalize_address(&address), info).is_some() {
                anyhow::bail!("chain {}: duplicate token {}", self.chain_id, address);
            }
        }
        self.erc20_tokens = tokens;

        if self.explorer_api_key.trim().is_empty() {
            tracing::warn!("Chain {} has no explorer API key", self.chain_id);
        }
        Ok(())
    }
}

pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

fn parse_address(address: &str) -> anyhow::Result<Address> {
    let trimmed = address.trim();
    if !trimmed.starts_with("0x") || trimmed.len() != 42 {
        anyhow::bail!("expected a 0x-prefixed 20-byte address, got {}", address);
    }
    trimmed
        .parse::<Address>()
        .map_err(|e| anyhow::anyhow!("{}: {}", address, e))
}

/// Read-only lookup of configured chains.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: BTreeMap<String, ChainConfig>,
}

impl ChainRegistry {
    pub fn new(chains: impl IntoIterator<Item = ChainConfig>) -> anyhow::Result<Self> {
        let mut table = BTreeMap::new();
        for mut chain in chains {
            chain.validate()?;
            let id = chain.chain_id.clone();
            if table.insert(id.clone(), chain).is_some() {
                anyhow::bail!("duplicate chain id {}", id);
            }
        }
        Ok(Self { chains: table })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        match config.chains_config_path.as_deref() {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading chain table {}", path))?;
                Self::from_json(&raw, &config.etherscan_api_key)
            }
            None => Self::builtin(&config.etherscan_api_key),
        }
    }

    /// Parses `{ "<chainId>": ChainConfig }`; chains without a key use `default_api_key`.
    pub fn from_json(raw: &str, default_api_key: &str) -> anyhow::Result<Self> {
        let parsed: BTreeMap<String, ChainConfig> =
            serde_json::from_str(raw).context("parsing chain table")?;
        let chains = parsed.into_iter().map(|(chain_id, mut chain)| {
            chain.chain_id = chain_id;
            if chain.explorer_api_key.trim().is_empty() {
                chain.explorer_api_key = default_api_key.to_string();
            }
            chain
        });
        Self::new(chains)
    }

    pub fn builtin(api_key: &str) -> anyhow::Result<Self> {
        let mut tokens = BTreeMap::new();
        tokens.insert(
            BASE_USDC.to_string(),
            TokenInfo {
                name: "USD Coin".to_string(),
                symbol: "USDC".to_string(),
                decimals: 6,
            },
        );

        Self::new([ChainConfig {
            chain_id: BASE_CHAIN_ID.to_string(),
            name: "Base".to_string(),
            explorer_api_url: BASE_EXPLORER_API_URL.to_string(),
            explorer_api_key: api_key.to_string(),
            vault_contract_address: BASE_VAULT_CONTRACT.to_string(),
            only_tracked_tokens: false,
            erc20_tokens: tokens,
        }])
    }

    pub fn get_chain(&self, chain_id: &str) -> Result<&ChainConfig> {
        self.chains
            .get(chain_id)
            .ok_or_else(|| AppError::UnsupportedChain(chain_id.to_string()))
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }

    pub fn chains(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
