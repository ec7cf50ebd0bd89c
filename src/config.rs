use crate::constants::{
    DEFAULT_EXPLORER_TIMEOUT_SECS, DEFAULT_HEAD_CONFIRMATIONS, DEFAULT_MAX_PAGES_PER_RUN,
    DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_RESULTS_PER_PAGE, EXPLORER_RESULT_WINDOW,
};
use anyhow::Context;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // CORS
    pub cors_allowed_origins: String,

    // Explorer
    pub etherscan_api_key: String,
    pub chains_config_path: Option<String>,
    pub explorer_timeout_secs: u64,
    pub explorer_page_size: u32,
    pub max_pages_per_run: u32,
    pub resolve_chain_head: bool,
    pub head_confirmations: u64,

    /// `chainId:block` pairs written over the stored watermarks at startup.
    pub watermark_resets: Vec<(String, u64)>,

    // Scheduler
    pub enable_deposit_scheduler: bool,
    pub reconcile_interval_secs: u64,
}

// Internal helper that checks conditions for `env_flag`.
fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            normalized == "1" || normalized == "true" || normalized == "yes" || normalized == "on"
        })
        .unwrap_or(default)
}

// Internal helper that supports `env_non_empty` operations.
fn env_non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses `8453:1000,137:0`.
fn parse_watermark_resets(raw: &str) -> anyhow::Result<Vec<(String, u64)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> anyhow::Result<(String, u64)> {
            let (chain_id, block) = entry
                .split_once(':')
                .with_context(|| format!("WATERMARK_RESETS entry {:?} is not chainId:block", entry))?;
            let chain_id = chain_id.trim();
            if chain_id.is_empty() {
                anyhow::bail!("WATERMARK_RESETS entry {:?} has no chain id", entry);
            }
            let block = block
                .trim()
                .parse::<u64>()
                .with_context(|| format!("WATERMARK_RESETS entry {:?} has an invalid block", entry))?;
            Ok((chain_id.to_string(), block))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),

            etherscan_api_key: env::var("ETHERSCAN_API_KEY").unwrap_or_default(),
            chains_config_path: env_non_empty("CHAINS_CONFIG_PATH"),
            explorer_timeout_secs: env::var("EXPLORER_TIMEOUT_SECS")
                .unwrap_or_else(|_| DEFAULT_EXPLORER_TIMEOUT_SECS.to_string())
                .parse()?,
            explorer_page_size: env::var("EXPLORER_PAGE_SIZE")
                .unwrap_or_else(|_| DEFAULT_RESULTS_PER_PAGE.to_string())
                .parse()?,
            max_pages_per_run: env::var("MAX_PAGES_PER_RUN")
                .unwrap_or_else(|_| DEFAULT_MAX_PAGES_PER_RUN.to_string())
                .parse()?,
            resolve_chain_head: env_flag("RESOLVE_CHAIN_HEAD", false),
            head_confirmations: env::var("HEAD_CONFIRMATIONS")
                .unwrap_or_else(|_| DEFAULT_HEAD_CONFIRMATIONS.to_string())
                .parse()?,

            watermark_resets: match env_non_empty("WATERMARK_RESETS") {
                Some(raw) => parse_watermark_resets(&raw)?,
                None => Vec::new(),
            },

            enable_deposit_scheduler: env_flag("ENABLE_DEPOSIT_SCHEDULER", true),
            reconcile_interval_secs: env::var("RECONCILE_INTERVAL_SECS")
                .unwrap_or_else(|_| DEFAULT_RECONCILE_INTERVAL_SECS.to_string())
                .parse()?,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.explorer_page_size == 0 {
            anyhow::bail!("EXPLORER_PAGE_SIZE must be positive");
        }
        if u64::from(self.explorer_page_size) > EXPLORER_RESULT_WINDOW {
            anyhow::bail!("EXPLORER_PAGE_SIZE must not exceed {}", EXPLORER_RESULT_WINDOW);
        }
        if self.max_pages_per_run == 0 {
            anyhow::bail!("MAX_PAGES_PER_RUN must be positive");
        }
        if self.reconcile_interval_secs == 0 {
            anyhow::bail!("RECONCILE_INTERVAL_SECS must be positive");
        }
        if self.explorer_timeout_secs == 0 {
            anyhow::bail!("EXPLORER_TIMEOUT_SECS must be positive");
        }

        if self.etherscan_api_key.trim().is_empty() && self.chains_config_path.is_none() {
            tracing::warn!("ETHERSCAN_API_KEY is empty; explorer requests will be rate limited");
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        environment: "test".to_string(),
        database_url: "postgres://localhost/deposits_test".to_string(),
        database_max_connections: 1,
        cors_allowed_origins: "*".to_string(),
        etherscan_api_key: "test_key".to_string(),
        chains_config_path: None,
        explorer_timeout_secs: 5,
        explorer_page_size: 100,
        max_pages_per_run: 10,
        resolve_chain_head: false,
        head_confirmations: 0,
        watermark_resets: Vec::new(),
        enable_deposit_scheduler: false,
        reconcile_interval_secs: 900,
    }
}
