use crate::{
    chains::{ChainConfig, ChainRegistry},
    constants::EXPLORER_STATUS_OK,
    error::{AppError, Result},
    models::{RawTransferRecord, TransferApiResult},
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Explorer message for an empty, otherwise successful query.
const NO_TRANSACTIONS_MESSAGE: &str = "No transactions found";

/// Source of ERC20 transfer events for a chain.
#[async_trait::async_trait]
pub trait TransferSource: Send + Sync {
    /// Fetches page `page` (1-based) of transfers to or from `wallet_address` in
    /// `[start_block, end_block]`, optionally scoped to a single token contract.
    async fn fetch_transfers(
        &self,
        chain_id: &str,
        wallet_address: &str,
        start_block: u64,
        end_block: u64,
        token_address: Option<&str>,
        page: u32,
    ) -> Result<TransferApiResult>;

    /// Current head block of the chain.
    async fn latest_block(&self, chain_id: &str) -> Result<u64>;

    /// Maximum records per page; a page of this size may be truncated.
    fn page_size(&self) -> u32;
}

fn transfer_query(
    chain: &ChainConfig,
    wallet_address: &str,
    start_block: u64,
    end_block: u64,
    token_address: Option<&str>,
    page: u32,
    page_size: u32,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("module", "account".to_string()),
        ("action", "tokentx".to_string()),
        ("address", wallet_address.to_string()),
    ];
    if let Some(token) = token_address {
        params.push(("contractaddress", token.to_string()));
    }
    params.extend([
        ("startblock", start_block.to_string()),
        ("endblock", end_block.to_string()),
        ("page", page.to_string()),
        ("offset", page_size.to_string()),
        ("sort", "asc".to_string()),
        ("apikey", chain.explorer_api_key.clone()),
        ("chainid", chain.chain_id.clone()),
    ]);
    params
}

fn head_query(chain: &ChainConfig) -> Vec<(&'static str, String)> {
    vec![
        ("module", "proxy".to_string()),
        ("action", "eth_blockNumber".to_string()),
        ("apikey", chain.explorer_api_key.clone()),
        ("chainid", chain.chain_id.clone()),
    ]
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct ProxyResponse {
    #[serde(default)]
    result: Value,
}

fn describe_result(result: &Value) -> Option<String> {
    match result {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}

fn parse_transfer_response(response: ExplorerResponse) -> Result<TransferApiResult> {
    if response.status == EXPLORER_STATUS_OK {
        let transfers: Vec<RawTransferRecord> = serde_json::from_value(response.result)
            .map_err(|e| AppError::Fetch(format!("malformed explorer payload: {}", e)))?;
        return Ok(TransferApiResult::ok(response.message, transfers));
    }

    let empty_result = response.result.as_array().map_or(false, Vec::is_empty);
    if empty_result && response.message.starts_with(NO_TRANSACTIONS_MESSAGE) {
        return Ok(TransferApiResult::ok(response.message, Vec::new()));
    }

    let message = match describe_result(&response.result) {
        Some(detail) => format!("{}: {}", response.message, detail),
        None => response.message,
    };
    Ok(TransferApiResult::error(message))
}

fn parse_head_response(response: ProxyResponse) -> Result<u64> {
    let hex = response
        .result
        .as_str()
        .ok_or_else(|| AppError::Fetch(format!("unexpected head payload: {}", response.result)))?;
    let digits = hex
        .strip_prefix("0x")
        .ok_or_else(|| AppError::Fetch(format!("unexpected head payload: {}", hex)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| AppError::Fetch(format!("invalid head block {}: {}", hex, e)))
}

/// Etherscan-compatible explorer client
pub struct ExplorerClient {
    registry: Arc<ChainRegistry>,
    client: reqwest::Client,
    page_size: u32,
}

impl ExplorerClient {
    pub fn new(registry: Arc<ChainRegistry>, timeout: Duration, page_size: u32) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            registry,
            client,
            page_size,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        chain: &ChainConfig,
        params: &[(&'static str, String)],
    ) -> Result<T> {
        let response = self
            .client
            .get(&chain.explorer_api_url)
            .query(params)
            .send()
            .await?
            .error_for_status()?;

        let body: T = response.json().await?;
        Ok(body)
    }
}

#[async_trait::async_trait]
impl TransferSource for ExplorerClient {
    async fn fetch_transfers(
        &self,
        chain_id: &str,
        wallet_address: &str,
        start_block: u64,
        end_block: u64,
        token_address: Option<&str>,
        page: u32,
    ) -> Result<TransferApiResult> {
        let chain = self.registry.get_chain(chain_id)?;
        if start_block > end_block {
            return Err(AppError::BadRequest(format!(
                "start block {} is after end block {}",
                start_block, end_block
            )));
        }
        if page == 0 {
            return Err(AppError::BadRequest("page numbers start at 1".to_string()));
        }

        let params = transfer_query(
            chain,
            wallet_address,
            start_block,
            end_block,
            token_address,
            page,
            self.page_size,
        );
        let response: ExplorerResponse = self.get(chain, &params).await.map_err(|e| {
            tracing::error!("Error fetching token transactions for chain {}: {}", chain_id, e);
            e
        })?;

        parse_transfer_response(response)
    }

    async fn latest_block(&self, chain_id: &str) -> Result<u64> {
        let chain = self.registry.get_chain(chain_id)?;
        let response: ProxyResponse = self.get(chain, &head_query(chain)).await?;
        parse_head_response(response)
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }
}
