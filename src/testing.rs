//! In-memory stores and a scripted transfer source for unit tests.

use crate::{
    chains::{ChainConfig, ChainRegistry, TokenInfo},
    db::{DepositStore, WatermarkStore},
    error::{AppError, Result},
    indexer::TransferSource,
    models::{DepositRecord, RawTransferRecord, TransferApiResult, Watermark},
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

pub const VAULT: &str = "0xABCdef0000000000000000000000000000000001";
pub const USDC: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
pub const OTHER: &str = "0x9990000000000000000000000000000000000009";

pub fn chain(chain_id: &str) -> ChainConfig {
    let mut tokens = BTreeMap::new();
    tokens.insert(
        USDC.to_string(),
        TokenInfo {
            name: "USD Coin".to_string(),
            symbol: "USDC".to_string(),
            decimals: 6,
        },
    );
    ChainConfig {
        chain_id: chain_id.to_string(),
        name: format!("Chain {}", chain_id),
        explorer_api_url: "https://api.etherscan.io/v2/api".to_string(),
        explorer_api_key: "test_key".to_string(),
        vault_contract_address: VAULT.to_string(),
        only_tracked_tokens: false,
        erc20_tokens: tokens,
    }
}

pub fn registry(chain_ids: &[&str]) -> ChainRegistry {
    ChainRegistry::new(chain_ids.iter().map(|id| chain(id))).unwrap()
}

pub fn transfer(hash: &str, block: u64, to: &str) -> RawTransferRecord {
    RawTransferRecord {
        block_number: block.to_string(),
        time_stamp: "1700000000".to_string(),
        hash: hash.to_string(),
        from: "0xF00D000000000000000000000000000000000001".to_string(),
        contract_address: USDC.to_string(),
        to: to.to_string(),
        value: "1500000".to_string(),
        token_name: "USD Coin".to_string(),
        token_symbol: "USDC".to_string(),
        token_decimal: "6".to_string(),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    deposits: Mutex<Vec<DepositRecord>>,
    watermarks: Mutex<HashMap<String, u64>>,
    fail_inserts: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watermark(self, chain_id: &str, block_number: u64) -> Self {
        self.watermarks
            .lock()
            .unwrap()
            .insert(chain_id.to_string(), block_number);
        self
    }

    pub fn fail_inserts(&self, fail: bool) {
        *self.fail_inserts.lock().unwrap() = fail;
    }

    pub fn deposits(&self) -> Vec<DepositRecord> {
        self.deposits.lock().unwrap().clone()
    }

    pub fn watermark(&self, chain_id: &str) -> Option<u64> {
        self.watermarks.lock().unwrap().get(chain_id).copied()
    }
}

#[async_trait::async_trait]
impl DepositStore for MemoryStore {
    async fn deposit_exists(&self, chain_id: &str, hash: &str) -> Result<bool> {
        Ok(self
            .deposits
            .lock()
            .unwrap()
            .iter()
            .any(|d| d.chain_id == chain_id && d.hash == hash))
    }

    async fn insert_deposits(&self, deposits: &[DepositRecord]) -> Result<u64> {
        if *self.fail_inserts.lock().unwrap() {
            return Err(AppError::Persistence(sqlx::Error::PoolTimedOut));
        }
        let mut stored = self.deposits.lock().unwrap();
        let mut inserted = 0;
        for deposit in deposits {
            let exists = stored
                .iter()
                .any(|d| d.chain_id == deposit.chain_id && d.hash == deposit.hash);
            if !exists {
                stored.push(deposit.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

#[async_trait::async_trait]
impl WatermarkStore for MemoryStore {
    async fn get_watermark(&self, chain_id: &str) -> Result<u64> {
        Ok(self.watermark(chain_id).unwrap_or(0))
    }

    async fn get_watermark_record(&self, chain_id: &str) -> Result<Option<Watermark>> {
        Ok(self.watermark(chain_id).map(|block_number| Watermark {
            chain_id: chain_id.to_string(),
            block_number,
            updated_at: Some(Utc::now()),
        }))
    }

    async fn set_watermark(&self, chain_id: &str, block_number: u64) -> Result<()> {
        self.watermarks
            .lock()
            .unwrap()
            .insert(chain_id.to_string(), block_number);
        Ok(())
    }

    async fn advance_watermark(&self, chain_id: &str, block_number: u64) -> Result<bool> {
        let mut watermarks = self.watermarks.lock().unwrap();
        match watermarks.get(chain_id) {
            Some(current) if *current >= block_number => Ok(false),
            _ => {
                watermarks.insert(chain_id.to_string(), block_number);
                Ok(true)
            }
        }
    }
}

pub enum Scripted {
    Page(TransferApiResult),
    NetworkFailure(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchCall {
    pub chain_id: String,
    pub wallet_address: String,
    pub start_block: u64,
    pub end_block: u64,
    pub page: u32,
}

/// Replays queued responses per chain; an exhausted queue answers with an empty page.
pub struct ScriptedSource {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<FetchCall>>,
    head: Mutex<Option<u64>>,
    page_size: u32,
}

impl ScriptedSource {
    pub fn new(page_size: u32) -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            head: Mutex::new(None),
            page_size,
        }
    }

    pub fn push(&self, chain_id: &str, response: Scripted) {
        self.responses
            .lock()
            .unwrap()
            .entry(chain_id.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn push_page(&self, chain_id: &str, transfers: Vec<RawTransferRecord>) {
        self.push(chain_id, Scripted::Page(TransferApiResult::ok("OK", transfers)));
    }

    pub fn set_head(&self, head: u64) {
        *self.head.lock().unwrap() = Some(head);
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TransferSource for ScriptedSource {
    async fn fetch_transfers(
        &self,
        chain_id: &str,
        wallet_address: &str,
        start_block: u64,
        end_block: u64,
        _token_address: Option<&str>,
        page: u32,
    ) -> Result<TransferApiResult> {
        self.calls.lock().unwrap().push(FetchCall {
            chain_id: chain_id.to_string(),
            wallet_address: wallet_address.to_string(),
            start_block,
            end_block,
            page,
        });

        let next = self
            .responses
            .lock()
            .unwrap()
            .get_mut(chain_id)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Scripted::Page(result)) => Ok(result),
            Some(Scripted::NetworkFailure(message)) => Err(AppError::Fetch(message)),
            None => Ok(TransferApiResult::ok("No transactions found", Vec::new())),
        }
    }

    async fn latest_block(&self, _chain_id: &str) -> Result<u64> {
        self.head
            .lock()
            .unwrap()
            .ok_or_else(|| AppError::Fetch("head unavailable".to_string()))
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }
}

/// Serves a fixed transfer history the way the explorer does: ascending by block, filtered to
/// `[start_block, end_block]` and cut into `page_size` pages.
pub struct HistorySource {
    transfers: Vec<RawTransferRecord>,
    calls: Mutex<Vec<FetchCall>>,
    page_size: u32,
}

impl HistorySource {
    pub fn new(page_size: u32, transfers: Vec<RawTransferRecord>) -> Self {
        Self {
            transfers,
            calls: Mutex::new(Vec::new()),
            page_size,
        }
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TransferSource for HistorySource {
    async fn fetch_transfers(
        &self,
        chain_id: &str,
        wallet_address: &str,
        start_block: u64,
        end_block: u64,
        _token_address: Option<&str>,
        page: u32,
    ) -> Result<TransferApiResult> {
        self.calls.lock().unwrap().push(FetchCall {
            chain_id: chain_id.to_string(),
            wallet_address: wallet_address.to_string(),
            start_block,
            end_block,
            page,
        });

        let mut in_range: Vec<&RawTransferRecord> = self
            .transfers
            .iter()
            .filter(|tx| {
                let block: u64 = tx.block_number.parse().unwrap();
                (start_block..=end_block).contains(&block)
            })
            .collect();
        in_range.sort_by_key(|tx| tx.block_number.parse::<u64>().unwrap());

        let skip = (page.saturating_sub(1) * self.page_size) as usize;
        let transfers: Vec<RawTransferRecord> = in_range
            .into_iter()
            .skip(skip)
            .take(self.page_size as usize)
            .cloned()
            .collect();
        Ok(TransferApiResult::ok("OK", transfers))
    }

    async fn latest_block(&self, _chain_id: &str) -> Result<u64> {
        Err(AppError::Fetch("head unavailable".to_string()))
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }
}
