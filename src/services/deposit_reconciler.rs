use crate::{
    chains::{ChainConfig, ChainRegistry},
    config::Config,
    constants::{EXPLORER_RESULT_WINDOW, SCAN_TO_HEAD_SENTINEL},
    db::{DepositStore, WatermarkStore},
    error::{AppError, Result},
    indexer::{deposit_formatter::parse_block_number, DepositFormatter, TransferSource},
    models::{DepositRecord, RawTransferRecord, Watermark},
};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Named states of a single chain reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStage {
    Idle,
    FetchingWatermark,
    Fetching,
    Filtering,
    Deduplicating,
    Persisting,
    AdvancingWatermark,
    Done,
    Errored,
}

impl fmt::Display for ReconcileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcileStage::Idle => "idle",
            ReconcileStage::FetchingWatermark => "fetching_watermark",
            ReconcileStage::Fetching => "fetching",
            ReconcileStage::Filtering => "filtering",
            ReconcileStage::Deduplicating => "deduplicating",
            ReconcileStage::Persisting => "persisting",
            ReconcileStage::AdvancingWatermark => "advancing_watermark",
            ReconcileStage::Done => "done",
            ReconcileStage::Errored => "errored",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcilerOptions {
    pub max_pages_per_run: u32,
    pub resolve_chain_head: bool,
    /// Blocks subtracted from a resolved head, since the explorer's transfer index trails it.
    pub head_confirmations: u64,
}

impl ReconcilerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_pages_per_run: config.max_pages_per_run.max(1),
            resolve_chain_head: config.resolve_chain_head,
            head_confirmations: config.head_confirmations,
        }
    }
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            max_pages_per_run: 1,
            resolve_chain_head: false,
            head_confirmations: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileSummary {
    pub chain_id: String,
    pub start_block: u64,
    pub end_block: u64,
    pub fetched: usize,
    pub matched: usize,
    pub duplicates: usize,
    pub new_deposits: u64,
    pub watermark: u64,
    /// The last page was full, so more transfers may exist past `watermark`.
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub results: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

struct FetchedRange {
    transfers: Vec<RawTransferRecord>,
    max_block_seen: Option<u64>,
    truncated: bool,
}

/// Deposit Reconciler - Moves vault deposits from the explorer into the ledger
pub struct DepositReconciler {
    registry: Arc<ChainRegistry>,
    source: Arc<dyn TransferSource>,
    deposits: Arc<dyn DepositStore>,
    watermarks: Arc<dyn WatermarkStore>,
    formatter: DepositFormatter,
    options: ReconcilerOptions,
    chain_locks: HashMap<String, Arc<Mutex<()>>>,
}

impl DepositReconciler {
    pub fn new(
        registry: Arc<ChainRegistry>,
        source: Arc<dyn TransferSource>,
        deposits: Arc<dyn DepositStore>,
        watermarks: Arc<dyn WatermarkStore>,
        options: ReconcilerOptions,
    ) -> Self {
        let chain_locks = registry
            .chain_ids()
            .map(|id| (id.to_string(), Arc::new(Mutex::new(()))))
            .collect();

        Self {
            registry,
            source,
            deposits,
            watermarks,
            formatter: DepositFormatter::new(),
            options,
            chain_locks,
        }
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    /// Reconcile one chain. Runs for the same chain are serialized.
    pub async fn reconcile(
        &self,
        chain_id: &str,
        current_block_override: Option<u64>,
    ) -> Result<ReconcileSummary> {
        let chain = self.registry.get_chain(chain_id)?;
        let lock = self.chain_lock(chain_id)?;
        let _guard = lock.lock().await;

        let mut stage = ReconcileStage::Idle;
        match self.run(chain, current_block_override, &mut stage).await {
            Ok(summary) => {
                enter(chain_id, &mut stage, ReconcileStage::Done);
                Ok(summary)
            }
            Err(error) => {
                tracing::error!(
                    chain_id,
                    stage = %stage,
                    retryable = error.is_retryable(),
                    "Error processing deposits for chain {}: {}",
                    chain_id,
                    error
                );
                enter(chain_id, &mut stage, ReconcileStage::Errored);
                Err(error)
            }
        }
    }

    async fn run(
        &self,
        chain: &ChainConfig,
        current_block_override: Option<u64>,
        stage: &mut ReconcileStage,
    ) -> Result<ReconcileSummary> {
        let chain_id = chain.chain_id.as_str();

        enter(chain_id, stage, ReconcileStage::FetchingWatermark);
        let start_block = self.watermarks.get_watermark(chain_id).await?;

        let (end_block, end_is_known_block) = match current_block_override {
            Some(block) => (block, true),
            None if self.options.resolve_chain_head => {
                let head = self.source.latest_block(chain_id).await?;
                let end_block = head.saturating_sub(self.options.head_confirmations);
                tracing::debug!(chain_id, head, end_block, "Resolved chain head");
                (end_block, true)
            }
            None => (SCAN_TO_HEAD_SENTINEL, false),
        };

        let mut summary = ReconcileSummary {
            chain_id: chain_id.to_string(),
            start_block,
            end_block,
            fetched: 0,
            matched: 0,
            duplicates: 0,
            new_deposits: 0,
            watermark: start_block,
            truncated: false,
        };

        if end_block < start_block {
            tracing::info!(
                chain_id,
                start_block,
                end_block,
                "End block is behind the watermark; nothing to scan"
            );
            return Ok(summary);
        }

        tracing::info!(
            chain_id,
            start_block,
            end_block,
            "Processing deposits for chain {} from block {} to {}",
            chain_id,
            start_block,
            end_block
        );

        enter(chain_id, stage, ReconcileStage::Fetching);
        let fetched = self
            .fetch_range(chain, start_block, end_block)
            .await?;
        summary.fetched = fetched.transfers.len();
        summary.truncated = fetched.truncated;

        if fetched.transfers.is_empty() {
            tracing::info!(chain_id, "No new deposits found for chain {}", chain_id);
            if end_is_known_block && end_block > start_block {
                enter(chain_id, stage, ReconcileStage::AdvancingWatermark);
                self.advance(chain_id, end_block).await?;
                summary.watermark = end_block;
            }
            return Ok(summary);
        }

        enter(chain_id, stage, ReconcileStage::Filtering);
        let incoming: Vec<&RawTransferRecord> = fetched
            .transfers
            .iter()
            .filter(|tx| self.is_deposit(chain, tx))
            .collect();
        summary.matched = incoming.len();

        let formatted = incoming
            .into_iter()
            .map(|tx| {
                self.check_token_decimals(chain, tx);
                self.formatter.format(tx, chain_id)
            })
            .collect::<Result<Vec<DepositRecord>>>()?;

        enter(chain_id, stage, ReconcileStage::Deduplicating);
        let mut seen = HashSet::new();
        let mut new_deposits = Vec::with_capacity(formatted.len());
        for deposit in formatted {
            if !seen.insert(deposit.hash.clone())
                || self.deposits.deposit_exists(chain_id, &deposit.hash).await?
            {
                summary.duplicates += 1;
                continue;
            }
            new_deposits.push(deposit);
        }

        enter(chain_id, stage, ReconcileStage::Persisting);
        if !new_deposits.is_empty() {
            summary.new_deposits = self.deposits.insert_deposits(&new_deposits).await?;
            tracing::info!(
                chain_id,
                "Added {} new deposits for chain {}",
                summary.new_deposits,
                chain_id
            );
        }

        enter(chain_id, stage, ReconcileStage::AdvancingWatermark);
        let target = fetched.max_block_seen.unwrap_or(start_block).max(start_block);
        self.advance(chain_id, target).await?;
        summary.watermark = target;

        if summary.truncated {
            tracing::warn!(
                chain_id,
                watermark = target,
                "Explorer page limit reached; remaining transfers will be scanned next run"
            );
        }

        Ok(summary)
    }

    /// Fetch `[start_block, end_block]`, following full pages.
    ///
    /// A full page that reaches past its start block restarts the scan from the highest block
    /// seen, which costs one of `max_pages_per_run`. A full page stuck inside one block asks for
    /// the next page of that block instead, so a crowded block is always drained in one run.
    async fn fetch_range(
        &self,
        chain: &ChainConfig,
        start_block: u64,
        end_block: u64,
    ) -> Result<FetchedRange> {
        let chain_id = chain.chain_id.as_str();
        let page_size = self.source.page_size() as usize;
        let mut range = FetchedRange {
            transfers: Vec::new(),
            max_block_seen: None,
            truncated: false,
        };
        let mut page_start = start_block;
        let max_scans = self.options.max_pages_per_run.max(1);
        let mut page = 1;
        let mut scans = 0;

        loop {
            if page == 1 {
                if scans == max_scans {
                    break;
                }
                scans += 1;
            }

            let result = self
                .source
                .fetch_transfers(
                    chain_id,
                    &chain.vault_contract_address,
                    page_start,
                    end_block,
                    None,
                    page,
                )
                .await?;

            if !result.is_ok() {
                tracing::error!(chain_id, "API Error: {}", result.message);
                return Err(AppError::Fetch(result.message));
            }

            let page_len = result.transfers.len();
            let mut page_max = None;
            for tx in &result.transfers {
                let block = parse_block_number(tx)?;
                page_max = Some(page_max.map_or(block, |m: u64| m.max(block)));
            }
            if let Some(block) = page_max {
                range.max_block_seen = Some(range.max_block_seen.map_or(block, |m| m.max(block)));
            }
            range.transfers.extend(result.transfers);

            range.truncated = page_size > 0 && page_len >= page_size;
            if !range.truncated {
                break;
            }

            match page_max {
                Some(max_block) if max_block > page_start => {
                    tracing::debug!(
                        chain_id,
                        scans,
                        next_start = max_block,
                        "Full explorer page; continuing scan"
                    );
                    page_start = max_block;
                    page = 1;
                }
                _ if (u64::from(page) + 1) * page_size as u64 > EXPLORER_RESULT_WINDOW => {
                    tracing::warn!(
                        chain_id,
                        block = page_start,
                        page,
                        "Block exceeds the explorer result window; cannot page further"
                    );
                    break;
                }
                _ => {
                    page += 1;
                    tracing::debug!(
                        chain_id,
                        block = page_start,
                        page,
                        "Full explorer page within a single block; requesting next page"
                    );
                }
            }
        }

        Ok(range)
    }

    fn is_deposit(&self, chain: &ChainConfig, tx: &RawTransferRecord) -> bool {
        if !chain.is_vault(&tx.to) {
            return false;
        }
        if chain.only_tracked_tokens && chain.token(&tx.contract_address).is_none() {
            tracing::debug!(
                chain_id = %chain.chain_id,
                token = %tx.contract_address,
                hash = %tx.hash,
                "Skipping transfer of untracked token"
            );
            return false;
        }
        true
    }

    fn check_token_decimals(&self, chain: &ChainConfig, tx: &RawTransferRecord) {
        if let Some(token) = chain.token(&tx.contract_address) {
            if decimals_differ(&tx.token_decimal, token.decimals) {
                tracing::warn!(
                    chain_id = %chain.chain_id,
                    token = %tx.contract_address,
                    configured = token.decimals,
                    reported = %tx.token_decimal,
                    "Explorer decimals differ from configured token decimals"
                );
            }
        }
    }

    async fn advance(&self, chain_id: &str, block_number: u64) -> Result<()> {
        let changed = self
            .watermarks
            .advance_watermark(chain_id, block_number)
            .await?;
        if changed {
            tracing::debug!(chain_id, block_number, "Watermark advanced");
        }
        Ok(())
    }

    /// Overwrite watermarks unconditionally so the next runs rescan from the given blocks.
    /// Every chain is checked before anything is written.
    pub async fn reset_watermarks(&self, resets: &[(String, u64)]) -> Result<()> {
        for (chain_id, _) in resets {
            self.registry.get_chain(chain_id)?;
        }

        for (chain_id, block_number) in resets {
            let lock = self.chain_lock(chain_id)?;
            let _guard = lock.lock().await;
            self.watermarks.set_watermark(chain_id, *block_number).await?;
            tracing::warn!(
                chain_id = %chain_id,
                block_number,
                "Watermark reset; deposits from this block will be rescanned"
            );
        }
        Ok(())
    }

    fn chain_lock(&self, chain_id: &str) -> Result<Arc<Mutex<()>>> {
        self.chain_locks
            .get(chain_id)
            .cloned()
            .ok_or_else(|| AppError::UnsupportedChain(chain_id.to_string()))
    }

    /// Reconcile every configured chain; one chain failing never stops the others.
    pub async fn reconcile_all(&self) -> ReconcileReport {
        let runs = self.registry.chain_ids().map(|chain_id| async move {
            (chain_id.to_string(), self.reconcile(chain_id, None).await)
        });

        let mut report = ReconcileReport::default();
        for (chain_id, outcome) in join_all(runs).await {
            match outcome {
                Ok(summary) => {
                    report.results.insert(chain_id, summary.new_deposits);
                }
                Err(error) => {
                    tracing::error!("Failed to process chain {}: {}", chain_id, error);
                    report.results.insert(chain_id.clone(), 0);
                    report.errors.insert(chain_id, error.to_string());
                }
            }
        }
        report
    }

    /// Current watermark of every configured chain, 0 when never reconciled.
    pub async fn watermarks(&self) -> Result<Vec<Watermark>> {
        let mut watermarks = Vec::with_capacity(self.registry.len());
        for chain_id in self.registry.chain_ids() {
            let watermark = self
                .watermarks
                .get_watermark_record(chain_id)
                .await?
                .unwrap_or_else(|| Watermark {
                    chain_id: chain_id.to_string(),
                    block_number: 0,
                    updated_at: None,
                });
            watermarks.push(watermark);
        }
        Ok(watermarks)
    }
}

fn decimals_differ(reported: &str, configured: u8) -> bool {
    reported
        .trim()
        .parse::<u8>()
        .map_or(true, |decimals| decimals != configured)
}

fn enter(chain_id: &str, stage: &mut ReconcileStage, next: ReconcileStage) {
    let previous = *stage;
    tracing::debug!(chain_id, from = %previous, to = %next, "Reconcile stage");
    *stage = next;
}
