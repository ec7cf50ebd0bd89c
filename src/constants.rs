/// Application constants

pub const API_VERSION: &str = "v1";

// Explorer queries
pub const DEFAULT_RESULTS_PER_PAGE: u32 = 100;
pub const DEFAULT_MAX_PAGES_PER_RUN: u32 = 10;
pub const DEFAULT_EXPLORER_TIMEOUT_SECS: u64 = 30;
pub const EXPLORER_STATUS_OK: &str = "1";
/// Etherscan rejects queries where `page * offset` exceeds this.
pub const EXPLORER_RESULT_WINDOW: u64 = 10_000;
pub const DEFAULT_HEAD_CONFIRMATIONS: u64 = 12;

/// End block used when the chain head is not known; the explorer clamps it to its own head.
pub const SCAN_TO_HEAD_SENTINEL: u64 = 999_999_999;

// Scheduler
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 900; // 15 minutes

// Built-in chain table (Base mainnet)
pub const BASE_CHAIN_ID: &str = "8453";
pub const BASE_EXPLORER_API_URL: &str = "https://api.etherscan.io/v2/api";
pub const BASE_VAULT_CONTRACT: &str = "0xcdC71521aB58A3F67A9894d7083Cd3AA523c5072";
pub const BASE_USDC: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
