use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==================== EXPLORER ====================

/// One ERC20 transfer as returned by the explorer's `tokentx` action.
/// Numeric fields stay string-encoded until the formatter validates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransferRecord {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub from: String,
    pub contract_address: String,
    pub to: String,
    pub value: String,
    #[serde(default)]
    pub token_name: String,
    #[serde(default)]
    pub token_symbol: String,
    pub token_decimal: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferApiResult {
    pub status: ApiStatus,
    pub message: String,
    pub transfers: Vec<RawTransferRecord>,
}

impl TransferApiResult {
    pub fn ok(message: impl Into<String>, transfers: Vec<RawTransferRecord>) -> Self {
        Self {
            status: ApiStatus::Ok,
            message: message.into(),
            transfers,
        }
    }

    /// Application-level failure; never carries transfers.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Error,
            message: message.into(),
            transfers: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ApiStatus::Ok
    }
}

// ==================== DEPOSITS ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    pub block_number: u64,
    pub chain_id: String,
    pub timestamp: i64,
    pub hash: String,
    pub from: String,
    pub contract_address: String,
    pub to: String,
    pub raw_value: String,
    pub value_formatted: f64,
    pub token_name: String,
    pub token_symbol: String,
    pub token_decimals: u8,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

// ==================== WATERMARKS ====================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    pub chain_id: String,
    pub block_number: u64,
    pub updated_at: Option<DateTime<Utc>>,
}
