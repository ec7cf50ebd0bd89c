use crate::{
    chains::normalize_address,
    error::{AppError, Result},
    models::{DepositRecord, RawTransferRecord},
};
use chrono::{DateTime, Utc};
use ethers::{types::U256, utils::format_units};

/// Deposit Formatter - Normalizes explorer transfers into deposit records
pub struct DepositFormatter;

impl DepositFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Format a transfer, stamping it with the current time
    pub fn format(&self, raw: &RawTransferRecord, chain_id: &str) -> Result<DepositRecord> {
        self.format_at(raw, chain_id, Utc::now())
    }

    pub fn format_at(
        &self,
        raw: &RawTransferRecord,
        chain_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<DepositRecord> {
        let block_number = parse_block_number(raw)?;
        let timestamp = parse_digits::<i64>(raw, "timeStamp", &raw.time_stamp)?;
        let token_decimals = parse_digits::<u8>(raw, "tokenDecimal", &raw.token_decimal)?;
        let value_formatted = scale_value(raw, token_decimals)?;

        if raw.hash.trim().is_empty() {
            return Err(AppError::malformed(&raw.hash, "empty transaction hash"));
        }

        Ok(DepositRecord {
            block_number,
            chain_id: chain_id.to_string(),
            timestamp,
            hash: raw.hash.clone(),
            from: normalize_address(&raw.from),
            contract_address: normalize_address(&raw.contract_address),
            to: normalize_address(&raw.to),
            raw_value: raw.value.clone(),
            value_formatted,
            token_name: raw.token_name.clone(),
            token_symbol: raw.token_symbol.clone(),
            token_decimals,
            processed: false,
            created_at,
        })
    }
}

impl Default for DepositFormatter {
    fn default() -> Self {
        Self::new()
    }
}

pub fn parse_block_number(raw: &RawTransferRecord) -> Result<u64> {
    parse_digits::<u64>(raw, "blockNumber", &raw.block_number)
}

// Rejects anything but plain decimal digits so bad data never defaults to zero.
fn parse_digits<T: std::str::FromStr>(raw: &RawTransferRecord, field: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    if !is_decimal(value) {
        return Err(AppError::malformed(
            &raw.hash,
            format!("{} is not a decimal integer: {:?}", field, value),
        ));
    }
    value
        .parse::<T>()
        .map_err(|e| AppError::malformed(&raw.hash, format!("{} {:?}: {}", field, value, e)))
}

fn is_decimal(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// `value / 10^decimals` with the division done on the 256-bit integer.
fn scale_value(raw: &RawTransferRecord, decimals: u8) -> Result<f64> {
    if !is_decimal(&raw.value) {
        return Err(AppError::malformed(
            &raw.hash,
            format!("value is not a decimal integer: {:?}", raw.value),
        ));
    }
    let amount = U256::from_dec_str(&raw.value)
        .map_err(|e| AppError::malformed(&raw.hash, format!("value {:?}: {:?}", raw.value, e)))?;
    let formatted = format_units(amount, u32::from(decimals))
        .map_err(|e| AppError::malformed(&raw.hash, format!("decimals {}: {}", decimals, e)))?;
    formatted
        .parse::<f64>()
        .map_err(|e| AppError::malformed(&raw.hash, format!("value {:?}: {}", formatted, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(value: &str, decimals: &str) -> RawTransferRecord {
        RawTransferRecord {
            block_number: "1050".to_string(),
            time_stamp: "1700000000".to_string(),
            hash: "0xh1".to_string(),
            from: "0xFROM000000000000000000000000000000000001".to_string(),
            contract_address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string(),
            to: "0xABCdef0000000000000000000000000000000001".to_string(),
            value: value.to_string(),
            token_name: "USD Coin".to_string(),
            token_symbol: "USDC".to_string(),
            token_decimal: decimals.to_string(),
        }
    }

    #[test]
    fn formats_usdc_amount() {
        let deposit = DepositFormatter::new()
            .format(&transfer("1500000", "6"), "8453")
            .unwrap();
        assert_eq!(deposit.value_formatted, 1.5);
        assert_eq!(deposit.raw_value, "1500000");
        assert_eq!(deposit.token_decimals, 6);
        assert_eq!(deposit.block_number, 1050);
        assert_eq!(deposit.timestamp, 1_700_000_000);
        assert_eq!(deposit.chain_id, "8453");
        assert!(!deposit.processed);
    }

    #[test]
    fn lowercases_every_address() {
        let deposit = DepositFormatter::new()
            .format(&transfer("1", "6"), "8453")
            .unwrap();
        assert_eq!(deposit.from, "0xfrom000000000000000000000000000000000001");
        assert_eq!(deposit.to, "0xabcdef0000000000000000000000000000000001");
        assert_eq!(
            deposit.contract_address,
            "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913"
        );
    }

    #[test]
    fn keeps_raw_value_beyond_u128() {
        // 2^200, far outside any primitive integer
        let huge = "1606938044258990275541962092341162602522202993782792835301376";
        let deposit = DepositFormatter::new()
            .format(&transfer(huge, "18"), "8453")
            .unwrap();
        assert_eq!(deposit.raw_value, huge);
        assert!((deposit.value_formatted - 1.606938044258990e42).abs() / 1e42 < 1e-9);
    }

    #[test]
    fn zero_decimals_keeps_integer_value() {
        let deposit = DepositFormatter::new()
            .format(&transfer("42", "0"), "8453")
            .unwrap();
        assert_eq!(deposit.value_formatted, 42.0);
    }

    #[test]
    fn rejects_non_numeric_value() {
        let err = DepositFormatter::new()
            .format(&transfer("12abc", "6"), "8453")
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedTransfer { .. }));
    }

    #[test]
    fn rejects_empty_value_instead_of_zero() {
        let err = DepositFormatter::new()
            .format(&transfer("", "6"), "8453")
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedTransfer { .. }));
    }

    #[test]
    fn rejects_malformed_block_number() {
        let mut raw = transfer("1", "6");
        raw.block_number = "0x41a".to_string();
        assert!(parse_block_number(&raw).is_err());
        assert!(DepositFormatter::new().format(&raw, "8453").is_err());
    }

    #[test]
    fn rejects_negative_timestamp() {
        let mut raw = transfer("1", "6");
        raw.time_stamp = "-5".to_string();
        assert!(DepositFormatter::new().format(&raw, "8453").is_err());
    }

    #[test]
    fn rejects_out_of_range_decimals() {
        assert!(DepositFormatter::new()
            .format(&transfer("1", "300"), "8453")
            .is_err());
        assert!(DepositFormatter::new()
            .format(&transfer("1", "90"), "8453")
            .is_err());
    }

    #[test]
    fn format_at_uses_given_timestamp() {
        let created = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let deposit = DepositFormatter::default()
            .format_at(&transfer("1", "6"), "8453", created)
            .unwrap();
        assert_eq!(deposit.created_at, created);
    }
}
