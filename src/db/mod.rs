use crate::{
    config::Config,
    error::{AppError, Result},
    models::{DepositRecord, Watermark},
};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

/// Deposit persistence used by the reconciler.
#[async_trait::async_trait]
pub trait DepositStore: Send + Sync {
    /// Whether a deposit with this `(chain_id, hash)` is already recorded.
    async fn deposit_exists(&self, chain_id: &str, hash: &str) -> Result<bool>;

    /// Writes all deposits atomically and returns how many rows were inserted.
    async fn insert_deposits(&self, deposits: &[DepositRecord]) -> Result<u64>;
}

/// Per-chain "last processed block" persistence.
#[async_trait::async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Last processed block, or 0 when the chain has never been reconciled.
    async fn get_watermark(&self, chain_id: &str) -> Result<u64>;

    async fn get_watermark_record(&self, chain_id: &str) -> Result<Option<Watermark>>;

    /// Unconditional upsert.
    async fn set_watermark(&self, chain_id: &str, block_number: u64) -> Result<()>;

    /// Upsert that only applies when `block_number` is greater than the stored value.
    /// Returns whether the stored watermark changed.
    async fn advance_watermark(&self, chain_id: &str, block_number: u64) -> Result<bool>;
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Pool that connects on first use.
    #[cfg(test)]
    pub fn new_lazy(config: &Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect_lazy(&config.database_url)?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_db_block(block_number: u64) -> Result<i64> {
    i64::try_from(block_number)
        .map_err(|_| AppError::Internal(format!("block {} exceeds BIGINT", block_number)))
}

fn from_db_block(block_number: i64) -> Result<u64> {
    u64::try_from(block_number)
        .map_err(|_| AppError::Internal(format!("negative block {} in store", block_number)))
}

// ==================== DEPOSIT QUERIES ====================
#[async_trait::async_trait]
impl DepositStore for Database {
    async fn deposit_exists(&self, chain_id: &str, hash: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM deposit_transactions WHERE chain_id = $1 AND hash = $2)",
        )
        .bind(chain_id)
        .bind(hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_deposits(&self, deposits: &[DepositRecord]) -> Result<u64> {
        if deposits.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for deposit in deposits {
            let result = sqlx::query(
                r#"
                INSERT INTO deposit_transactions
                    (chain_id, hash, block_number, timestamp, from_address,
                     contract_address, to_address, raw_value, value_formatted,
                     token_name, token_symbol, token_decimals, processed, created_at)
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)
                ON CONFLICT (chain_id, hash) DO NOTHING
                "#,
            )
            .bind(&deposit.chain_id)
            .bind(&deposit.hash)
            .bind(to_db_block(deposit.block_number)?)
            .bind(deposit.timestamp)
            .bind(&deposit.from)
            .bind(&deposit.contract_address)
            .bind(&deposit.to)
            .bind(&deposit.raw_value)
            .bind(deposit.value_formatted)
            .bind(&deposit.token_name)
            .bind(&deposit.token_symbol)
            .bind(i16::from(deposit.token_decimals))
            .bind(deposit.processed)
            .bind(deposit.created_at)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        Ok(inserted)
    }
}

// ==================== WATERMARK QUERIES ====================
#[async_trait::async_trait]
impl WatermarkStore for Database {
    async fn get_watermark(&self, chain_id: &str) -> Result<u64> {
        Ok(self
            .get_watermark_record(chain_id)
            .await?
            .map(|w| w.block_number)
            .unwrap_or(0))
    }

    async fn get_watermark_record(&self, chain_id: &str) -> Result<Option<Watermark>> {
        let row = sqlx::query(
            "SELECT chain_id, block_number, updated_at FROM last_processed_blocks WHERE chain_id = $1",
        )
        .bind(chain_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Watermark {
                chain_id: row.get("chain_id"),
                block_number: from_db_block(row.get("block_number"))?,
                updated_at: Some(row.get::<DateTime<Utc>, _>("updated_at")),
            })
        })
        .transpose()
    }

    async fn set_watermark(&self, chain_id: &str, block_number: u64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO last_processed_blocks (chain_id, block_number, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (chain_id) DO UPDATE
            SET block_number = EXCLUDED.block_number,
                updated_at   = NOW()
            "#,
        )
        .bind(chain_id)
        .bind(to_db_block(block_number)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn advance_watermark(&self, chain_id: &str, block_number: u64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO last_processed_blocks (chain_id, block_number, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (chain_id) DO UPDATE
            SET block_number = EXCLUDED.block_number,
                updated_at   = NOW()
            WHERE last_processed_blocks.block_number < EXCLUDED.block_number
            "#,
        )
        .bind(chain_id)
        .bind(to_db_block(block_number)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
