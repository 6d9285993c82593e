//! Idempotent schema bootstrap.
//!
//! Reference rows in `equities` normally come from a separate import
//! process; the DDL here only guarantees the job can run against a
//! fresh database.

use sqlx::PgPool;
use tracing::info;

use bourse_core::{Result, SyncError};

const CREATE_EQUITIES: &str = r#"
CREATE TABLE IF NOT EXISTS equities (
    isin            TEXT NOT NULL,
    symbol          TEXT NOT NULL,
    name            TEXT,
    market          TEXT,
    ticker          TEXT,
    api             TEXT,
    is_valid        BOOLEAN NOT NULL DEFAULT FALSE,
    is_delisted     BOOLEAN NOT NULL DEFAULT FALSE,
    cnt_1y          INTEGER NOT NULL DEFAULT 0,
    cnt_total       INTEGER NOT NULL DEFAULT 0,
    first_quote_at  DATE,
    last_quote_at   DATE,
    w_date          DATE,
    PRIMARY KEY (isin, symbol)
)
"#;

const CREATE_EQUITY_PRICES: &str = r#"
CREATE TABLE IF NOT EXISTS equity_prices (
    isin        TEXT NOT NULL,
    symbol      TEXT NOT NULL,
    price_date  DATE NOT NULL,
    open_price  DOUBLE PRECISION,
    high_price  DOUBLE PRECISION,
    low_price   DOUBLE PRECISION,
    close_price DOUBLE PRECISION NOT NULL,
    adj_close   DOUBLE PRECISION,
    volume      BIGINT,
    PRIMARY KEY (isin, symbol, price_date)
)
"#;

const CREATE_PRICE_DATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_equity_prices_date ON equity_prices (price_date)";

/// Creates the tables and indexes this job writes to. Safe to re-run.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for ddl in [CREATE_EQUITIES, CREATE_EQUITY_PRICES, CREATE_PRICE_DATE_INDEX] {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
    }
    info!("schema ready");
    Ok(())
}
