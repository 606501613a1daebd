use sqlx::SqliteConnection;

use crate::{
    db_types::{EntryType, NewTransactionEntry, TransactionEntry},
    traits::MarketLedgerError,
};

/// Fetch the stored entry for the `(tx_hash, address, entry_type, asset_name)` key, if any.
pub async fn fetch_entry(
    tx_hash: &str,
    address: &str,
    entry_type: EntryType,
    asset_name: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<TransactionEntry>, MarketLedgerError> {
    let entry = sqlx::query_as(
        r#"
        SELECT * FROM transaction_entries
        WHERE tx_hash = $1 AND address = $2 AND entry_type = $3 AND asset_name = $4
        "#,
    )
    .bind(tx_hash)
    .bind(address)
    .bind(entry_type)
    .bind(asset_name)
    .fetch_optional(conn)
    .await?;
    Ok(entry)
}

pub async fn insert_entry(
    entry: &NewTransactionEntry,
    conn: &mut SqliteConnection,
) -> Result<TransactionEntry, MarketLedgerError> {
    let row = sqlx::query_as(
        r#"
        INSERT INTO transaction_entries (tx_hash, address, entry_type, asset_name, amount, confirmations, time)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *;
        "#,
    )
    .bind(&entry.tx_hash)
    .bind(&entry.address)
    .bind(entry.entry_type)
    .bind(&entry.asset_name)
    .bind(entry.amount)
    .bind(entry.confirmations)
    .bind(entry.time)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

/// Update an entry in place with the watcher's latest view of amount, confirmations and time.
pub async fn update_entry(
    entry: &NewTransactionEntry,
    conn: &mut SqliteConnection,
) -> Result<TransactionEntry, MarketLedgerError> {
    let row = sqlx::query_as(
        r#"
        UPDATE transaction_entries
        SET amount = $5, confirmations = $6, time = $7, updated_at = CURRENT_TIMESTAMP
        WHERE tx_hash = $1 AND address = $2 AND entry_type = $3 AND asset_name = $4
        RETURNING *;
        "#,
    )
    .bind(&entry.tx_hash)
    .bind(&entry.address)
    .bind(entry.entry_type)
    .bind(&entry.asset_name)
    .bind(entry.amount)
    .bind(entry.confirmations)
    .bind(entry.time)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

/// The number of receive entries sharing `(tx_hash, asset_name)` across the whole entry set. This is the
/// split-payment allocator's divisor, so it deliberately ignores the address.
pub async fn receive_sibling_count(
    tx_hash: &str,
    asset_name: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, MarketLedgerError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM transaction_entries WHERE tx_hash = $1 AND asset_name = $2 AND entry_type = 'receive'",
    )
    .bind(tx_hash)
    .bind(asset_name)
    .fetch_one(conn)
    .await?;
    Ok(count)
}
