//! Balance upserts for listings, orders and cart orders. The three balance tables share one shape, so every
//! function here takes a [`BalanceOwner`] and formats in the table and owner-column names (both are static
//! strings supplied by the enum, never user input).
//!
//! The upserts are written as explicit read-or-create-then-update sequences. They must run inside the caller's
//! transaction: the caller owns atomicity with respect to the entry write that triggered them.

use chrono::{DateTime, Utc};
use emg_common::AssetAmount;
use log::trace;
use sqlx::SqliteConnection;

use crate::{db_types::Balance, traits::{BalanceOwner, MarketLedgerError}};

fn select_columns(owner: BalanceOwner) -> String {
    format!(
        "{owner_col} as owner_id, asset_name, confirmed_balance, pending_balance, last_confirmed_tx_hash, \
         last_confirmed_tx_time, updated_at",
        owner_col = owner.owner_column()
    )
}

pub async fn fetch_balance(
    owner: BalanceOwner,
    asset_name: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Balance>, MarketLedgerError> {
    let q = format!(
        "SELECT {columns} FROM {table} WHERE {owner_col} = $1 AND asset_name = $2",
        columns = select_columns(owner),
        table = owner.balance_table(),
        owner_col = owner.owner_column(),
    );
    let balance = sqlx::query_as(&q).bind(owner.id()).bind(asset_name).fetch_optional(conn).await?;
    Ok(balance)
}

async fn insert_balance(
    owner: BalanceOwner,
    asset_name: &str,
    confirmed: AssetAmount,
    pending: AssetAmount,
    conn: &mut SqliteConnection,
) -> Result<Balance, MarketLedgerError> {
    let q = format!(
        "INSERT INTO {table} ({owner_col}, asset_name, confirmed_balance, pending_balance) VALUES ($1, $2, $3, $4) \
         RETURNING {columns}",
        table = owner.balance_table(),
        owner_col = owner.owner_column(),
        columns = select_columns(owner),
    );
    let balance =
        sqlx::query_as(&q).bind(owner.id()).bind(asset_name).bind(confirmed).bind(pending).fetch_one(conn).await?;
    Ok(balance)
}

/// Credit a freshly observed (still unconfirmed) amount to the owner's pending balance, creating the balance row
/// on first contact.
pub async fn credit_pending(
    owner: BalanceOwner,
    asset_name: &str,
    amount: AssetAmount,
    conn: &mut SqliteConnection,
) -> Result<Balance, MarketLedgerError> {
    let balance = match fetch_balance(owner, asset_name, conn).await? {
        None => insert_balance(owner, asset_name, AssetAmount::zero(), amount, conn).await?,
        Some(current) => {
            let q = format!(
                "UPDATE {table} SET pending_balance = $3, updated_at = CURRENT_TIMESTAMP WHERE {owner_col} = $1 AND \
                 asset_name = $2 RETURNING {columns}",
                table = owner.balance_table(),
                owner_col = owner.owner_column(),
                columns = select_columns(owner),
            );
            sqlx::query_as(&q)
                .bind(owner.id())
                .bind(asset_name)
                .bind(current.pending_balance + amount)
                .fetch_one(conn)
                .await?
        },
    };
    trace!("🗃️ Credited {amount} pending {asset_name} to {owner}");
    Ok(balance)
}

/// Move a newly confirmed amount from pending to confirmed and stamp the confirming transaction. The pending
/// side is clamped at zero; sibling-count drift between insert and confirmation must never drive it negative.
pub async fn confirm_pending(
    owner: BalanceOwner,
    asset_name: &str,
    amount: AssetAmount,
    tx_hash: &str,
    tx_time: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Balance, MarketLedgerError> {
    let current = match fetch_balance(owner, asset_name, conn).await? {
        Some(b) => b,
        None => insert_balance(owner, asset_name, AssetAmount::zero(), AssetAmount::zero(), conn).await?,
    };
    let confirmed = current.confirmed_balance + amount;
    let pending = (current.pending_balance - amount).clamp_non_negative();
    let q = format!(
        "UPDATE {table} SET confirmed_balance = $3, pending_balance = $4, last_confirmed_tx_hash = $5, \
         last_confirmed_tx_time = $6, updated_at = CURRENT_TIMESTAMP WHERE {owner_col} = $1 AND asset_name = $2 \
         RETURNING {columns}",
        table = owner.balance_table(),
        owner_col = owner.owner_column(),
        columns = select_columns(owner),
    );
    let balance = sqlx::query_as(&q)
        .bind(owner.id())
        .bind(asset_name)
        .bind(confirmed)
        .bind(pending)
        .bind(tx_hash)
        .bind(tx_time)
        .fetch_one(conn)
        .await?;
    trace!("🗃️ Confirmed {amount} {asset_name} for {owner} (tx {tx_hash})");
    Ok(balance)
}

/// Debit a listing's confirmed balance when a payout settles. A negative result is not clamped: it means the
/// sale/balance invariant was already broken upstream, and the whole settlement must abort.
pub async fn debit_confirmed(
    listing_id: i64,
    asset_name: &str,
    amount: AssetAmount,
    conn: &mut SqliteConnection,
) -> Result<Balance, MarketLedgerError> {
    let owner = BalanceOwner::Listing(listing_id);
    let current = fetch_balance(owner, asset_name, conn).await?.unwrap_or_else(|| Balance::empty(listing_id, asset_name));
    let confirmed = current.confirmed_balance - amount;
    if confirmed.is_negative() {
        return Err(MarketLedgerError::BalanceInvariantViolation {
            listing_id,
            asset_name: asset_name.to_string(),
            balance: confirmed,
        });
    }
    let q = format!(
        "UPDATE {table} SET confirmed_balance = $3, updated_at = CURRENT_TIMESTAMP WHERE {owner_col} = $1 AND \
         asset_name = $2 RETURNING {columns}",
        table = owner.balance_table(),
        owner_col = owner.owner_column(),
        columns = select_columns(owner),
    );
    let balance = sqlx::query_as(&q).bind(listing_id).bind(asset_name).bind(confirmed).fetch_one(conn).await?;
    trace!("🗃️ Debited {amount} confirmed {asset_name} from listing #{listing_id}");
    Ok(balance)
}
