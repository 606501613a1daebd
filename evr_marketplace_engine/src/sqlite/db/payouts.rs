use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Payout, PayoutOutcome, SaleSource},
    traits::MarketLedgerError,
};

fn payout_table(source: SaleSource) -> (&'static str, &'static str) {
    match source {
        SaleSource::Order(_) => ("order_payouts", "order_id"),
        SaleSource::CartOrder(_) => ("cart_order_payouts", "cart_order_id"),
    }
}

fn source_id(source: SaleSource) -> i64 {
    match source {
        SaleSource::Order(id) | SaleSource::CartOrder(id) => id,
    }
}

fn select_columns(source: SaleSource) -> String {
    let (_, owner_col) = payout_table(source);
    format!(
        "{owner_col} as owner_id, success, failure_count, total_fees_paid, last_attempt_time, completed_at, \
         created_at, updated_at"
    )
}

pub async fn fetch_payout(
    source: SaleSource,
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, MarketLedgerError> {
    let (table, owner_col) = payout_table(source);
    let q = format!("SELECT {columns} FROM {table} WHERE {owner_col} = $1", columns = select_columns(source));
    let payout = sqlx::query_as(&q).bind(source_id(source)).fetch_optional(conn).await?;
    Ok(payout)
}

/// Store a reported payout outcome. The success flag is flipped with a compare-and-set (`WHERE success = 0`), so
/// a report racing a concurrent success commits nothing; `None` is returned in that case and the caller must
/// treat the report as absorbed.
pub async fn upsert_outcome(
    source: SaleSource,
    outcome: &PayoutOutcome,
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, MarketLedgerError> {
    let (table, owner_col) = payout_table(source);
    let existing = fetch_payout(source, conn).await?;
    let payout = match existing {
        None => {
            let q = format!(
                "INSERT INTO {table} ({owner_col}, success, failure_count, total_fees_paid, last_attempt_time) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {columns}",
                columns = select_columns(source),
            );
            let payout = sqlx::query_as(&q)
                .bind(source_id(source))
                .bind(outcome.success)
                .bind(outcome.failure_count)
                .bind(outcome.total_fees_paid)
                .bind(outcome.last_attempt_time)
                .fetch_one(conn)
                .await?;
            Some(payout)
        },
        Some(_) => {
            let q = format!(
                "UPDATE {table} SET success = $2, failure_count = $3, total_fees_paid = $4, last_attempt_time = $5, \
                 updated_at = CURRENT_TIMESTAMP WHERE {owner_col} = $1 AND success = 0 RETURNING {columns}",
                columns = select_columns(source),
            );
            sqlx::query_as(&q)
                .bind(source_id(source))
                .bind(outcome.success)
                .bind(outcome.failure_count)
                .bind(outcome.total_fees_paid)
                .bind(outcome.last_attempt_time)
                .fetch_optional(conn)
                .await?
        },
    };
    if payout.is_none() {
        debug!("🗃️ Payout for {source} already settled; outcome report absorbed");
    }
    Ok(payout)
}

/// Stamp the completion time once a successful payout has been settled.
pub async fn mark_completed(source: SaleSource, conn: &mut SqliteConnection) -> Result<Payout, MarketLedgerError> {
    let (table, owner_col) = payout_table(source);
    let q = format!(
        "UPDATE {table} SET completed_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP WHERE {owner_col} = $1 \
         AND success = 1 RETURNING {columns}",
        columns = select_columns(source),
    );
    let payout = sqlx::query_as(&q).bind(source_id(source)).fetch_one(conn).await?;
    Ok(payout)
}
