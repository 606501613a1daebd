use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Order, OrderItem, OrderStatusType, SaleLine},
    traits::MarketLedgerError,
};

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, MarketLedgerError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

/// Resolve the order owning the given payment address, if any. Payment addresses are unique per order.
pub async fn order_for_payment_address(
    address: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, MarketLedgerError> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE payment_address = $1").bind(address).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_items(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderItem>, MarketLedgerError> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// The order's item lines as sale lines. A single-listing order draws every line from the order's own listing.
pub async fn sale_lines(order: &Order, conn: &mut SqliteConnection) -> Result<Vec<SaleLine>, MarketLedgerError> {
    let items = fetch_order_items(order.id, conn).await?;
    let lines = items
        .into_iter()
        .map(|i| SaleLine {
            listing_id: order.listing_id,
            asset_name: i.asset_name,
            amount: i.amount,
            price_evr: i.price_evr,
            fee_evr: i.fee_evr,
        })
        .collect();
    Ok(lines)
}

pub(crate) async fn update_order_status(
    id: i64,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Order, MarketLedgerError> {
    trace!("🗃️ Order #{id} status set to {status}");
    let result: Option<Order> =
        sqlx::query_as("UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status)
            .bind(id)
            .fetch_optional(conn)
            .await?;
    result.ok_or(MarketLedgerError::OrderNotFound(id))
}
