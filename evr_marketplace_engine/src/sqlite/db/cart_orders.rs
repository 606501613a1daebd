use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CartOrder, CartOrderItem, OrderStatusType, SaleLine},
    traits::MarketLedgerError,
};

pub async fn fetch_cart_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<CartOrder>, MarketLedgerError> {
    let order = sqlx::query_as("SELECT * FROM cart_orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn cart_order_for_payment_address(
    address: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<CartOrder>, MarketLedgerError> {
    let order = sqlx::query_as("SELECT * FROM cart_orders WHERE payment_address = $1")
        .bind(address)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_cart_order_items(
    cart_order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<CartOrderItem>, MarketLedgerError> {
    let items = sqlx::query_as("SELECT * FROM cart_order_items WHERE cart_order_id = $1 ORDER BY id")
        .bind(cart_order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// The cart's item lines as sale lines. Every line carries its own listing in a multi-seller checkout.
pub async fn sale_lines(cart_order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<SaleLine>, MarketLedgerError> {
    let items = fetch_cart_order_items(cart_order_id, conn).await?;
    let lines = items
        .into_iter()
        .map(|i| SaleLine {
            listing_id: i.listing_id,
            asset_name: i.asset_name,
            amount: i.amount,
            price_evr: i.price_evr,
            fee_evr: i.fee_evr,
        })
        .collect();
    Ok(lines)
}

pub(crate) async fn update_cart_order_status(
    id: i64,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<CartOrder, MarketLedgerError> {
    trace!("🗃️ Cart order #{id} status set to {status}");
    let result: Option<CartOrder> =
        sqlx::query_as("UPDATE cart_orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status)
            .bind(id)
            .fetch_optional(conn)
            .await?;
    result.ok_or(MarketLedgerError::CartOrderNotFound(id))
}
