use emg_common::AssetAmount;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{SaleRecord, SaleSource},
    traits::MarketLedgerError,
};

/// The payload for one new sale-history row. The XOR between order and cart order is carried by [`SaleSource`];
/// the twin nullable columns only exist at the storage boundary.
#[derive(Debug, Clone)]
pub struct NewSaleRecord {
    pub listing_id: i64,
    pub source: SaleSource,
    pub asset_name: String,
    pub amount: AssetAmount,
    pub price_evr: AssetAmount,
    pub seller_address: String,
    pub buyer_address: String,
}

pub async fn insert_sale(
    sale: NewSaleRecord,
    conn: &mut SqliteConnection,
) -> Result<SaleRecord, MarketLedgerError> {
    let record = sqlx::query_as(
        r#"
        INSERT INTO sale_history (listing_id, order_id, cart_order_id, asset_name, amount, price_evr,
                                  seller_address, buyer_address)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *;
        "#,
    )
    .bind(sale.listing_id)
    .bind(sale.source.order_id())
    .bind(sale.source.cart_order_id())
    .bind(&sale.asset_name)
    .bind(sale.amount)
    .bind(sale.price_evr)
    .bind(&sale.seller_address)
    .bind(&sale.buyer_address)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Sale of {} {} from listing #{} recorded for {}", sale.amount, sale.asset_name, sale.listing_id, sale.source);
    Ok(record)
}

pub async fn fetch_sales_for_source(
    source: SaleSource,
    conn: &mut SqliteConnection,
) -> Result<Vec<SaleRecord>, MarketLedgerError> {
    let (clause, id) = source_clause(source);
    let q = format!("SELECT * FROM sale_history WHERE {clause} ORDER BY id");
    let sales = sqlx::query_as(&q).bind(id).fetch_all(conn).await?;
    Ok(sales)
}

/// Remove the sale records for a terminally failed payout. Returns the number of rows deleted.
pub async fn delete_sales_for_source(
    source: SaleSource,
    conn: &mut SqliteConnection,
) -> Result<u64, MarketLedgerError> {
    let (clause, id) = source_clause(source);
    let q = format!("DELETE FROM sale_history WHERE {clause}");
    let result = sqlx::query(&q).bind(id).execute(conn).await?;
    debug!("🗃️ {} sale record(s) for {source} deleted", result.rows_affected());
    Ok(result.rows_affected())
}

fn source_clause(source: SaleSource) -> (&'static str, i64) {
    match source {
        SaleSource::Order(id) => ("order_id = $1", id),
        SaleSource::CartOrder(id) => ("cart_order_id = $1", id),
    }
}
