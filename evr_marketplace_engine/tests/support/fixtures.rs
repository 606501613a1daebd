//! Seed helpers for the rows this crate never writes itself: listings, orders, cart orders and their items are
//! owned by the marketplace CRUD surface in production, so tests insert them directly.

use emg_common::AssetAmount;
use evr_marketplace_engine::SqliteDatabase;

pub async fn seed_listing(db: &SqliteDatabase, deposit_address: &str, seller_address: &str) -> i64 {
    let (id,): (i64,) =
        sqlx::query_as("INSERT INTO listings (deposit_address, seller_address) VALUES ($1, $2) RETURNING id")
            .bind(deposit_address)
            .bind(seller_address)
            .fetch_one(db.pool())
            .await
            .expect("Error seeding listing");
    id
}

pub async fn seed_listing_balance(db: &SqliteDatabase, listing_id: i64, asset_name: &str, confirmed: AssetAmount) {
    sqlx::query("INSERT INTO listing_balances (listing_id, asset_name, confirmed_balance) VALUES ($1, $2, $3)")
        .bind(listing_id)
        .bind(asset_name)
        .bind(confirmed)
        .execute(db.pool())
        .await
        .expect("Error seeding listing balance");
}

pub async fn set_listing_balance(db: &SqliteDatabase, listing_id: i64, asset_name: &str, confirmed: AssetAmount) {
    sqlx::query("UPDATE listing_balances SET confirmed_balance = $3 WHERE listing_id = $1 AND asset_name = $2")
        .bind(listing_id)
        .bind(asset_name)
        .bind(confirmed)
        .execute(db.pool())
        .await
        .expect("Error updating listing balance");
}

pub async fn seed_order(db: &SqliteDatabase, listing_id: i64, payment_address: &str, buyer_address: &str) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO orders (listing_id, payment_address, buyer_address) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(listing_id)
    .bind(payment_address)
    .bind(buyer_address)
    .fetch_one(db.pool())
    .await
    .expect("Error seeding order");
    id
}

pub async fn seed_order_item(
    db: &SqliteDatabase,
    order_id: i64,
    asset_name: &str,
    amount: AssetAmount,
    price_evr: AssetAmount,
    fee_evr: AssetAmount,
) {
    sqlx::query("INSERT INTO order_items (order_id, asset_name, amount, price_evr, fee_evr) VALUES ($1, $2, $3, $4, $5)")
        .bind(order_id)
        .bind(asset_name)
        .bind(amount)
        .bind(price_evr)
        .bind(fee_evr)
        .execute(db.pool())
        .await
        .expect("Error seeding order item");
}

pub async fn seed_cart_order(db: &SqliteDatabase, payment_address: &str, buyer_address: &str) -> i64 {
    let (id,): (i64,) =
        sqlx::query_as("INSERT INTO cart_orders (payment_address, buyer_address) VALUES ($1, $2) RETURNING id")
            .bind(payment_address)
            .bind(buyer_address)
            .fetch_one(db.pool())
            .await
            .expect("Error seeding cart order");
    id
}

pub async fn seed_cart_order_item(
    db: &SqliteDatabase,
    cart_order_id: i64,
    listing_id: i64,
    asset_name: &str,
    amount: AssetAmount,
    price_evr: AssetAmount,
    fee_evr: AssetAmount,
) {
    sqlx::query(
        "INSERT INTO cart_order_items (cart_order_id, listing_id, asset_name, amount, price_evr, fee_evr) VALUES \
         ($1, $2, $3, $4, $5, $6)",
    )
    .bind(cart_order_id)
    .bind(listing_id)
    .bind(asset_name)
    .bind(amount)
    .bind(price_evr)
    .bind(fee_evr)
    .execute(db.pool())
    .await
    .expect("Error seeding cart order item");
}
