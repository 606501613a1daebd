//! Payout settlement reactor tests: success finalisation, terminal failure reversal, idempotency of repeated
//! reports, and the consistency guard on the listing debit.

use std::str::FromStr;

use emg_common::{AssetAmount, EVR_ASSET_NAME};
use evr_marketplace_engine::{
    db_types::{NewTransactionEntry, OrderStatusType, PayoutOutcome, SaleSource},
    events::EventProducers,
    traits::{LedgerReader, MarketLedgerDatabase, MarketLedgerError, SettlementAction},
    HistoryApi,
    LedgerFlowApi,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::support::{fixtures::*, prepare_env::*};

mod support;

fn amt(s: &str) -> AssetAmount {
    AssetAmount::from_str(s).unwrap()
}

async fn setup() -> LedgerFlowApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    LedgerFlowApi::new(db, EventProducers::default())
}

async fn tear_down(mut api: LedgerFlowApi<SqliteDatabase>) {
    let url = api.db().url().to_string();
    api.db_mut().close().await.expect("Error closing database");
    Sqlite::drop_database(&url).await.expect("Error dropping database");
}

/// Drive an order with one `(EVR, 50, 40 + 10)` item all the way to `sale_pending`, with the listing holding
/// 100 confirmed EVR. Returns (listing_id, order_id).
async fn order_at_sale_pending(api: &LedgerFlowApi<SqliteDatabase>, tag: &str) -> (i64, i64) {
    let db = api.db().clone();
    let listing = seed_listing(&db, &format!("p{tag}-deposit"), &format!("p{tag}-seller")).await;
    seed_listing_balance(&db, listing, EVR_ASSET_NAME, amt("100")).await;
    let order = seed_order(&db, listing, &format!("p{tag}-payment"), &format!("p{tag}-buyer")).await;
    seed_order_item(&db, order, EVR_ASSET_NAME, amt("50"), amt("40"), amt("10")).await;
    let entry = NewTransactionEntry::new(format!("tx-{tag}"), format!("p{tag}-payment"), EVR_ASSET_NAME, amt("50"));
    api.process_transaction_entry(entry.clone()).await.expect("Error processing entry");
    api.process_transaction_entry(entry.with_confirmations(2)).await.expect("Error confirming entry");
    assert_eq!(db.fetch_order(order).await.unwrap().unwrap().status, OrderStatusType::SalePending);
    (listing, order)
}

#[tokio::test]
async fn successful_payout_debits_the_listing_and_completes_the_order() {
    let api = setup().await;
    let db = api.db().clone();
    let history = HistoryApi::new(db.clone());
    let (listing, order) = order_at_sale_pending(&api, "ok1").await;

    let action = api.report_order_payout(order, PayoutOutcome::succeeded(amt("0.02"))).await.unwrap();
    assert_eq!(action, SettlementAction::Completed);
    let balance = history.listing_balance(listing, EVR_ASSET_NAME).await.unwrap().unwrap();
    assert_eq!(balance.confirmed_balance, amt("50"));
    assert_eq!(history.order(order).await.unwrap().unwrap().status, OrderStatusType::Completed);
    let payout = history.payout(SaleSource::Order(order)).await.unwrap().unwrap();
    assert!(payout.success);
    assert!(payout.completed_at.is_some());
    assert_eq!(payout.total_fees_paid, amt("0.02"));

    // A duplicate success notification is an idempotent no-op.
    let action = api.report_order_payout(order, PayoutOutcome::succeeded(amt("0.02"))).await.unwrap();
    assert_eq!(action, SettlementAction::Absorbed);
    let balance = history.listing_balance(listing, EVR_ASSET_NAME).await.unwrap().unwrap();
    assert_eq!(balance.confirmed_balance, amt("50"));

    tear_down(api).await;
}

#[tokio::test]
async fn failures_below_the_terminal_count_are_absorbed() {
    let api = setup().await;
    let db = api.db().clone();
    let (listing, order) = order_at_sale_pending(&api, "few1").await;

    for failures in 1..=2 {
        let action = api.report_order_payout(order, PayoutOutcome::failed(failures)).await.unwrap();
        assert_eq!(action, SettlementAction::Absorbed);
    }
    assert_eq!(db.fetch_order(order).await.unwrap().unwrap().status, OrderStatusType::SalePending);
    assert_eq!(db.fetch_sale_history(SaleSource::Order(order)).await.unwrap().len(), 1);
    let balance = db.fetch_listing_balance(listing, EVR_ASSET_NAME).await.unwrap().unwrap();
    assert_eq!(balance.confirmed_balance, amt("100"));

    tear_down(api).await;
}

#[tokio::test]
async fn terminal_failure_reverses_the_sale_and_rearms_the_order() {
    let api = setup().await;
    let db = api.db().clone();
    let (listing, order) = order_at_sale_pending(&api, "term1").await;
    api.report_order_payout(order, PayoutOutcome::failed(1)).await.unwrap();
    api.report_order_payout(order, PayoutOutcome::failed(2)).await.unwrap();

    let action = api.report_order_payout(order, PayoutOutcome::failed(3)).await.unwrap();
    assert_eq!(action, SettlementAction::SaleReversed);
    assert!(db.fetch_sale_history(SaleSource::Order(order)).await.unwrap().is_empty());
    assert_eq!(db.fetch_order(order).await.unwrap().unwrap().status, OrderStatusType::Paid);
    // The listing balance is untouched by a reversal.
    let balance = db.fetch_listing_balance(listing, EVR_ASSET_NAME).await.unwrap().unwrap();
    assert_eq!(balance.confirmed_balance, amt("100"));

    // Replaying the terminal failure carries no edge.
    let action = api.report_order_payout(order, PayoutOutcome::failed(4)).await.unwrap();
    assert_eq!(action, SettlementAction::Absorbed);
    assert_eq!(db.fetch_order(order).await.unwrap().unwrap().status, OrderStatusType::Paid);

    // An explicit retry records the sale afresh, after which the payout can settle.
    let sales = api.retry_sale(SaleSource::Order(order)).await.unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(db.fetch_order(order).await.unwrap().unwrap().status, OrderStatusType::SalePending);
    let action = api.report_order_payout(order, PayoutOutcome::succeeded(amt("0.01"))).await.unwrap();
    assert_eq!(action, SettlementAction::Completed);
    let balance = db.fetch_listing_balance(listing, EVR_ASSET_NAME).await.unwrap().unwrap();
    assert_eq!(balance.confirmed_balance, amt("50"));

    tear_down(api).await;
}

#[tokio::test]
async fn sales_cannot_be_retried_outside_paid_status() {
    let api = setup().await;
    let (_listing, order) = order_at_sale_pending(&api, "retry1").await;

    let err = api.retry_sale(SaleSource::Order(order)).await.unwrap_err();
    assert!(matches!(err, MarketLedgerError::SaleRetryForbidden { status: OrderStatusType::SalePending, .. }));

    tear_down(api).await;
}

#[tokio::test]
async fn negative_listing_balance_on_settlement_is_fatal() {
    let api = setup().await;
    let db = api.db().clone();
    let (listing, order) = order_at_sale_pending(&api, "neg1").await;

    // Someone broke the invariant between sale recording and payout settlement.
    set_listing_balance(&db, listing, EVR_ASSET_NAME, amt("10")).await;

    let err = api.report_order_payout(order, PayoutOutcome::succeeded(amt("0"))).await.unwrap_err();
    assert!(matches!(err, MarketLedgerError::BalanceInvariantViolation { .. }));
    // The settlement rolled back as a unit: no payout row, status unchanged.
    assert!(db.fetch_payout(SaleSource::Order(order)).await.unwrap().is_none());
    assert_eq!(db.fetch_order(order).await.unwrap().unwrap().status, OrderStatusType::SalePending);
    let balance = db.fetch_listing_balance(listing, EVR_ASSET_NAME).await.unwrap().unwrap();
    assert_eq!(balance.confirmed_balance, amt("10"));

    tear_down(api).await;
}

#[tokio::test]
async fn cart_order_payouts_settle_every_line() {
    let api = setup().await;
    let db = api.db().clone();
    let listing_a = seed_listing(&db, "pc1a-deposit", "pc1a-seller").await;
    let listing_b = seed_listing(&db, "pc1b-deposit", "pc1b-seller").await;
    seed_listing_balance(&db, listing_a, "BOOKS", amt("5")).await;
    seed_listing_balance(&db, listing_b, "VINYL", amt("5")).await;
    let cart = seed_cart_order(&db, "pc1-payment", "pc1-buyer").await;
    seed_cart_order_item(&db, cart, listing_a, "BOOKS", amt("1"), amt("15"), amt("1")).await;
    seed_cart_order_item(&db, cart, listing_b, "VINYL", amt("2"), amt("30"), amt("4")).await;

    let entry = NewTransactionEntry::new("tx-pc1", "pc1-payment", EVR_ASSET_NAME, amt("50"));
    api.process_transaction_entry(entry.clone()).await.unwrap();
    api.process_transaction_entry(entry.with_confirmations(2)).await.unwrap();
    assert_eq!(db.fetch_cart_order(cart).await.unwrap().unwrap().status, OrderStatusType::SalePending);

    let action = api.report_cart_order_payout(cart, PayoutOutcome::succeeded(amt("0.04"))).await.unwrap();
    assert_eq!(action, SettlementAction::Completed);
    assert_eq!(db.fetch_cart_order(cart).await.unwrap().unwrap().status, OrderStatusType::Completed);
    let books = db.fetch_listing_balance(listing_a, "BOOKS").await.unwrap().unwrap();
    let vinyl = db.fetch_listing_balance(listing_b, "VINYL").await.unwrap().unwrap();
    assert_eq!(books.confirmed_balance, amt("4"));
    assert_eq!(vinyl.confirmed_balance, amt("3"));
    let payout = db.fetch_payout(SaleSource::CartOrder(cart)).await.unwrap().unwrap();
    assert!(payout.success && payout.completed_at.is_some());

    tear_down(api).await;
}

#[tokio::test]
async fn cart_order_terminal_failure_reverses_all_lines() {
    let api = setup().await;
    let db = api.db().clone();
    let listing = seed_listing(&db, "pc2-deposit", "pc2-seller").await;
    seed_listing_balance(&db, listing, "BOOKS", amt("5")).await;
    let cart = seed_cart_order(&db, "pc2-payment", "pc2-buyer").await;
    seed_cart_order_item(&db, cart, listing, "BOOKS", amt("1"), amt("10"), amt("0")).await;
    seed_cart_order_item(&db, cart, listing, "BOOKS", amt("2"), amt("20"), amt("0")).await;

    let entry = NewTransactionEntry::new("tx-pc2", "pc2-payment", EVR_ASSET_NAME, amt("30")).with_confirmations(2);
    api.process_transaction_entry(entry).await.unwrap();
    assert_eq!(db.fetch_sale_history(SaleSource::CartOrder(cart)).await.unwrap().len(), 2);

    let action = api.report_cart_order_payout(cart, PayoutOutcome::failed(3)).await.unwrap();
    assert_eq!(action, SettlementAction::SaleReversed);
    assert!(db.fetch_sale_history(SaleSource::CartOrder(cart)).await.unwrap().is_empty());
    assert_eq!(db.fetch_cart_order(cart).await.unwrap().unwrap().status, OrderStatusType::Paid);

    tear_down(api).await;
}
