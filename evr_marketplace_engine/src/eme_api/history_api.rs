use crate::{
    db_types::{Balance, CartOrder, Listing, Order, Payout, SaleRecord, SaleSource},
    traits::{LedgerReader, MarketLedgerError},
};

/// Read access to the ledger: order and cart-order records, balances, payouts and sale history. This is the
/// core's output surface; all mutation goes through [`crate::LedgerFlowApi`].
#[derive(Debug, Clone)]
pub struct HistoryApi<B> {
    db: B,
}

impl<B> HistoryApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> HistoryApi<B>
where B: LedgerReader
{
    pub async fn listing(&self, listing_id: i64) -> Result<Option<Listing>, MarketLedgerError> {
        self.db.fetch_listing(listing_id).await
    }

    pub async fn order(&self, order_id: i64) -> Result<Option<Order>, MarketLedgerError> {
        self.db.fetch_order(order_id).await
    }

    pub async fn cart_order(&self, cart_order_id: i64) -> Result<Option<CartOrder>, MarketLedgerError> {
        self.db.fetch_cart_order(cart_order_id).await
    }

    pub async fn listing_balance(
        &self,
        listing_id: i64,
        asset_name: &str,
    ) -> Result<Option<Balance>, MarketLedgerError> {
        self.db.fetch_listing_balance(listing_id, asset_name).await
    }

    pub async fn order_balance(&self, order_id: i64, asset_name: &str) -> Result<Option<Balance>, MarketLedgerError> {
        self.db.fetch_order_balance(order_id, asset_name).await
    }

    pub async fn cart_order_balance(
        &self,
        cart_order_id: i64,
        asset_name: &str,
    ) -> Result<Option<Balance>, MarketLedgerError> {
        self.db.fetch_cart_order_balance(cart_order_id, asset_name).await
    }

    pub async fn sale_history(&self, source: SaleSource) -> Result<Vec<SaleRecord>, MarketLedgerError> {
        self.db.fetch_sale_history(source).await
    }

    pub async fn payout(&self, source: SaleSource) -> Result<Option<Payout>, MarketLedgerError> {
        self.db.fetch_payout(source).await
    }
}
