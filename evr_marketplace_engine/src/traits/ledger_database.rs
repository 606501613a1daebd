use emg_common::AssetAmount;
use thiserror::Error;

use crate::{
    db_types::{
        Balance,
        CartOrder,
        EntryType,
        Listing,
        NewTransactionEntry,
        Order,
        OrderStatusType,
        Payout,
        PayoutOutcome,
        SaleLine,
        SaleRecord,
        SaleSource,
        TransactionEntry,
    },
    traits::{EntryOutcome, SettlementAction},
};

/// The highest level of behaviour for backends supporting the marketplace ledger.
///
/// A backend is responsible for:
/// * Ingesting transaction-entry writes from the chain watcher and cascading them through the balance ledger,
///   the payment status machine and the sale recorder, all inside one storage transaction.
/// * Reacting to payout outcome reports, either finalising a sale or reversing it after terminal failure.
/// * Re-running the sale recorder on explicit request for orders re-armed by a payout reversal.
#[allow(async_fn_in_trait)]
pub trait MarketLedgerDatabase: Clone + LedgerReader {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Insert-or-update a transaction entry, keyed by `(tx_hash, address, entry_type, asset_name)`, and apply the
    /// full cascade: split-payment allocation, balance upserts, threshold-crossing confirmation, status
    /// derivation and sale recording. The entry write and every cascading effect commit or roll back as a unit;
    /// in particular an insufficient listing balance aborts the whole write.
    async fn process_transaction_entry(&self, entry: NewTransactionEntry) -> Result<EntryOutcome, MarketLedgerError>;

    /// Record a payout outcome for an order and react to the edge it carries, if any.
    ///
    /// A success flag transition (false to true, compare-and-set, at most once) debits each item's listing
    /// confirmed balance, marks the order `completed` and stamps `completed_at`. A failure count crossing the
    /// terminal threshold deletes the order's sale records and puts the order back at `paid`. Reports carrying
    /// neither edge, including repeated success notifications, are absorbed without effect.
    async fn report_order_payout(
        &self,
        order_id: i64,
        outcome: PayoutOutcome,
    ) -> Result<SettlementAction, MarketLedgerError>;

    /// As [`Self::report_order_payout`], for a cart order.
    async fn report_cart_order_payout(
        &self,
        cart_order_id: i64,
        outcome: PayoutOutcome,
    ) -> Result<SettlementAction, MarketLedgerError>;

    /// Re-run the sale recorder for an order or cart order currently at `paid`, the state a payout reversal
    /// leaves it in. Verifies listing inventory, advances the status to `sale_pending` and writes fresh sale
    /// records, atomically.
    async fn retry_sale(&self, source: SaleSource) -> Result<Vec<SaleRecord>, MarketLedgerError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), MarketLedgerError> {
        Ok(())
    }
}

/// Read access to the ledger: statuses, balances and sale history. This is the core's output surface.
#[allow(async_fn_in_trait)]
pub trait LedgerReader: Clone {
    async fn fetch_transaction_entry(
        &self,
        tx_hash: &str,
        address: &str,
        entry_type: EntryType,
        asset_name: &str,
    ) -> Result<Option<TransactionEntry>, MarketLedgerError>;

    async fn fetch_listing(&self, listing_id: i64) -> Result<Option<Listing>, MarketLedgerError>;

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, MarketLedgerError>;

    async fn fetch_cart_order(&self, cart_order_id: i64) -> Result<Option<CartOrder>, MarketLedgerError>;

    /// The item lines of an order or cart order, each annotated with the listing it draws from.
    async fn fetch_sale_lines(&self, source: SaleSource) -> Result<Vec<SaleLine>, MarketLedgerError>;

    async fn fetch_listing_balance(
        &self,
        listing_id: i64,
        asset_name: &str,
    ) -> Result<Option<Balance>, MarketLedgerError>;

    async fn fetch_order_balance(&self, order_id: i64, asset_name: &str)
        -> Result<Option<Balance>, MarketLedgerError>;

    async fn fetch_cart_order_balance(
        &self,
        cart_order_id: i64,
        asset_name: &str,
    ) -> Result<Option<Balance>, MarketLedgerError>;

    /// All sale records written for the given order or cart order.
    async fn fetch_sale_history(&self, source: SaleSource) -> Result<Vec<SaleRecord>, MarketLedgerError>;

    async fn fetch_payout(&self, source: SaleSource) -> Result<Option<Payout>, MarketLedgerError>;
}

#[derive(Debug, Clone, Error)]
pub enum MarketLedgerError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested listing #{0} does not exist")]
    ListingNotFound(i64),
    #[error("The requested order #{0} does not exist")]
    OrderNotFound(i64),
    #[error("The requested cart order #{0} does not exist")]
    CartOrderNotFound(i64),
    #[error(
        "Listing #{listing_id} has insufficient confirmed {asset_name} to cover the sale: {available} available, \
         {required} required"
    )]
    InsufficientListingBalance { listing_id: i64, asset_name: String, available: AssetAmount, required: AssetAmount },
    #[error(
        "Listing #{listing_id} confirmed {asset_name} balance would become negative ({balance}) after the payout \
         debit. The sale/balance invariant was broken upstream"
    )]
    BalanceInvariantViolation { listing_id: i64, asset_name: String, balance: AssetAmount },
    #[error("A sale can only be retried from 'paid' status; {sale_source} is currently '{status}'")]
    SaleRetryForbidden { sale_source: SaleSource, status: OrderStatusType },
}

impl From<sqlx::Error> for MarketLedgerError {
    fn from(e: sqlx::Error) -> Self {
        MarketLedgerError::DatabaseError(e.to_string())
    }
}
