//! `SqliteDatabase` is a concrete implementation of a marketplace ledger backend.
//!
//! Every inbound event (transaction-entry write, payout outcome, explicit sale retry) is processed inside a
//! single SQLite transaction, so the triggering write and all of its cascading effects commit or roll back as one
//! unit. SQLite's single-writer transactions serialize concurrent deliveries for the same keys.
use std::fmt::Debug;

use emg_common::{AssetAmount, EVR_ASSET_NAME};
use log::*;
use sqlx::{SqliteConnection, SqlitePool};

use super::db::{balances, cart_orders, db_url, listings, new_pool, orders, payouts, sales, tx_entries};
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
    helpers::{crosses_confirmation_threshold, derive_payment_status, split_attributable_amount, TERMINAL_PAYOUT_FAILURES},
    sqlite::db::sales::NewSaleRecord,
    traits::{BalanceOwner, EntryOutcome, LedgerReader, MarketLedgerDatabase, MarketLedgerError, SettlementAction, StatusChange},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the environment.
    pub async fn new(max_connections: u32) -> Result<Self, MarketLedgerError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, MarketLedgerError> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Resolve every owner whose deposit/payment address matches. A single address matches at most one row per
    /// table, but the three tables are checked independently.
    async fn owners_for_address(
        address: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<BalanceOwner>, MarketLedgerError> {
        let mut owners = Vec::with_capacity(1);
        if let Some(listing) = listings::listing_for_deposit_address(address, conn).await? {
            owners.push(BalanceOwner::Listing(listing.id));
        }
        if let Some(order) = orders::order_for_payment_address(address, conn).await? {
            owners.push(BalanceOwner::Order(order.id));
        }
        if let Some(cart) = cart_orders::cart_order_for_payment_address(address, conn).await? {
            owners.push(BalanceOwner::CartOrder(cart.id));
        }
        Ok(owners)
    }

    async fn source_status(
        source: SaleSource,
        conn: &mut SqliteConnection,
    ) -> Result<OrderStatusType, MarketLedgerError> {
        match source {
            SaleSource::Order(id) => {
                let order = orders::fetch_order(id, conn).await?.ok_or(MarketLedgerError::OrderNotFound(id))?;
                Ok(order.status)
            },
            SaleSource::CartOrder(id) => {
                let cart =
                    cart_orders::fetch_cart_order(id, conn).await?.ok_or(MarketLedgerError::CartOrderNotFound(id))?;
                Ok(cart.status)
            },
        }
    }

    async fn update_source_status(
        source: SaleSource,
        status: OrderStatusType,
        conn: &mut SqliteConnection,
    ) -> Result<(), MarketLedgerError> {
        match source {
            SaleSource::Order(id) => orders::update_order_status(id, status, conn).await.map(|_| ()),
            SaleSource::CartOrder(id) => cart_orders::update_cart_order_status(id, status, conn).await.map(|_| ()),
        }
    }

    async fn source_sale_lines(
        source: SaleSource,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<SaleLine>, MarketLedgerError> {
        match source {
            SaleSource::Order(id) => {
                let order = orders::fetch_order(id, conn).await?.ok_or(MarketLedgerError::OrderNotFound(id))?;
                orders::sale_lines(&order, conn).await
            },
            SaleSource::CartOrder(id) => cart_orders::sale_lines(id, conn).await,
        }
    }

    async fn source_buyer_address(
        source: SaleSource,
        conn: &mut SqliteConnection,
    ) -> Result<String, MarketLedgerError> {
        match source {
            SaleSource::Order(id) => {
                let order = orders::fetch_order(id, conn).await?.ok_or(MarketLedgerError::OrderNotFound(id))?;
                Ok(order.buyer_address)
            },
            SaleSource::CartOrder(id) => {
                let cart =
                    cart_orders::fetch_cart_order(id, conn).await?.ok_or(MarketLedgerError::CartOrderNotFound(id))?;
                Ok(cart.buyer_address)
            },
        }
    }

    /// Re-derive the payment status for an order or cart order after its EVR balance changed. Returns the status
    /// change applied, if any, along with any sale records written because the change landed on `paid`.
    async fn reevaluate_status(
        source: SaleSource,
        conn: &mut SqliteConnection,
    ) -> Result<(Option<StatusChange>, Vec<SaleRecord>), MarketLedgerError> {
        let current = Self::source_status(source, conn).await?;
        if !current.is_payment_derived() {
            trace!("🔄️ {source} is at '{current}', outside the payment machine's range. Leaving it alone.");
            return Ok((None, Vec::new()));
        }
        let lines = Self::source_sale_lines(source, conn).await?;
        let total_required: AssetAmount = lines.iter().map(SaleLine::required_evr).sum();
        let owner = match source {
            SaleSource::Order(id) => BalanceOwner::Order(id),
            SaleSource::CartOrder(id) => BalanceOwner::CartOrder(id),
        };
        let balance = balances::fetch_balance(owner, EVR_ASSET_NAME, conn)
            .await?
            .unwrap_or_else(|| Balance::empty(owner.id(), EVR_ASSET_NAME));
        let new_status =
            derive_payment_status(balance.confirmed_balance, balance.pending_balance, total_required);
        if new_status == current {
            return Ok((None, Vec::new()));
        }
        Self::update_source_status(source, new_status, conn).await?;
        debug!(
            "🔄️ {source} moved from '{current}' to '{new_status}' (confirmed {}, pending {}, required \
             {total_required})",
            balance.confirmed_balance, balance.pending_balance
        );
        let sales = if new_status == OrderStatusType::Paid {
            Self::record_sale(source, conn).await?
        } else {
            Vec::new()
        };
        Ok((Some(StatusChange { source, old_status: current, new_status }), sales))
    }

    /// The sale recorder. Verifies that every item's listing has enough confirmed inventory, advances the status
    /// to `sale_pending` and writes one sale record per item. Any shortfall aborts with an error, which rolls the
    /// caller's whole transaction back.
    async fn record_sale(
        source: SaleSource,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<SaleRecord>, MarketLedgerError> {
        let buyer_address = Self::source_buyer_address(source, conn).await?;
        let lines = Self::source_sale_lines(source, conn).await?;
        let mut checked = Vec::with_capacity(lines.len());
        for line in lines {
            let listing = listings::fetch_listing(line.listing_id, conn)
                .await?
                .ok_or(MarketLedgerError::ListingNotFound(line.listing_id))?;
            let balance = balances::fetch_balance(BalanceOwner::Listing(line.listing_id), &line.asset_name, conn)
                .await?
                .unwrap_or_else(|| Balance::empty(line.listing_id, &line.asset_name));
            if balance.confirmed_balance < line.amount {
                warn!(
                    "🔄️ Rejecting sale for {source}: listing #{} holds {} confirmed {}, item needs {}",
                    line.listing_id, balance.confirmed_balance, line.asset_name, line.amount
                );
                return Err(MarketLedgerError::InsufficientListingBalance {
                    listing_id: line.listing_id,
                    asset_name: line.asset_name,
                    available: balance.confirmed_balance,
                    required: line.amount,
                });
            }
            checked.push((line, listing));
        }
        Self::update_source_status(source, OrderStatusType::SalePending, conn).await?;
        let mut records = Vec::with_capacity(checked.len());
        for (line, listing) in checked {
            let sale = NewSaleRecord {
                listing_id: line.listing_id,
                source,
                asset_name: line.asset_name,
                amount: line.amount,
                price_evr: line.price_evr,
                seller_address: listing.seller_address,
                buyer_address: buyer_address.clone(),
            };
            records.push(sales::insert_sale(sale, conn).await?);
        }
        info!("🔄️ {source} advanced to 'sale_pending' with {} sale record(s)", records.len());
        Ok(records)
    }

    /// The payout settlement reactor, shared between orders and cart orders. Edges are computed from the stored
    /// payout row versus the reported outcome.
    async fn apply_payout_outcome(
        &self,
        source: SaleSource,
        outcome: PayoutOutcome,
    ) -> Result<SettlementAction, MarketLedgerError> {
        let mut tx = self.pool.begin().await?;
        // Resolving the status up front also verifies the order/cart order exists.
        let _ = Self::source_status(source, &mut tx).await?;
        let previous = payouts::fetch_payout(source, &mut tx).await?;
        let prev_success = previous.as_ref().map(|p| p.success).unwrap_or(false);
        let prev_failures = previous.as_ref().map(|p| p.failure_count).unwrap_or(0);
        if prev_success {
            debug!("🔄️💸️ Payout for {source} already succeeded. Outcome report absorbed.");
            tx.commit().await?;
            return Ok(SettlementAction::Absorbed);
        }
        if payouts::upsert_outcome(source, &outcome, &mut tx).await?.is_none() {
            tx.commit().await?;
            return Ok(SettlementAction::Absorbed);
        }
        let action = if outcome.success {
            let lines = Self::source_sale_lines(source, &mut tx).await?;
            for line in &lines {
                balances::debit_confirmed(line.listing_id, &line.asset_name, line.amount, &mut tx).await?;
            }
            Self::update_source_status(source, OrderStatusType::Completed, &mut tx).await?;
            payouts::mark_completed(source, &mut tx).await?;
            info!("🔄️💸️ Payout for {source} settled. {} listing balance(s) debited, order completed.", lines.len());
            SettlementAction::Completed
        } else if prev_failures < TERMINAL_PAYOUT_FAILURES && outcome.failure_count >= TERMINAL_PAYOUT_FAILURES {
            let deleted = sales::delete_sales_for_source(source, &mut tx).await?;
            Self::update_source_status(source, OrderStatusType::Paid, &mut tx).await?;
            warn!(
                "🔄️💸️ Payout for {source} failed terminally ({} attempts). {deleted} sale record(s) reversed; \
                 order re-armed at 'paid'.",
                outcome.failure_count
            );
            SettlementAction::SaleReversed
        } else {
            debug!(
                "🔄️💸️ Payout failure #{} for {source} recorded; below the terminal count.",
                outcome.failure_count
            );
            SettlementAction::Absorbed
        };
        tx.commit().await?;
        Ok(action)
    }
}

impl MarketLedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn process_transaction_entry(&self, entry: NewTransactionEntry) -> Result<EntryOutcome, MarketLedgerError> {
        let mut tx = self.pool.begin().await?;
        let old = tx_entries::fetch_entry(&entry.tx_hash, &entry.address, entry.entry_type, &entry.asset_name, &mut tx)
            .await?;
        let inserted = old.is_none();
        let stored = if inserted {
            tx_entries::insert_entry(&entry, &mut tx).await?
        } else {
            tx_entries::update_entry(&entry, &mut tx).await?
        };
        trace!(
            "🗃️ Entry {}/{} for {} {} {} ({} confirmations)",
            stored.tx_hash,
            stored.address,
            stored.amount,
            stored.asset_name,
            if inserted { "inserted" } else { "updated" },
            stored.confirmations
        );
        let mut outcome = EntryOutcome {
            entry: stored.clone(),
            inserted,
            confirmed: false,
            credited: Vec::new(),
            status_changes: Vec::new(),
            sales_recorded: Vec::new(),
        };
        if stored.entry_type != EntryType::Receive {
            tx.commit().await?;
            return Ok(outcome);
        }
        let newly_confirmed =
            crosses_confirmation_threshold(old.as_ref().map(|e| e.confirmations), stored.confirmations);
        if !inserted && !newly_confirmed {
            // A confirmation bump past the threshold, or a refresh of amount/time. Nothing for the ledger.
            tx.commit().await?;
            return Ok(outcome);
        }
        outcome.confirmed = newly_confirmed;
        let siblings = tx_entries::receive_sibling_count(&stored.tx_hash, &stored.asset_name, &mut tx).await?;
        let amount = split_attributable_amount(stored.amount, siblings);
        let owners = Self::owners_for_address(&stored.address, &mut tx).await?;
        if owners.is_empty() {
            trace!("🗃️ No listing, order or cart order owns address {}. Entry stored for the record.", stored.address);
        }
        for owner in owners {
            if inserted {
                balances::credit_pending(owner, &stored.asset_name, amount, &mut tx).await?;
            }
            if newly_confirmed {
                balances::confirm_pending(owner, &stored.asset_name, amount, &stored.tx_hash, stored.time, &mut tx)
                    .await?;
            }
            outcome.credited.push(owner);
            if stored.asset_name == EVR_ASSET_NAME {
                if let Some(source) = owner.sale_source() {
                    let (change, mut sales) = Self::reevaluate_status(source, &mut tx).await?;
                    if let Some(change) = change {
                        outcome.status_changes.push(change);
                    }
                    outcome.sales_recorded.append(&mut sales);
                }
            }
        }
        tx.commit().await?;
        Ok(outcome)
    }

    async fn report_order_payout(
        &self,
        order_id: i64,
        outcome: PayoutOutcome,
    ) -> Result<SettlementAction, MarketLedgerError> {
        self.apply_payout_outcome(SaleSource::Order(order_id), outcome).await
    }

    async fn report_cart_order_payout(
        &self,
        cart_order_id: i64,
        outcome: PayoutOutcome,
    ) -> Result<SettlementAction, MarketLedgerError> {
        self.apply_payout_outcome(SaleSource::CartOrder(cart_order_id), outcome).await
    }

    async fn retry_sale(&self, source: SaleSource) -> Result<Vec<SaleRecord>, MarketLedgerError> {
        let mut tx = self.pool.begin().await?;
        let status = Self::source_status(source, &mut tx).await?;
        if status != OrderStatusType::Paid {
            return Err(MarketLedgerError::SaleRetryForbidden { sale_source: source, status });
        }
        let sales = Self::record_sale(source, &mut tx).await?;
        tx.commit().await?;
        Ok(sales)
    }

    async fn close(&mut self) -> Result<(), MarketLedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl LedgerReader for SqliteDatabase {
    async fn fetch_transaction_entry(
        &self,
        tx_hash: &str,
        address: &str,
        entry_type: EntryType,
        asset_name: &str,
    ) -> Result<Option<TransactionEntry>, MarketLedgerError> {
        let mut conn = self.pool.acquire().await?;
        tx_entries::fetch_entry(tx_hash, address, entry_type, asset_name, &mut conn).await
    }

    async fn fetch_listing(&self, listing_id: i64) -> Result<Option<Listing>, MarketLedgerError> {
        let mut conn = self.pool.acquire().await?;
        listings::fetch_listing(listing_id, &mut conn).await
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, MarketLedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(order_id, &mut conn).await
    }

    async fn fetch_cart_order(&self, cart_order_id: i64) -> Result<Option<CartOrder>, MarketLedgerError> {
        let mut conn = self.pool.acquire().await?;
        cart_orders::fetch_cart_order(cart_order_id, &mut conn).await
    }

    async fn fetch_sale_lines(&self, source: SaleSource) -> Result<Vec<SaleLine>, MarketLedgerError> {
        let mut conn = self.pool.acquire().await?;
        Self::source_sale_lines(source, &mut conn).await
    }

    async fn fetch_listing_balance(
        &self,
        listing_id: i64,
        asset_name: &str,
    ) -> Result<Option<Balance>, MarketLedgerError> {
        let mut conn = self.pool.acquire().await?;
        balances::fetch_balance(BalanceOwner::Listing(listing_id), asset_name, &mut conn).await
    }

    async fn fetch_order_balance(
        &self,
        order_id: i64,
        asset_name: &str,
    ) -> Result<Option<Balance>, MarketLedgerError> {
        let mut conn = self.pool.acquire().await?;
        balances::fetch_balance(BalanceOwner::Order(order_id), asset_name, &mut conn).await
    }

    async fn fetch_cart_order_balance(
        &self,
        cart_order_id: i64,
        asset_name: &str,
    ) -> Result<Option<Balance>, MarketLedgerError> {
        let mut conn = self.pool.acquire().await?;
        balances::fetch_balance(BalanceOwner::CartOrder(cart_order_id), asset_name, &mut conn).await
    }

    async fn fetch_sale_history(&self, source: SaleSource) -> Result<Vec<SaleRecord>, MarketLedgerError> {
        let mut conn = self.pool.acquire().await?;
        sales::fetch_sales_for_source(source, &mut conn).await
    }

    async fn fetch_payout(&self, source: SaleSource) -> Result<Option<Payout>, MarketLedgerError> {
        let mut conn = self.pool.acquire().await?;
        payouts::fetch_payout(source, &mut conn).await
    }
}
