use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewTransactionEntry, PayoutOutcome, SaleRecord, SaleSource},
    events::{EventProducers, OrderCompletedEvent, OrderPaidEvent, SaleRecordedEvent, SaleReversedEvent},
    traits::{EntryOutcome, MarketLedgerDatabase, MarketLedgerError, SettlementAction},
};

/// `LedgerFlowApi` is the primary API for driving the ledger in response to chain-watcher entry events and
/// payout-executor outcome reports.
pub struct LedgerFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for LedgerFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerFlowApi")
    }
}

impl<B> LedgerFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> LedgerFlowApi<B>
where B: MarketLedgerDatabase
{
    /// Submit a transaction-entry write from the chain watcher.
    ///
    /// The entry is inserted on first sight and updated in place afterwards; the balance ledger, status machine
    /// and sale recorder all run inside the same storage transaction as the write. Subscribers are notified of
    /// any orders that became paid and any sales that were recorded.
    pub async fn process_transaction_entry(
        &self,
        entry: NewTransactionEntry,
    ) -> Result<EntryOutcome, MarketLedgerError> {
        let outcome = self.db.process_transaction_entry(entry).await?;
        debug!(
            "🔄️💰️ Entry [{}/{}] processed. {} owner(s) credited, {} status change(s), {} sale(s) recorded.",
            outcome.entry.tx_hash,
            outcome.entry.address,
            outcome.credited.len(),
            outcome.status_changes.len(),
            outcome.sales_recorded.len()
        );
        self.call_order_paid_hooks(&outcome).await;
        self.call_sale_recorded_hooks(&outcome.sales_recorded).await;
        Ok(outcome)
    }

    /// Report the outcome of a payout attempt for an order.
    pub async fn report_order_payout(
        &self,
        order_id: i64,
        payout: PayoutOutcome,
    ) -> Result<SettlementAction, MarketLedgerError> {
        let action = self.db.report_order_payout(order_id, payout).await?;
        self.call_settlement_hooks(SaleSource::Order(order_id), &action).await;
        Ok(action)
    }

    /// Report the outcome of a payout attempt for a cart order.
    pub async fn report_cart_order_payout(
        &self,
        cart_order_id: i64,
        payout: PayoutOutcome,
    ) -> Result<SettlementAction, MarketLedgerError> {
        let action = self.db.report_cart_order_payout(cart_order_id, payout).await?;
        self.call_settlement_hooks(SaleSource::CartOrder(cart_order_id), &action).await;
        Ok(action)
    }

    /// Re-run the sale recorder for an order or cart order that a payout reversal left at `paid`.
    pub async fn retry_sale(&self, source: SaleSource) -> Result<Vec<SaleRecord>, MarketLedgerError> {
        let sales = self.db.retry_sale(source).await?;
        self.call_sale_recorded_hooks(&sales).await;
        Ok(sales)
    }

    async fn call_order_paid_hooks(&self, outcome: &EntryOutcome) {
        for emitter in &self.producers.order_paid_producer {
            for change in outcome.newly_paid() {
                debug!("🔄️📦️ Notifying order-paid hook subscribers for {}", change.source);
                emitter.publish_event(OrderPaidEvent::new(change.clone())).await;
            }
        }
    }

    async fn call_sale_recorded_hooks(&self, sales: &[SaleRecord]) {
        for emitter in &self.producers.sale_recorded_producer {
            for sale in sales {
                emitter.publish_event(SaleRecordedEvent { sale: sale.clone() }).await;
            }
        }
    }

    async fn call_settlement_hooks(&self, source: SaleSource, action: &SettlementAction) {
        match action {
            SettlementAction::Completed => {
                for emitter in &self.producers.order_completed_producer {
                    emitter.publish_event(OrderCompletedEvent { source }).await;
                }
            },
            SettlementAction::SaleReversed => {
                for emitter in &self.producers.sale_reversed_producer {
                    emitter.publish_event(SaleReversedEvent { source }).await;
                }
            },
            SettlementAction::Absorbed => {},
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
