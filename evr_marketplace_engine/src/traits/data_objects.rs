use serde::{Deserialize, Serialize};

use crate::db_types::{OrderStatusType, SaleRecord, SaleSource, TransactionEntry};

/// An entity that owns a balance row: a listing via its deposit address, or an order / cart order via its payment
/// address. One transaction entry can credit at most one owner per table, but all three tables are resolved
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceOwner {
    Listing(i64),
    Order(i64),
    CartOrder(i64),
}

impl BalanceOwner {
    pub fn id(&self) -> i64 {
        match self {
            BalanceOwner::Listing(id) | BalanceOwner::Order(id) | BalanceOwner::CartOrder(id) => *id,
        }
    }

    /// The balance table backing this owner.
    pub(crate) fn balance_table(&self) -> &'static str {
        match self {
            BalanceOwner::Listing(_) => "listing_balances",
            BalanceOwner::Order(_) => "order_balances",
            BalanceOwner::CartOrder(_) => "cart_order_balances",
        }
    }

    /// The owner id column in the balance table.
    pub(crate) fn owner_column(&self) -> &'static str {
        match self {
            BalanceOwner::Listing(_) => "listing_id",
            BalanceOwner::Order(_) => "order_id",
            BalanceOwner::CartOrder(_) => "cart_order_id",
        }
    }

    pub fn sale_source(&self) -> Option<SaleSource> {
        match self {
            BalanceOwner::Listing(_) => None,
            BalanceOwner::Order(id) => Some(SaleSource::Order(*id)),
            BalanceOwner::CartOrder(id) => Some(SaleSource::CartOrder(*id)),
        }
    }
}

impl std::fmt::Display for BalanceOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BalanceOwner::Listing(id) => write!(f, "listing #{id}"),
            BalanceOwner::Order(id) => write!(f, "order #{id}"),
            BalanceOwner::CartOrder(id) => write!(f, "cart order #{id}"),
        }
    }
}

/// A status transition applied by the payment state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub source: SaleSource,
    pub old_status: OrderStatusType,
    pub new_status: OrderStatusType,
}

/// Everything that happened as a consequence of one transaction-entry write.
#[derive(Debug, Clone)]
pub struct EntryOutcome {
    /// The stored entry after the write.
    pub entry: TransactionEntry,
    /// Whether this write inserted the entry (as opposed to updating it in place).
    pub inserted: bool,
    /// Whether this write newly crossed the confirmation threshold.
    pub confirmed: bool,
    /// The owners whose balances were touched.
    pub credited: Vec<BalanceOwner>,
    /// Status transitions applied by the payment state machine.
    pub status_changes: Vec<StatusChange>,
    /// Sale records written because an order transitioned into `paid`.
    pub sales_recorded: Vec<SaleRecord>,
}

impl EntryOutcome {
    /// The status changes that landed on `paid` (before any sale recording advanced them further).
    pub fn newly_paid(&self) -> impl Iterator<Item = &StatusChange> {
        self.status_changes.iter().filter(|c| c.new_status == OrderStatusType::Paid)
    }
}

/// What the payout settlement reactor did with an outcome report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementAction {
    /// The report carried no edge: already settled, or a failure below the terminal count.
    Absorbed,
    /// The payout succeeded: listing balances were debited and the order is `completed`.
    Completed,
    /// The payout terminally failed: sale records were deleted and the order is back at `paid`.
    SaleReversed,
}
