use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use emg_common::AssetAmount;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------      EntryType      ---------------------------------------------------------
/// The direction of a transaction entry as reported by the chain watcher. The ledger only reacts to `receive`
/// entries; everything else is stored for the record and otherwise ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Receive,
    Send,
}

impl Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::Receive => write!(f, "receive"),
            EntryType::Send => write!(f, "send"),
        }
    }
}

impl FromStr for EntryType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receive" => Ok(Self::Receive),
            "send" => Ok(Self::Send),
            s => Err(ConversionError(format!("Invalid entry type: {s}"))),
        }
    }
}

//--------------------------------------   OrderStatusType   ---------------------------------------------------------
/// The full order / cart-order lifecycle. The payment state machine only ever toggles among the four
/// payment-derived states; everything from `SalePending` onwards is written by the sale recorder, the payout
/// settlement reactor, or surfaces outside this crate. The last two states are only valid for cart orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// No payment has been observed yet.
    Pending,
    /// Some funds have confirmed, but not enough to cover the order.
    PartiallyPaid,
    /// Funds are on their way but still below the confirmation threshold.
    Confirming,
    /// The confirmed balance covers the required total.
    Paid,
    /// The sale has been recorded and is awaiting payout.
    SalePending,
    Fulfilling,
    Completed,
    Cancelled,
    Refunded,
    RefundFailed,
    ManualInterventionRequired,
}

impl OrderStatusType {
    /// The states the payment status machine derives from balances, and the only states it may overwrite.
    pub fn is_payment_derived(&self) -> bool {
        matches!(self, Self::Pending | Self::PartiallyPaid | Self::Confirming | Self::Paid)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatusType::Pending => "pending",
            OrderStatusType::PartiallyPaid => "partially_paid",
            OrderStatusType::Confirming => "confirming",
            OrderStatusType::Paid => "paid",
            OrderStatusType::SalePending => "sale_pending",
            OrderStatusType::Fulfilling => "fulfilling",
            OrderStatusType::Completed => "completed",
            OrderStatusType::Cancelled => "cancelled",
            OrderStatusType::Refunded => "refunded",
            OrderStatusType::RefundFailed => "refund_failed",
            OrderStatusType::ManualInterventionRequired => "manual_intervention_required",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "partially_paid" => Ok(Self::PartiallyPaid),
            "confirming" => Ok(Self::Confirming),
            "paid" => Ok(Self::Paid),
            "sale_pending" => Ok(Self::SalePending),
            "fulfilling" => Ok(Self::Fulfilling),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            "refund_failed" => Ok(Self::RefundFailed),
            "manual_intervention_required" => Ok(Self::ManualInterventionRequired),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------  TransactionEntry   ---------------------------------------------------------
/// One observed transaction output, keyed by `(tx_hash, address, entry_type, asset_name)`. The watcher inserts the
/// entry on first sight and updates it in place as `confirmations` grows.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TransactionEntry {
    pub tx_hash: String,
    pub address: String,
    pub entry_type: EntryType,
    pub asset_name: String,
    pub amount: AssetAmount,
    pub confirmations: i64,
    pub time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The watcher-facing payload for `PutTransactionEntry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransactionEntry {
    pub tx_hash: String,
    pub address: String,
    pub entry_type: EntryType,
    pub asset_name: String,
    pub amount: AssetAmount,
    pub confirmations: i64,
    pub time: DateTime<Utc>,
}

impl NewTransactionEntry {
    pub fn new<S1, S2, S3>(tx_hash: S1, address: S2, asset_name: S3, amount: AssetAmount) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            tx_hash: tx_hash.into(),
            address: address.into(),
            entry_type: EntryType::Receive,
            asset_name: asset_name.into(),
            amount,
            confirmations: 0,
            time: Utc::now(),
        }
    }

    pub fn with_confirmations(mut self, confirmations: i64) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn with_entry_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = entry_type;
        self
    }
}

//--------------------------------------       Listing       ---------------------------------------------------------
/// A sellable item bound to a deposit address. Listing CRUD lives outside this crate; the ledger only reads
/// listings to resolve deposit addresses and to guard and debit their balances.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub deposit_address: String,
    pub seller_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        Order        ---------------------------------------------------------
/// A single-listing purchase with its own payment address.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub listing_id: i64,
    pub payment_address: String,
    pub buyer_address: String,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub asset_name: String,
    pub amount: AssetAmount,
    pub price_evr: AssetAmount,
    pub fee_evr: AssetAmount,
}

//--------------------------------------      CartOrder      ---------------------------------------------------------
/// A multi-listing checkout. Identical in lifecycle to [`Order`], except that each item line carries its own
/// listing and the status enum admits the refund-failure states.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CartOrder {
    pub id: i64,
    pub payment_address: String,
    pub buyer_address: String,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CartOrderItem {
    pub id: i64,
    pub cart_order_id: i64,
    pub listing_id: i64,
    pub asset_name: String,
    pub amount: AssetAmount,
    pub price_evr: AssetAmount,
    pub fee_evr: AssetAmount,
}

/// One sellable line of an order or cart order, with the listing it draws inventory from. Orders put their single
/// listing on every line; cart orders carry a listing per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLine {
    pub listing_id: i64,
    pub asset_name: String,
    pub amount: AssetAmount,
    pub price_evr: AssetAmount,
    pub fee_evr: AssetAmount,
}

impl SaleLine {
    pub fn required_evr(&self) -> AssetAmount {
        self.price_evr + self.fee_evr
    }
}

//--------------------------------------       Balance       ---------------------------------------------------------
/// A pending/confirmed balance for one `(owner, asset)` pair. The same shape backs listing, order and cart-order
/// balances; queries alias the owner id column to `owner_id`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Balance {
    pub owner_id: i64,
    pub asset_name: String,
    pub confirmed_balance: AssetAmount,
    pub pending_balance: AssetAmount,
    pub last_confirmed_tx_hash: Option<String>,
    pub last_confirmed_tx_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    pub fn empty(owner_id: i64, asset_name: &str) -> Self {
        Self {
            owner_id,
            asset_name: asset_name.to_string(),
            confirmed_balance: AssetAmount::zero(),
            pending_balance: AssetAmount::zero(),
            last_confirmed_tx_hash: None,
            last_confirmed_tx_time: None,
            updated_at: Utc::now(),
        }
    }
}

//--------------------------------------      SaleSource     ---------------------------------------------------------
/// The origin of a sale record: exactly one of an order or a cart order. Stored as two nullable columns with an
/// XOR check constraint; in Rust the constraint is the type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleSource {
    Order(i64),
    CartOrder(i64),
}

impl SaleSource {
    pub fn order_id(&self) -> Option<i64> {
        match self {
            SaleSource::Order(id) => Some(*id),
            SaleSource::CartOrder(_) => None,
        }
    }

    pub fn cart_order_id(&self) -> Option<i64> {
        match self {
            SaleSource::Order(_) => None,
            SaleSource::CartOrder(id) => Some(*id),
        }
    }
}

impl Display for SaleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaleSource::Order(id) => write!(f, "order #{id}"),
            SaleSource::CartOrder(id) => write!(f, "cart order #{id}"),
        }
    }
}

//--------------------------------------      SaleRecord     ---------------------------------------------------------
/// An immutable record of a completed sale-in-progress. Written exactly once per item when an order transitions
/// into `sale_pending`, and deleted only when a payout terminally fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: i64,
    pub listing_id: i64,
    pub source: SaleSource,
    pub asset_name: String,
    pub amount: AssetAmount,
    pub price_evr: AssetAmount,
    pub seller_address: String,
    pub buyer_address: String,
    pub sale_time: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for SaleRecord {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let order_id: Option<i64> = row.try_get("order_id")?;
        let cart_order_id: Option<i64> = row.try_get("cart_order_id")?;
        let source = match (order_id, cart_order_id) {
            (Some(id), None) => SaleSource::Order(id),
            (None, Some(id)) => SaleSource::CartOrder(id),
            _ => {
                return Err(sqlx::Error::ColumnDecode {
                    index: "order_id".into(),
                    source: "sale_history row must reference exactly one of order_id, cart_order_id".into(),
                })
            },
        };
        Ok(Self {
            id: row.try_get("id")?,
            listing_id: row.try_get("listing_id")?,
            source,
            asset_name: row.try_get("asset_name")?,
            amount: row.try_get("amount")?,
            price_evr: row.try_get("price_evr")?,
            seller_address: row.try_get("seller_address")?,
            buyer_address: row.try_get("buyer_address")?,
            sale_time: row.try_get("sale_time")?,
        })
    }
}

//--------------------------------------        Payout       ---------------------------------------------------------
/// The one-to-one payout record for an order or cart order. `success` flips false to true at most once;
/// `failure_count` only ever grows until either success or a manual reset.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payout {
    pub owner_id: i64,
    pub success: bool,
    pub failure_count: i64,
    pub total_fees_paid: AssetAmount,
    pub last_attempt_time: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The payout executor's report for `ReportPayoutOutcome`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutOutcome {
    pub success: bool,
    pub failure_count: i64,
    pub total_fees_paid: AssetAmount,
    pub last_attempt_time: DateTime<Utc>,
}

impl PayoutOutcome {
    pub fn succeeded(total_fees_paid: AssetAmount) -> Self {
        Self { success: true, failure_count: 0, total_fees_paid, last_attempt_time: Utc::now() }
    }

    pub fn failed(failure_count: i64) -> Self {
        Self { success: false, failure_count, total_fees_paid: AssetAmount::zero(), last_attempt_time: Utc::now() }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        let statuses = [
            OrderStatusType::Pending,
            OrderStatusType::PartiallyPaid,
            OrderStatusType::Confirming,
            OrderStatusType::Paid,
            OrderStatusType::SalePending,
            OrderStatusType::Fulfilling,
            OrderStatusType::Completed,
            OrderStatusType::Cancelled,
            OrderStatusType::Refunded,
            OrderStatusType::RefundFailed,
            OrderStatusType::ManualInterventionRequired,
        ];
        for status in statuses {
            assert_eq!(status.to_string().parse::<OrderStatusType>().unwrap(), status);
            // The serde representation matches the stored strings, so JSON consumers see the schema vocabulary.
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
    }

    #[test]
    fn only_payment_states_are_machine_writable() {
        assert!(OrderStatusType::Pending.is_payment_derived());
        assert!(OrderStatusType::PartiallyPaid.is_payment_derived());
        assert!(OrderStatusType::Confirming.is_payment_derived());
        assert!(OrderStatusType::Paid.is_payment_derived());
        assert!(!OrderStatusType::SalePending.is_payment_derived());
        assert!(!OrderStatusType::Completed.is_payment_derived());
        assert!(!OrderStatusType::Cancelled.is_payment_derived());
    }

    #[test]
    fn entry_type_strings_round_trip() {
        assert_eq!("receive".parse::<EntryType>().unwrap(), EntryType::Receive);
        assert_eq!("send".parse::<EntryType>().unwrap(), EntryType::Send);
        assert!("stake".parse::<EntryType>().is_err());
    }

    #[test]
    fn sale_source_is_exclusive() {
        let order = SaleSource::Order(42);
        assert_eq!(order.order_id(), Some(42));
        assert_eq!(order.cart_order_id(), None);
        let cart = SaleSource::CartOrder(7);
        assert_eq!(cart.order_id(), None);
        assert_eq!(cart.cart_order_id(), Some(7));
    }
}
