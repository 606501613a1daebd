use serde::{Deserialize, Serialize};

use crate::{
    db_types::{SaleRecord, SaleSource},
    traits::StatusChange,
};

/// An order or cart order's confirmed EVR balance now covers its required total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub change: StatusChange,
}

impl OrderPaidEvent {
    pub fn new(change: StatusChange) -> Self {
        Self { change }
    }
}

/// A sale record was written; the order is awaiting payout at `sale_pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRecordedEvent {
    pub sale: SaleRecord,
}

/// A payout settled: listing balances were debited and the order is `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompletedEvent {
    pub source: SaleSource,
}

/// A payout terminally failed: the sale records were deleted and the order is back at `paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleReversedEvent {
    pub source: SaleSource,
}
