//! Pure calculation helpers for the ledger: split-payment allocation, confirmation-threshold detection and
//! payment-status derivation. Keeping these free of database access lets every caller (insert path, confirmation
//! path, tests) share the exact same arithmetic.

use emg_common::AssetAmount;

use crate::db_types::OrderStatusType;

/// The number of confirmations at which a pending payment is recognised as confirmed. Fixed by design.
pub const CONFIRMATION_THRESHOLD: i64 = 2;

/// The failure count at which a payout is considered terminally failed and its sale is reversed.
pub const TERMINAL_PAYOUT_FAILURES: i64 = 3;

/// The fraction of a receive entry's stated amount that is attributable to this entry when the same transaction
/// pays out to multiple outputs of the same asset. `sibling_count` is the number of all receive entries sharing
/// `(tx_hash, asset_name)`, including this one. The watcher stores the full transaction value on every sibling
/// entry, so with more than one sibling the amount is divided by the sibling count.
pub fn split_attributable_amount(amount: AssetAmount, sibling_count: i64) -> AssetAmount {
    if sibling_count > 1 {
        amount / sibling_count
    } else {
        amount
    }
}

/// True when a confirmation update newly crosses the threshold. A missing previous value counts as below the
/// threshold, so an entry first seen with two confirmations confirms immediately.
pub fn crosses_confirmation_threshold(previous: Option<i64>, current: i64) -> bool {
    previous.unwrap_or(0) < CONFIRMATION_THRESHOLD && current >= CONFIRMATION_THRESHOLD
}

/// Derive the payment status of an order or cart order from its EVR balance and the required payment total.
///
/// The branches are evaluated in priority order, so an order whose confirmed balance covers the total is `paid`
/// even while further funds are pending.
pub fn derive_payment_status(
    confirmed: AssetAmount,
    pending: AssetAmount,
    total_required: AssetAmount,
) -> OrderStatusType {
    let zero = AssetAmount::zero();
    if confirmed >= total_required {
        OrderStatusType::Paid
    } else if confirmed > zero && pending > zero {
        OrderStatusType::Confirming
    } else if confirmed > zero {
        OrderStatusType::PartiallyPaid
    } else if pending > zero {
        OrderStatusType::Confirming
    } else {
        OrderStatusType::Pending
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    fn amt(s: &str) -> AssetAmount {
        AssetAmount::from_str(s).unwrap()
    }

    #[test]
    fn no_split_for_single_output() {
        assert_eq!(split_attributable_amount(amt("100"), 1), amt("100"));
        assert_eq!(split_attributable_amount(amt("100"), 0), amt("100"));
    }

    #[test]
    fn split_across_siblings() {
        assert_eq!(split_attributable_amount(amt("100"), 2), amt("50"));
        assert_eq!(split_attributable_amount(amt("100"), 4), amt("25"));
    }

    #[test]
    fn threshold_crossing() {
        assert!(crosses_confirmation_threshold(None, 2));
        assert!(crosses_confirmation_threshold(Some(0), 2));
        assert!(crosses_confirmation_threshold(Some(1), 6));
        assert!(!crosses_confirmation_threshold(Some(2), 3));
        assert!(!crosses_confirmation_threshold(Some(5), 6));
        assert!(!crosses_confirmation_threshold(None, 1));
        assert!(!crosses_confirmation_threshold(Some(0), 0));
    }

    #[test]
    fn status_paid_when_confirmed_covers_total() {
        assert_eq!(derive_payment_status(amt("50"), amt("0"), amt("50")), OrderStatusType::Paid);
        assert_eq!(derive_payment_status(amt("60"), amt("10"), amt("50")), OrderStatusType::Paid);
    }

    #[test]
    fn status_confirming_when_partially_confirmed_with_pending() {
        assert_eq!(derive_payment_status(amt("20"), amt("30"), amt("50")), OrderStatusType::Confirming);
    }

    #[test]
    fn status_partially_paid_when_only_confirmed() {
        assert_eq!(derive_payment_status(amt("20"), amt("0"), amt("50")), OrderStatusType::PartiallyPaid);
    }

    #[test]
    fn status_confirming_when_only_pending() {
        assert_eq!(derive_payment_status(amt("0"), amt("50"), amt("50")), OrderStatusType::Confirming);
    }

    #[test]
    fn status_pending_when_nothing_observed() {
        assert_eq!(derive_payment_status(amt("0"), amt("0"), amt("50")), OrderStatusType::Pending);
    }
}
