//! # Credit Balances
//!
//! ```text
//! outstanding(customer) = Σ total(confirmed credits of customer)
//!                       − Σ amount(activo payments on those credits)
//! ```
//!
//! Payments in any other status (`procesado`, `saldado`, `cancelado`) do not
//! reduce the balance. A cancelled payment therefore restores what it had
//! paid off.

use std::collections::BTreeSet;

use crate::money::Money;
use crate::types::{AggregateHeader, AggregateKind, AggregateStatus, Payment};

/// Whether `header` is a credit that carries a balance.
#[inline]
fn is_open_credit(header: &AggregateHeader) -> bool {
    header.kind == AggregateKind::Credit && header.status == AggregateStatus::Confirmed
}

/// Outstanding balance over a customer's credits.
///
/// Non-credit headers, unconfirmed credits and payments against other
/// aggregates are ignored, so callers may pass unfiltered lists.
///
/// ## Example
/// ```rust
/// use kardex_core::credit::outstanding_balance;
///
/// assert!(outstanding_balance(&[], &[]).is_zero());
/// ```
pub fn outstanding_balance(credits: &[AggregateHeader], payments: &[Payment]) -> Money {
    let open: BTreeSet<&str> = credits
        .iter()
        .filter(|c| is_open_credit(c))
        .map(|c| c.id.as_str())
        .collect();

    let owed: Money = credits
        .iter()
        .filter(|c| is_open_credit(c))
        .map(|c| c.total())
        .sum();

    let paid: Money = payments
        .iter()
        .filter(|p| p.status.counts_toward_balance() && open.contains(p.aggregate_id.as_str()))
        .map(|p| p.amount())
        .sum();

    owed - paid
}

/// Balance left on a single credit.
pub fn credit_balance(credit: &AggregateHeader, payments: &[Payment]) -> Money {
    outstanding_balance(std::slice::from_ref(credit), payments)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentMethod, PaymentStatus};
    use chrono::Utc;

    fn credit(id: &str, total: i64, status: AggregateStatus) -> AggregateHeader {
        let now = Utc::now();
        AggregateHeader {
            id: id.to_string(),
            kind: AggregateKind::Credit,
            status,
            customer_id: Some("C1".to_string()),
            total_cents: total,
            profit_cents: 0,
            source_id: None,
            confirmed_into: None,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
        }
    }

    fn payment(id: &str, credit_id: &str, amount: i64, status: PaymentStatus) -> Payment {
        Payment {
            id: id.to_string(),
            aggregate_id: credit_id.to_string(),
            customer_id: Some("C1".to_string()),
            amount_cents: amount,
            method: PaymentMethod::Cash,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_cancelled_payment_restores_balance() {
        let credits = [credit("K1", 10_000, AggregateStatus::Confirmed)];
        let mut payments = vec![payment("A1", "K1", 4_000, PaymentStatus::Active)];
        assert_eq!(outstanding_balance(&credits, &payments).cents(), 6_000);

        payments[0].status = PaymentStatus::Cancelled;
        assert_eq!(outstanding_balance(&credits, &payments).cents(), 10_000);
    }

    #[test]
    fn test_only_active_payments_reduce() {
        let credits = [credit("K1", 10_000, AggregateStatus::Confirmed)];
        let payments = [
            payment("A1", "K1", 1_000, PaymentStatus::Active),
            payment("A2", "K1", 2_000, PaymentStatus::Processed),
            payment("A3", "K1", 3_000, PaymentStatus::Settled),
        ];
        assert_eq!(credit_balance(&credits[0], &payments).cents(), 9_000);
    }

    #[test]
    fn test_unconfirmed_credits_carry_no_balance() {
        let credits = [
            credit("K1", 5_000, AggregateStatus::Confirmed),
            credit("K2", 7_000, AggregateStatus::Pending),
            credit("K3", 9_000, AggregateStatus::Cancelled),
        ];
        let payments = [
            payment("A1", "K2", 500, PaymentStatus::Active),
            payment("A2", "ELSEWHERE", 500, PaymentStatus::Active),
        ];
        assert_eq!(outstanding_balance(&credits, &payments).cents(), 5_000);
    }

    #[test]
    fn test_balance_across_credits() {
        let credits = [
            credit("K1", 5_000, AggregateStatus::Confirmed),
            credit("K2", 2_500, AggregateStatus::Confirmed),
        ];
        let payments = [
            payment("A1", "K1", 5_000, PaymentStatus::Active),
            payment("A2", "K2", 1_000, PaymentStatus::Active),
        ];
        assert_eq!(outstanding_balance(&credits, &payments).cents(), 1_500);
        assert!(credit_balance(&credits[0], &payments).is_zero());
    }
}
