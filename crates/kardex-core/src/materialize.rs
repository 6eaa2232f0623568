//! # Line-Item Materialization
//!
//! Turns a FIFO partition into lot-bound line items.
//!
//! ```text
//! "add FILTRO-01 × 4 @ $15.00"   allocations [(L1, 3), (L2, 1)]
//!            │
//!            ▼
//!   item 1: L1  qty 3  price 15.00  cost 10.00  subtotal 45.00  profit 15.00
//!   item 2: L2  qty 1  price 15.00  cost 11.00  subtotal 15.00  profit  4.00
//! ```
//!
//! The sale price belongs to the user action, so every split item carries
//! the same unit price; cost comes from each lot.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CoreResult, ValidationError};
use crate::fifo::LotAllocation;
use crate::types::LineItem;
use crate::validation::{validate_id, validate_price_cents, validate_quantity};

/// Builds one line item per allocation.
///
/// ## Guarantees
/// - Σ item quantity == `total_quantity` (otherwise a `Mismatch` error)
/// - one allocation in, one item out: no needless splitting
/// - `subtotal`, `unit_profit` and `total_profit` are derived, never copied
///
/// Item ids are fresh UUIDs; the ledger plan re-keys them when it needs
/// deterministic ids.
pub fn materialize(
    aggregate_id: &str,
    product_id: &str,
    total_quantity: i64,
    unit_price_cents: i64,
    allocations: &[LotAllocation],
    now: DateTime<Utc>,
) -> CoreResult<Vec<LineItem>> {
    validate_id("aggregate_id", aggregate_id)?;
    validate_id("product_id", product_id)?;
    validate_quantity(total_quantity)?;
    validate_price_cents("unit_price", unit_price_cents)?;

    let allocated: i64 = allocations.iter().map(|a| a.quantity).sum();
    if allocated != total_quantity {
        return Err(ValidationError::Mismatch {
            field: "allocated quantity".to_string(),
            expected: total_quantity.to_string(),
            actual: allocated.to_string(),
        }
        .into());
    }

    allocations
        .iter()
        .map(|allocation| {
            validate_quantity(allocation.quantity)?;
            let mut item = LineItem {
                id: Uuid::new_v4().to_string(),
                aggregate_id: aggregate_id.to_string(),
                product_id: product_id.to_string(),
                lot_id: Some(allocation.lot_id.clone()),
                quantity: allocation.quantity,
                unit_price_cents,
                subtotal_cents: 0,
                unit_cost_cents: allocation.unit_cost_cents,
                unit_profit_cents: 0,
                total_profit_cents: 0,
                created_at: now,
            };
            item.recompute()?;
            Ok(item)
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    fn alloc(lot: &str, qty: i64, cost: i64) -> LotAllocation {
        LotAllocation {
            lot_id: lot.to_string(),
            quantity: qty,
            unit_cost_cents: cost,
            available: qty,
        }
    }

    #[test]
    fn test_split_items_share_price() {
        let allocations = [alloc("L1", 3, 1000), alloc("L2", 1, 1100)];
        let items = materialize("Q1", "P", 4, 1500, &allocations, Utc::now()).unwrap();

        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.unit_price_cents == 1500));
        assert_eq!(items[0].lot_id.as_deref(), Some("L1"));
        assert_eq!(items[0].subtotal_cents, 4500);
        assert_eq!(items[0].total_profit_cents, 1500);
        assert_eq!(items[1].unit_profit_cents, 400);

        let subtotal: i64 = items.iter().map(|i| i.subtotal_cents).sum();
        assert_eq!(subtotal, 4 * 1500);
    }

    #[test]
    fn test_single_allocation_single_item() {
        let items = materialize("Q1", "P", 5, 999, &[alloc("L1", 5, 500)], Utc::now()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 5);
    }

    #[test]
    fn test_mismatched_allocation_rejected() {
        let err = materialize("Q1", "P", 5, 999, &[alloc("L1", 4, 500)], Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::Mismatch { .. })
        ));
    }

    #[test]
    fn test_negative_price_rejected() {
        assert!(materialize("Q1", "P", 1, -5, &[alloc("L1", 1, 500)], Utc::now()).is_err());
    }

    #[test]
    fn test_oversized_price_rejected_before_arithmetic() {
        let err = materialize("Q", "P", 2, i64::MAX / 2 + 1, &[alloc("L1", 2, 500)], Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { max: crate::MAX_UNIT_PRICE_CENTS, .. })
        ));
    }

    #[test]
    fn test_largest_line_fits() {
        let qty = crate::MAX_LINE_QUANTITY;
        let items = materialize(
            "Q",
            "P",
            qty,
            crate::MAX_UNIT_PRICE_CENTS,
            &[alloc("L1", qty, 0)],
            Utc::now(),
        )
        .unwrap();
        assert_eq!(items[0].subtotal_cents, qty * crate::MAX_UNIT_PRICE_CENTS);
    }
}
