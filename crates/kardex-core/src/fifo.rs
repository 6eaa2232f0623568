//! # FIFO Lot Selection
//!
//! Decides which lots a requested quantity is drawn from.
//!
//! ## Allocation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Request: product P, quantity 4                                        │
//! │                                                                         │
//! │  Lots (active, remaining > 0) ordered by received_at:                  │
//! │    L1  2024-01-02  remaining 3   ──► take 3   (need 1 left)            │
//! │    L2  2024-02-10  remaining 5   ──► take 1   (need 0 left)            │
//! │    L3  2024-03-01  remaining 9   ──► untouched                          │
//! │                                                                         │
//! │  Result: [(L1, 3), (L2, 1)]                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Selection is pure. Callers outside a transaction use it speculatively;
//! the ledger plan re-runs it against the transaction's snapshot.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::Lot;
use crate::validation::validate_quantity;

/// Part of a request drawn from one lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LotAllocation {
    pub lot_id: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    /// Lot remaining quantity seen at selection time.
    pub available: i64,
}

/// Available lots of `product_id`, oldest intake first.
///
/// Ties on `received_at` are broken by lot id so the order is deterministic.
pub fn fifo_order<'a>(product_id: &str, lots: &'a [Lot]) -> Vec<&'a Lot> {
    let mut ordered: Vec<&Lot> = lots
        .iter()
        .filter(|l| l.product_id == product_id && l.is_available())
        .collect();
    ordered.sort_by(|a, b| {
        a.received_at
            .cmp(&b.received_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    ordered
}

/// Partitions `quantity` across the product's lots in FIFO order.
///
/// ## Errors
/// - `Validation` when `quantity` is not positive
/// - `InsufficientStock` (no lot id) when the lots together hold less than
///   `quantity`; `shortfall()` gives the missing units
///
/// ## Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use kardex_core::fifo::select_lots;
/// use kardex_core::types::{Lot, LotStatus};
///
/// let lot = |id: &str, day: u32, qty: i64| Lot {
///     id: id.to_string(),
///     product_id: "P".to_string(),
///     received_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
///     original_quantity: qty,
///     remaining_quantity: qty,
///     unit_cost_cents: 100,
///     status: LotStatus::Active,
/// };
/// let lots = vec![lot("L2", 20, 5), lot("L1", 2, 3)];
///
/// let picks = select_lots("P", &lots, 4).unwrap();
/// assert_eq!(picks[0].lot_id, "L1");
/// assert_eq!(picks[0].quantity, 3);
/// assert_eq!(picks[1].lot_id, "L2");
/// assert_eq!(picks[1].quantity, 1);
/// ```
pub fn select_lots(product_id: &str, lots: &[Lot], quantity: i64) -> CoreResult<Vec<LotAllocation>> {
    validate_quantity(quantity)?;

    let mut needed = quantity;
    let mut allocations = Vec::new();

    for lot in fifo_order(product_id, lots) {
        if needed == 0 {
            break;
        }
        let take = needed.min(lot.remaining_quantity);
        allocations.push(LotAllocation {
            lot_id: lot.id.clone(),
            quantity: take,
            unit_cost_cents: lot.unit_cost_cents,
            available: lot.remaining_quantity,
        });
        needed -= take;
    }

    if needed > 0 {
        return Err(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            lot_id: None,
            available: quantity - needed,
            requested: quantity,
        });
    }

    Ok(allocations)
}

/// Unit cost of the earliest still-active lot, 0 when none remain.
///
/// This is the product's displayed default cost: a FIFO-head figure, not a
/// weighted average.
pub fn fifo_head_cost(product_id: &str, lots: &[Lot]) -> i64 {
    fifo_order(product_id, lots)
        .first()
        .map(|l| l.unit_cost_cents)
        .unwrap_or(0)
}

// =============================================================================
// Unit Tests
// =============================================================================
