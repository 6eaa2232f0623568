//! # Header Totals
//!
//! Running totals of an aggregate header, maintained as accumulators.
//!
//! ```text
//!   add item      total += item.subtotal          profit += item.profit
//!   edit item     total += new.subtotal − old     profit += new − old
//!   remove item   total −= item.subtotal          profit −= item.profit
//! ```
//!
//! A delta is only ever applied inside the transaction that writes the
//! matching line items. [`HeaderTotals::recompute`] is the reconciliation
//! backstop.

use serde::{Deserialize, Serialize};
use std::ops::Add;
use ts_rs::TS;

use crate::money::Money;
use crate::types::{AggregateHeader, LineItem};

/// Accumulated header totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HeaderTotals {
    pub total_cents: i64,
    pub profit_cents: i64,
}

/// Signed change to apply to [`HeaderTotals`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TotalsDelta {
    pub total_cents: i64,
    pub profit_cents: i64,
}

impl TotalsDelta {
    /// Delta for newly inserted items.
    pub fn added(items: &[LineItem]) -> Self {
        items.iter().fold(TotalsDelta::default(), |acc, item| {
            acc + TotalsDelta {
                total_cents: item.subtotal_cents,
                profit_cents: item.total_profit_cents,
            }
        })
    }

    /// Delta for a deleted item.
    pub fn removed(item: &LineItem) -> Self {
        TotalsDelta {
            total_cents: -item.subtotal_cents,
            profit_cents: -item.total_profit_cents,
        }
    }

    /// Delta for an item rewritten in place.
    pub fn replaced(old: &LineItem, new: &LineItem) -> Self {
        TotalsDelta::removed(old) + TotalsDelta::added(std::slice::from_ref(new))
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.total_cents == 0 && self.profit_cents == 0
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

impl Add for TotalsDelta {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        TotalsDelta {
            total_cents: self.total_cents + other.total_cents,
            profit_cents: self.profit_cents + other.profit_cents,
        }
    }
}

impl HeaderTotals {
    /// Totals currently stored on a header.
    pub fn of(header: &AggregateHeader) -> Self {
        HeaderTotals {
            total_cents: header.total_cents,
            profit_cents: header.profit_cents,
        }
    }

    /// Accumulator step.
    #[must_use]
    pub fn apply(self, delta: TotalsDelta) -> Self {
        HeaderTotals {
            total_cents: self.total_cents + delta.total_cents,
            profit_cents: self.profit_cents + delta.profit_cents,
        }
    }

    /// Totals recomputed from scratch over live items.
    pub fn recompute(items: &[LineItem]) -> Self {
        let delta = TotalsDelta::added(items);
        HeaderTotals {
            total_cents: delta.total_cents,
            profit_cents: delta.profit_cents,
        }
    }

    /// Difference `self − expected`, zero when consistent.
    pub fn drift_from(&self, expected: &HeaderTotals) -> TotalsDelta {
        TotalsDelta {
            total_cents: self.total_cents - expected.total_cents,
            profit_cents: self.profit_cents - expected.profit_cents,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
