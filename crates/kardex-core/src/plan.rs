//! # Confirmation Planning
//!
//! The pure half of the ledger's atomic read-modify-write.
//!
//! ## Two-Phase Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  ONE STORE TRANSACTION (kardex-db)                      │
//! │                                                                         │
//! │  1. READ     header, items, products, lots  ──► ConfirmationSnapshot   │
//! │                                                    │                    │
//! │  2. PLAN     plan_confirmation(snapshot)  ◄────────┘   (THIS MODULE)   │
//! │              ├── resolve unbound items through FIFO                    │
//! │              ├── accumulate per product / per lot                      │
//! │              ├── validate stock (no writes yet)                        │
//! │              └── build the WriteSet                                    │
//! │                                                    │                    │
//! │  3. APPLY    lots, products, sale, items,  ◄───────┘                    │
//! │              movements, payments, source                               │
//! │                                                                         │
//! │  COMMIT ← all or nothing; on conflict the store re-runs 1-3            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Planning is deterministic: the same snapshot and request always yield
//! the same write-set, ids included. A retried transaction therefore writes
//! exactly what the aborted attempt would have written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::fifo::{fifo_head_cost, select_lots};
use crate::materialize::materialize;
use crate::totals::HeaderTotals;
use crate::types::{
    AggregateHeader, AggregateKind, AggregateStatus, LineItem, Lot, LotStatus, Movement,
    MovementKind, Payment, PaymentInput, PaymentStatus, Product,
};
use crate::validation::{validate_id, validate_payments, validate_quantity};

// =============================================================================
// Inputs
// =============================================================================

/// Everything the read phase loaded inside the transaction.
///
/// `lots` must hold every active lot of each referenced product plus every
/// lot a line item is bound to, so the FIFO head can be recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationSnapshot {
    pub source: AggregateHeader,
    pub items: Vec<LineItem>,
    pub products: Vec<Product>,
    pub lots: Vec<Lot>,
}

/// Caller-side inputs of a confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    /// Id of the sale to create. Generated once, before the first attempt.
    pub sale_id: String,
    pub payments: Vec<PaymentInput>,
    pub now: DateTime<Utc>,
}

// =============================================================================
// Write-Set
// =============================================================================

/// New stock of one lot. `previous_remaining` is what the read phase saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LotUpdate {
    pub lot_id: String,
    pub product_id: String,
    pub previous_remaining: i64,
    pub remaining_quantity: i64,
    pub status: LotStatus,
}

/// New aggregate stock and FIFO-head cost of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductUpdate {
    pub product_id: String,
    pub previous_stock: i64,
    pub stock_actual: i64,
    pub default_cost_cents: i64,
}

/// Terminal state and back-reference written on the source aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SourceUpdate {
    pub aggregate_id: String,
    pub previous_status: AggregateStatus,
    pub status: AggregateStatus,
    pub confirmed_into: String,
    #[ts(as = "String")]
    pub confirmed_at: DateTime<Utc>,
}

/// Every write of one confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WriteSet {
    pub lot_updates: Vec<LotUpdate>,
    pub product_updates: Vec<ProductUpdate>,
    pub sale: AggregateHeader,
    pub sale_items: Vec<LineItem>,
    pub movements: Vec<Movement>,
    pub payments: Vec<Payment>,
    pub source_update: SourceUpdate,
}

impl WriteSet {
    /// Units consumed across all lots.
    pub fn units_consumed(&self) -> i64 {
        self.movements.iter().map(|m| m.quantity).sum()
    }
}

// =============================================================================
// Planning
// =============================================================================

/// Validates a confirmation against `snapshot` and computes its write-set.
///
/// ## Steps
/// 1. Lifecycle: source must be a quotation/credit that may become `confirmada`
/// 2. Fixed-lot items claim their lots first
/// 3. Unbound items are resolved through FIFO over what remains, possibly
///    splitting into several lot-bound items
/// 4. Per-product and per-lot totals are validated against the snapshot
/// 5. Lot, product, sale, item, movement, payment and source writes are built
///
/// ## Errors
/// `NotFound`, `InsufficientStock`, `InvalidStatusTransition`,
/// `InvalidPaymentAmount` or `Validation`. Nothing is written on error.
pub fn plan_confirmation(
    snapshot: &ConfirmationSnapshot,
    request: &ConfirmationRequest,
) -> CoreResult<WriteSet> {
    let source = &snapshot.source;

    if !source.kind.is_confirmable() {
        return Err(ValidationError::Mismatch {
            field: "aggregate kind".to_string(),
            expected: "cotizacion or credito".to_string(),
            actual: source.kind.as_str().to_string(),
        }
        .into());
    }
    let confirmed = source
        .status
        .transition(AggregateStatus::Confirmed, &source.id)?;

    validate_id("sale_id", &request.sale_id)?;
    validate_payments(&request.payments)?;
    if source.kind == AggregateKind::Credit && source.customer_id.is_none() {
        return Err(ValidationError::Required {
            field: "customer_id".to_string(),
        }
        .into());
    }
    if snapshot.items.is_empty() {
        return Err(ValidationError::Required {
            field: "line items".to_string(),
        }
        .into());
    }

    let products: BTreeMap<&str, &Product> =
        snapshot.products.iter().map(|p| (p.id.as_str(), p)).collect();
    let lots: BTreeMap<&str, &Lot> = snapshot.lots.iter().map(|l| (l.id.as_str(), l)).collect();

    // Fixed-lot items claim first.
    let mut lot_claims: BTreeMap<String, i64> = BTreeMap::new();
    for item in &snapshot.items {
        validate_quantity(item.quantity)?;
        if !products.contains_key(item.product_id.as_str()) {
            return Err(CoreError::not_found("Product", &item.product_id));
        }
        if let Some(lot_id) = &item.lot_id {
            let lot = lots
                .get(lot_id.as_str())
                .ok_or_else(|| CoreError::not_found("Lot", lot_id))?;
            if lot.product_id != item.product_id {
                return Err(ValidationError::Mismatch {
                    field: format!("lot {lot_id} product"),
                    expected: item.product_id.clone(),
                    actual: lot.product_id.clone(),
                }
                .into());
            }
            *lot_claims.entry(lot_id.clone()).or_default() += item.quantity;
        }
    }

    // Resolve every item into lot-bound items, in input order.
    let mut resolved: Vec<LineItem> = Vec::new();
    for item in &snapshot.items {
        match &item.lot_id {
            Some(lot_id) => {
                let mut bound = item.clone();
                bound.unit_cost_cents = lots[lot_id.as_str()].unit_cost_cents;
                bound.recompute()?;
                resolved.push(bound);
            }
            None => {
                let remaining = lots_net_of_claims(&snapshot.lots, &item.product_id, &lot_claims);
                let allocations = select_lots(&item.product_id, &remaining, item.quantity)?;
                for allocation in &allocations {
                    *lot_claims.entry(allocation.lot_id.clone()).or_default() +=
                        allocation.quantity;
                }
                resolved.extend(materialize(
                    &request.sale_id,
                    &item.product_id,
                    item.quantity,
                    item.unit_price_cents,
                    &allocations,
                    request.now,
                )?);
            }
        }
    }

    let mut product_claims: BTreeMap<String, i64> = BTreeMap::new();
    for item in &resolved {
        *product_claims.entry(item.product_id.clone()).or_default() += item.quantity;
    }

    // Validate phase: still read-only.
    for (product_id, requested) in &product_claims {
        let product = products[product_id.as_str()];
        if product.stock_actual < *requested {
            return Err(CoreError::InsufficientStock {
                product_id: product_id.clone(),
                lot_id: None,
                available: product.stock_actual,
                requested: *requested,
            });
        }
    }
    for (lot_id, requested) in &lot_claims {
        let lot = lots[lot_id.as_str()];
        let available = if lot.status == LotStatus::Active {
            lot.remaining_quantity
        } else {
            0
        };
        if available < *requested {
            return Err(CoreError::InsufficientStock {
                product_id: lot.product_id.clone(),
                lot_id: Some(lot_id.clone()),
                available,
                requested: *requested,
            });
        }
    }

    // Write phase.
    let mut lots_after: Vec<Lot> = snapshot.lots.clone();
    let mut lot_updates = Vec::with_capacity(lot_claims.len());
    let mut movements = Vec::with_capacity(lot_claims.len());
    for (lot_id, consumed) in &lot_claims {
        let lot = lots[lot_id.as_str()];
        let remaining = lot.remaining_quantity - consumed;
        let status = LotStatus::for_remaining(remaining);

        if let Some(after) = lots_after.iter_mut().find(|l| &l.id == lot_id) {
            after.remaining_quantity = remaining;
            after.status = status;
        }
        lot_updates.push(LotUpdate {
            lot_id: lot_id.clone(),
            product_id: lot.product_id.clone(),
            previous_remaining: lot.remaining_quantity,
            remaining_quantity: remaining,
            status,
        });
        movements.push(Movement {
            id: Movement::id_for(&request.sale_id, lot_id),
            kind: MovementKind::Consumption,
            aggregate_id: Some(request.sale_id.clone()),
            product_id: lot.product_id.clone(),
            lot_id: lot_id.clone(),
            quantity: *consumed,
            unit_cost_cents: lot.unit_cost_cents,
            lot_remaining_after: remaining,
            created_at: request.now,
        });
    }

    let product_updates = product_claims
        .iter()
        .map(|(product_id, consumed)| {
            let product = products[product_id.as_str()];
            ProductUpdate {
                product_id: product_id.clone(),
                previous_stock: product.stock_actual,
                stock_actual: product.stock_actual - consumed,
                default_cost_cents: fifo_head_cost(product_id, &lots_after),
            }
        })
        .collect();

    for (n, item) in resolved.iter_mut().enumerate() {
        item.id = format!("{}:{:03}", request.sale_id, n + 1);
        item.aggregate_id = request.sale_id.clone();
        item.created_at = request.now;
    }
    let totals = HeaderTotals::recompute(&resolved);

    let payments = plan_payments(source, request, totals.total_cents)?;

    let sale = AggregateHeader {
        id: request.sale_id.clone(),
        kind: AggregateKind::Sale,
        status: AggregateStatus::Confirmed,
        customer_id: source.customer_id.clone(),
        total_cents: totals.total_cents,
        profit_cents: totals.profit_cents,
        source_id: Some(source.id.clone()),
        confirmed_into: None,
        created_at: request.now,
        updated_at: request.now,
        confirmed_at: Some(request.now),
    };

    Ok(WriteSet {
        lot_updates,
        product_updates,
        sale,
        sale_items: resolved,
        movements,
        payments,
        source_update: SourceUpdate {
            aggregate_id: source.id.clone(),
            previous_status: source.status,
            status: confirmed,
            confirmed_into: request.sale_id.clone(),
            confirmed_at: request.now,
        },
    })
}

/// Lots of `product_id` with quantities already claimed in this plan removed.
fn lots_net_of_claims(lots: &[Lot], product_id: &str, claims: &BTreeMap<String, i64>) -> Vec<Lot> {
    lots.iter()
        .filter(|l| l.product_id == product_id)
        .map(|l| {
            let mut net = l.clone();
            net.remaining_quantity -= claims.get(&l.id).copied().unwrap_or(0);
            if net.remaining_quantity <= 0 {
                net.remaining_quantity = 0;
                net.status = LotStatus::Depleted;
            }
            net
        })
        .collect()
}

/// Payment split rules.
///
/// - quotation: splits, when given, must add up to the sale total
/// - credit: splits are a down payment and may not exceed the total
fn plan_payments(
    source: &AggregateHeader,
    request: &ConfirmationRequest,
    total_cents: i64,
) -> CoreResult<Vec<Payment>> {
    let paid: i64 = request.payments.iter().map(|p| p.amount_cents).sum();

    match source.kind {
        AggregateKind::Quotation if !request.payments.is_empty() && paid != total_cents => {
            return Err(CoreError::InvalidPaymentAmount {
                reason: format!("payments add up to {paid} but the sale total is {total_cents}"),
            });
        }
        AggregateKind::Credit if paid > total_cents => {
            return Err(CoreError::InvalidPaymentAmount {
                reason: format!("down payment {paid} exceeds the credit total {total_cents}"),
            });
        }
        _ => {}
    }

    // Credit payments settle the credit itself; cash sales settle the sale.
    let settles = match source.kind {
        AggregateKind::Credit => source.id.clone(),
        _ => request.sale_id.clone(),
    };

    Ok(request
        .payments
        .iter()
        .enumerate()
        .map(|(n, input)| Payment {
            id: format!("{}:payment:{}", request.sale_id, n + 1),
            aggregate_id: settles.clone(),
            customer_id: source.customer_id.clone(),
            amount_cents: input.amount_cents,
            method: input.method,
            status: PaymentStatus::Active,
            created_at: request.now,
        })
        .collect())
}

// =============================================================================
// Unit Tests
// =============================================================================
