//! # Domain Types
//!
//! Ledger types shared by the core logic and the store layer.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐ 1   * ┌─────────────────┐ 1   * ┌──────────────┐  │
//! │  │    Product      │───────│      Lot        │───────│   Movement   │  │
//! │  │  stock_actual   │       │  remaining_qty  │       │  (append     │  │
//! │  │  default_cost   │       │  unit_cost      │       │   only)      │  │
//! │  └─────────────────┘       │  status         │       └──────────────┘  │
//! │                            └────────┬────────┘                          │
//! │                                     │ 1                                 │
//! │  ┌─────────────────┐ 1   *  ┌───────┴─────────┐                         │
//! │  │ AggregateHeader │────────│    LineItem     │                         │
//! │  │ cotizacion      │        │  qty × price    │                         │
//! │  │ credito / venta │        │  cost, margin   │                         │
//! │  └────────┬────────┘        └─────────────────┘                         │
//! │           │ 1   *  ┌─────────────────┐                                  │
//! │           └────────│    Payment      │  (abono)                         │
//! │                    └─────────────────┘                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Status values are stored and serialized with the shop's own vocabulary
//! (`activo`, `agotado`, `cotizacion`, `confirmada`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A catalogue product.
///
/// Stock and cost fields are only written by the ledger (confirmation and
/// intake transactions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub brand: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    /// Shelf/bin code in the store room.
    pub location_code: Option<String>,
    /// Aggregate remaining quantity across all lots.
    pub stock_actual: i64,
    /// Unit cost of the earliest still-active lot, 0 when none remain.
    pub default_cost_cents: i64,
    pub min_sale_price_cents: i64,
    pub default_sale_price_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn default_cost(&self) -> Money {
        Money::from_cents(self.default_cost_cents)
    }

    #[inline]
    pub fn min_sale_price(&self) -> Money {
        Money::from_cents(self.min_sale_price_cents)
    }

    #[inline]
    pub fn default_sale_price(&self) -> Money {
        Money::from_cents(self.default_sale_price_cents)
    }
}

// =============================================================================
// Lot
// =============================================================================

/// Lot lifecycle. `Depleted` iff `remaining_quantity == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum LotStatus {
    #[serde(rename = "activo")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "activo"))]
    Active,
    #[serde(rename = "agotado")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "agotado"))]
    Depleted,
}

impl LotStatus {
    /// Status implied by a remaining quantity.
    #[inline]
    pub const fn for_remaining(remaining: i64) -> Self {
        if remaining > 0 {
            LotStatus::Active
        } else {
            LotStatus::Depleted
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Active => "activo",
            LotStatus::Depleted => "agotado",
        }
    }
}

/// A physical inventory batch of one product.
///
/// Lots are never deleted, only depleted. The unit cost is fixed at intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Lot {
    pub id: String,
    pub product_id: String,
    /// Intake timestamp; FIFO order key.
    #[ts(as = "String")]
    pub received_at: DateTime<Utc>,
    pub original_quantity: i64,
    pub remaining_quantity: i64,
    pub unit_cost_cents: i64,
    pub status: LotStatus,
}

impl Lot {
    /// Whether the lot can still be drawn from.
    #[inline]
    pub fn is_available(&self) -> bool {
        self.status == LotStatus::Active && self.remaining_quantity > 0
    }

    #[inline]
    pub fn unit_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents)
    }
}

// =============================================================================
// Aggregates (Quotation / Credit / Sale)
// =============================================================================

/// Which document an aggregate header represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum AggregateKind {
    #[serde(rename = "cotizacion")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "cotizacion"))]
    Quotation,
    #[serde(rename = "credito")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "credito"))]
    Credit,
    #[serde(rename = "venta")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "venta"))]
    Sale,
}

impl AggregateKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Quotation => "cotizacion",
            AggregateKind::Credit => "credito",
            AggregateKind::Sale => "venta",
        }
    }

    /// Whether line items of this kind can still be edited and confirmed.
    #[inline]
    pub const fn is_confirmable(&self) -> bool {
        matches!(self, AggregateKind::Quotation | AggregateKind::Credit)
    }
}

/// Aggregate lifecycle. Transitions live in [`crate::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum AggregateStatus {
    #[serde(rename = "borrador")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "borrador"))]
    Draft,
    #[serde(rename = "pendiente")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "pendiente"))]
    Pending,
    #[serde(rename = "confirmada")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "confirmada"))]
    Confirmed,
    #[serde(rename = "cancelada")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "cancelada"))]
    Cancelled,
}

impl Default for AggregateStatus {
    fn default() -> Self {
        AggregateStatus::Draft
    }
}

impl AggregateStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AggregateStatus::Draft => "borrador",
            AggregateStatus::Pending => "pendiente",
            AggregateStatus::Confirmed => "confirmada",
            AggregateStatus::Cancelled => "cancelada",
        }
    }

    /// Line items may only change while the aggregate is open.
    #[inline]
    pub const fn is_editable(&self) -> bool {
        matches!(self, AggregateStatus::Draft | AggregateStatus::Pending)
    }
}

/// Header of a quotation, credit or sale.
///
/// `total_cents` and `profit_cents` are accumulators: every line-item write
/// applies its signed delta here in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AggregateHeader {
    pub id: String,
    pub kind: AggregateKind,
    pub status: AggregateStatus,
    pub customer_id: Option<String>,
    pub total_cents: i64,
    pub profit_cents: i64,
    /// For a sale: the quotation or credit it was confirmed from.
    pub source_id: Option<String>,
    /// For a confirmed quotation or credit: the sale it produced.
    pub confirmed_into: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl AggregateHeader {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn profit(&self) -> Money {
        Money::from_cents(self.profit_cents)
    }
}

// =============================================================================
// Line Item
// =============================================================================

/// A line of a quotation, credit or sale, bound to at most one lot.
///
/// ## Derived Fields
/// ```text
/// subtotal          = quantity × unit_price
/// unit_profit       = unit_price − unit_cost   (cost copied from the lot)
/// total_profit      = quantity × unit_profit
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LineItem {
    pub id: String,
    pub aggregate_id: String,
    pub product_id: String,
    /// `None` until the line is resolved against a lot.
    pub lot_id: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
    pub unit_cost_cents: i64,
    pub unit_profit_cents: i64,
    pub total_profit_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl LineItem {
    /// Recomputes every derived money field from quantity, price and cost.
    ///
    /// Fails without touching the item when an amount leaves the i64 range.
    pub fn recompute(&mut self) -> Result<(), ValidationError> {
        let price = Money::from_cents(self.unit_price_cents);
        let overflow = || ValidationError::OutOfRange {
            field: format!("line item {} amount", self.id),
            min: i64::MIN,
            max: i64::MAX,
        };

        let subtotal = price.checked_mul_quantity(self.quantity).ok_or_else(overflow)?;
        let unit_profit = price
            .checked_sub(Money::from_cents(self.unit_cost_cents))
            .ok_or_else(overflow)?;
        let total_profit = unit_profit.checked_mul_quantity(self.quantity).ok_or_else(overflow)?;

        self.subtotal_cents = subtotal.cents();
        self.unit_profit_cents = unit_profit.cents();
        self.total_profit_cents = total_profit.cents();
        Ok(())
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn total_profit(&self) -> Money {
        Money::from_cents(self.total_profit_cents)
    }
}

// =============================================================================
// Movement
// =============================================================================

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum MovementKind {
    /// Stock intake that created a lot.
    #[serde(rename = "entrada")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "entrada"))]
    Intake,
    /// Consumption by a confirmed sale.
    #[serde(rename = "salida")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "salida"))]
    Consumption,
}

/// Immutable audit record. One per (transaction, lot) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Movement {
    pub id: String,
    pub kind: MovementKind,
    /// Sale that consumed the stock; `None` for intakes.
    pub aggregate_id: Option<String>,
    pub product_id: String,
    pub lot_id: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    pub lot_remaining_after: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Movement {
    /// Deterministic id for the movement a transaction writes against a lot.
    ///
    /// A retried transaction regenerates the same ids, and the primary key
    /// rejects a second movement for the same pair.
    pub fn id_for(transaction_id: &str, lot_id: &str) -> String {
        format!("{transaction_id}:{lot_id}")
    }
}

// =============================================================================
// Payments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum PaymentMethod {
    #[serde(rename = "efectivo")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "efectivo"))]
    Cash,
    #[serde(rename = "tarjeta")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "tarjeta"))]
    Card,
    #[serde(rename = "transferencia")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "transferencia"))]
    Transfer,
}

/// Payment lifecycle. Only `Active` payments reduce a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum PaymentStatus {
    #[serde(rename = "activo")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "activo"))]
    Active,
    #[serde(rename = "procesado")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "procesado"))]
    Processed,
    #[serde(rename = "saldado")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "saldado"))]
    Settled,
    #[serde(rename = "cancelado")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "cancelado"))]
    Cancelled,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Active
    }
}

impl PaymentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Active => "activo",
            PaymentStatus::Processed => "procesado",
            PaymentStatus::Settled => "saldado",
            PaymentStatus::Cancelled => "cancelado",
        }
    }

    /// Whether a payment in this status counts against the outstanding balance.
    #[inline]
    pub const fn counts_toward_balance(&self) -> bool {
        matches!(self, PaymentStatus::Active)
    }
}

/// A payment (abono) against a credit or a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    /// Credit (or sale) this payment settles.
    pub aggregate_id: String,
    pub customer_id: Option<String>,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// A payment split supplied when confirming an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentInput {
    pub method: PaymentMethod,
    pub amount_cents: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
