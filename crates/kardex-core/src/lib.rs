//! # kardex-core: Pure Ledger Logic for Kardex POS
//!
//! This crate is the **heart** of Kardex POS. It holds the FIFO inventory
//! ledger as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kardex POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │         Callers (counter UI, quotation editor, imports)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kardex-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   fifo    │  │ materialize│  │   plan    │  │  credit   │  │   │
//! │  │   │ selector  │  │ lot splits │  │ write-set │  │  balance  │  │   │
//! │  │   └───────────┘  └────────────┘  └───────────┘  └───────────┘  │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  status   │  │   totals   │  │   money   │  │ document  │  │   │
//! │  │   │ lifecycle │  │ accumulate │  │   cents   │  │  decoding │  │   │
//! │  │   └───────────┘  └────────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              kardex-db (Store Layer)                            │   │
//! │  │     SQLite transactions, conflict retry, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Product, Lot, LineItem, Movement, Payment)
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//! - [`fifo`] - FIFO lot selection
//! - [`materialize`] - Lot-split line items
//! - [`plan`] - Confirmation write-set planning
//! - [`status`] - Aggregate and payment lifecycles
//! - [`totals`] - Incremental header totals
//! - [`credit`] - Outstanding credit balances
//! - [`document`] - Loose JSON document decoding
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use kardex_core::{fifo::select_lots, materialize::materialize, Lot, LotStatus};
//!
//! let lot = |id: &str, qty: i64, cost: i64| Lot {
//!     id: id.to_string(),
//!     product_id: "BUJIA-NGK".to_string(),
//!     received_at: Utc::now(),
//!     original_quantity: qty,
//!     remaining_quantity: qty,
//!     unit_cost_cents: cost,
//!     status: LotStatus::Active,
//! };
//! let lots = vec![lot("L1", 2, 300), lot("L2", 10, 350)];
//!
//! let picks = select_lots("BUJIA-NGK", &lots, 3).unwrap();
//! let items = materialize("Q1", "BUJIA-NGK", 3, 500, &picks, Utc::now()).unwrap();
//!
//! let total: i64 = items.iter().map(|i| i.subtotal_cents).sum();
//! assert_eq!(total, 1500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod credit;
pub mod document;
pub mod error;
pub mod fifo;
pub mod materialize;
pub mod money;
pub mod plan;
pub mod status;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use fifo::LotAllocation;
pub use money::Money;
pub use plan::{ConfirmationRequest, ConfirmationSnapshot, WriteSet};
pub use totals::{HeaderTotals, TotalsDelta};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity on a single line.
///
/// Guards against typos at the counter (10000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 9_999;

/// Maximum unit price or cost in cents (100 million in major units).
///
/// Keeps `MAX_LINE_QUANTITY × price` and header accumulators well inside i64.
pub const MAX_UNIT_PRICE_CENTS: i64 = 10_000_000_000;
