//! # Repository Module
//!
//! Store repositories for the ledger.
//!
//! ## Who Writes What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Repository           Writes                                           │
//! │  ──────────────────   ─────────────────────────────────────────────    │
//! │  ProductRepository    catalogue fields and prices, never stock/cost    │
//! │  LotRepository        new lots, product stock + head cost, entrada     │
//! │  QuotationRepository  line items and header totals of open drafts      │
//! │  LedgerRepository     lot/product stock, sale, salida, payments        │
//! │  CreditRepository     payments and payment status                      │
//! │  MovementRepository   nothing (audit reads)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock fields are only ever written inside a transaction that also appends
//! the matching movement.

pub mod credit;
pub mod ledger;
pub mod lot;
pub mod movement;
pub mod product;
pub mod quotation;

pub(crate) mod queries;
