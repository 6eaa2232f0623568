//! # kardex-db: Store Layer for Kardex POS
//!
//! Every read and write against the SQLite ledger store.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kardex Data Flow                                 │
//! │                                                                         │
//! │  Caller (counter app, API, seed binary)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kardex-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ Product  Lot   │   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ Quotation      │   │ 001_init.sql │  │   │
//! │  │   │ RetryPolicy   │    │ Ledger Credit  │   │              │  │   │
//! │  │   │               │    │ Movement       │   │              │  │   │
//! │  │   └───────────────┘    └───────┬────────┘   └──────────────┘  │   │
//! │  │                                │ plan_confirmation, select_lots │   │
//! │  │                                ▼                                │   │
//! │  │                          kardex-core (pure)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Pool, migration and retry settings
//! - [`pool`] - Connection pool and repository access
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`retry`] - Conflict retry around whole transactions
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kardex_db::{Database, DbConfig, LotIntake};
//!
//! let db = Database::new(DbConfig::new("./kardex.db")).await?;
//! db.lots().receive(&LotIntake { product_id: "FILTRO-01".into(), quantity: 10,
//!                                unit_cost_cents: 850, received_at: None }).await?;
//! let outcome = db.ledger().confirm(&quotation_id, &[]).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod retry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, DbConfig};
pub use error::{DbError, DbResult};
pub use pool::Database;
pub use retry::RetryPolicy;

// Repository re-exports for convenience
pub use repository::credit::CreditRepository;
pub use repository::ledger::{ConfirmOutcome, LedgerRepository};
pub use repository::lot::{LotIntake, LotRepository};
pub use repository::movement::MovementRepository;
pub use repository::product::ProductRepository;
pub use repository::quotation::{QuotationRepository, TotalsReconciliation};
