//! # Error Types
//!
//! Domain-specific error types for kardex-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kardex-core errors (this file)                                        │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  kardex-db errors (separate crate)                                     │
//! │  └── DbError          - Store failures, conflicts, retry exhaustion    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → UI handler              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product ID, lot ID, quantities)
//! 3. Errors are enum variants, never String
//! 4. No variant ever describes a partially applied change

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Ledger rule violations.
///
/// Every variant is fatal to the operation that raised it. Nothing has been
/// written when one of these reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A referenced product, lot or aggregate does not exist.
    ///
    /// ## When This Occurs
    /// - The product was deleted between quoting and confirming
    /// - A line item points at a lot that is not in the snapshot
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Requested quantity exceeds what a product or a lot holds.
    ///
    /// ## User Workflow
    /// ```text
    /// Confirm quotation (FILTRO-01 × 8)
    ///      │
    ///      ▼
    /// Lots: L1 = 3, L2 = 2  (available 5)
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: "FILTRO-01", lot_id: None,
    ///                     available: 5, requested: 8 }   shortfall = 3
    /// ```
    #[error(
        "Insufficient stock for product {product_id}{}: available {available}, requested {requested}",
        lot_suffix(.lot_id)
    )]
    InsufficientStock {
        product_id: String,
        lot_id: Option<String>,
        available: i64,
        requested: i64,
    },

    /// Aggregate lifecycle edge not present in the transition table.
    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        entity: String,
        id: String,
        from: String,
        to: String,
    },

    /// Payment amounts do not fit the aggregate they settle.
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

fn lot_suffix(lot_id: &Option<String>) -> String {
    match lot_id {
        Some(lot) => format!(" (lot {lot})"),
        None => String::new(),
    }
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Units missing to satisfy the request, zero for every other variant.
    pub fn shortfall(&self) -> i64 {
        match self {
            CoreError::InsufficientStock {
                available,
                requested,
                ..
            } => (requested - available).max(0),
            _ => 0,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any store interaction takes place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., non-numeric quantity in a store document).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Sale price under the product's minimum sale price.
    #[error("{field} {value} is below the minimum of {minimum}")]
    BelowMinimum {
        field: String,
        value: i64,
        minimum: i64,
    },

    /// Two values that must agree do not.
    #[error("{field} mismatch: expected {expected}, got {actual}")]
    Mismatch {
        field: String,
        expected: String,
        actual: String,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
