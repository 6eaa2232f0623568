//! # Validation Module
//!
//! Input validation that runs before any store interaction.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI handler                                                   │
//! │  └── Form checks, immediate feedback                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Quantities, prices, ids, minimum sale price                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Ledger plan (inside the transaction)                         │
//! │  └── Stock availability against the consistent snapshot                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{PaymentInput, Product};
use crate::{MAX_LINE_QUANTITY, MAX_UNIT_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifiers
// =============================================================================

/// Validates that a reference field is present.
///
/// ## Example
/// ```rust
/// use kardex_core::validation::validate_id;
///
/// assert!(validate_id("product_id", "FILTRO-01").is_ok());
/// assert!(validate_id("product_id", "  ").is_err());
/// ```
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a unit price or cost in cents.
///
/// Zero is allowed (gifts, warranty replacements); negatives and values
/// above MAX_UNIT_PRICE_CENTS are not.
///
/// ## Example
/// ```rust
/// use kardex_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents("unit_price", 1099).is_ok());
/// assert!(validate_price_cents("unit_price", 0).is_ok());
/// assert!(validate_price_cents("unit_price", -100).is_err());
/// assert!(validate_price_cents("unit_price", i64::MAX).is_err());
/// ```
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_UNIT_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_UNIT_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a sale price against the product's minimum sale price.
pub fn validate_sale_price(product: &Product, unit_price_cents: i64) -> ValidationResult<()> {
    validate_price_cents("unit_price", unit_price_cents)?;

    if unit_price_cents < product.min_sale_price_cents {
        return Err(ValidationError::BelowMinimum {
            field: "unit_price".to_string(),
            value: unit_price_cents,
            minimum: product.min_sale_price_cents,
        });
    }

    Ok(())
}

/// Validates a payment amount in cents. Must be positive.
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

/// Validates every split of a confirmation payment.
pub fn validate_payments(payments: &[PaymentInput]) -> ValidationResult<()> {
    payments
        .iter()
        .try_for_each(|p| validate_payment_amount(p.amount_cents))
}

// =============================================================================
// Unit Tests
// =============================================================================
