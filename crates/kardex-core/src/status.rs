//! # Status Transitions
//!
//! Closed transition tables for aggregates and payments.
//!
//! ## Aggregate Lifecycle (quotation / credit)
//! ```text
//!   borrador ──────► pendiente ──────► cancelada  (terminal, no stock effect)
//!      │                 │
//!      └────────┬────────┘
//!               ▼
//!          confirmada  (terminal, runs the ledger)
//! ```
//!
//! ## Payment Lifecycle
//! ```text
//!   activo ──► procesado ──► saldado
//!     │  │         │
//!     │  └─────────┼──────► cancelado
//!     └──► saldado └──────► cancelado
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::{AggregateStatus, PaymentStatus};

impl AggregateStatus {
    /// Whether `self → to` is an edge of the lifecycle.
    pub const fn can_transition_to(&self, to: AggregateStatus) -> bool {
        use AggregateStatus::*;
        matches!(
            (self, to),
            (Draft, Pending) | (Draft, Confirmed) | (Pending, Confirmed) | (Pending, Cancelled)
        )
    }

    /// Validated transition for aggregate `id`.
    pub fn transition(self, to: AggregateStatus, id: &str) -> CoreResult<AggregateStatus> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(CoreError::InvalidStatusTransition {
                entity: "Aggregate".to_string(),
                id: id.to_string(),
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }
}

impl PaymentStatus {
    pub const fn can_transition_to(&self, to: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, to),
            (Active, Processed)
                | (Active, Settled)
                | (Active, Cancelled)
                | (Processed, Settled)
                | (Processed, Cancelled)
        )
    }

    /// Validated transition for payment `id`.
    pub fn transition(self, to: PaymentStatus, id: &str) -> CoreResult<PaymentStatus> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(CoreError::InvalidStatusTransition {
                entity: "Payment".to_string(),
                id: id.to_string(),
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [AggregateStatus; 4] = [
        AggregateStatus::Draft,
        AggregateStatus::Pending,
        AggregateStatus::Confirmed,
        AggregateStatus::Cancelled,
    ];

    #[test]
    fn test_confirmation_edges() {
        assert!(AggregateStatus::Draft.can_transition_to(AggregateStatus::Confirmed));
        assert!(AggregateStatus::Pending.can_transition_to(AggregateStatus::Confirmed));
        assert!(AggregateStatus::Pending.can_transition_to(AggregateStatus::Cancelled));
        assert!(AggregateStatus::Draft.can_transition_to(AggregateStatus::Pending));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for to in ALL {
            assert!(!AggregateStatus::Confirmed.can_transition_to(to));
            assert!(!AggregateStatus::Cancelled.can_transition_to(to));
        }
    }

    #[test]
    fn test_rejected_transition_names_both_ends() {
        let err = AggregateStatus::Confirmed
            .transition(AggregateStatus::Cancelled, "Q-7")
            .unwrap_err();
        assert_eq!(err.to_string(), "Aggregate Q-7 cannot move from confirmada to cancelada");
    }

    #[test]
    fn test_payment_transitions() {
        assert_eq!(
            PaymentStatus::Active.transition(PaymentStatus::Cancelled, "A").unwrap(),
            PaymentStatus::Cancelled
        );
        assert!(PaymentStatus::Processed.can_transition_to(PaymentStatus::Settled));
        assert!(!PaymentStatus::Cancelled.can_transition_to(PaymentStatus::Active));
        assert!(!PaymentStatus::Settled.can_transition_to(PaymentStatus::Cancelled));
        assert!(!PaymentStatus::Active.can_transition_to(PaymentStatus::Active));
    }
}
