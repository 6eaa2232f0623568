//! # Credit Repository
//!
//! Customer balances and payments (abonos) against confirmed credits.
//!
//! Balances are never stored. They are recomputed on every read from the
//! credit totals and the payments whose status is `activo`, so cancelling a
//! payment restores the balance without touching the credit.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use super::queries::{self, SELECT_AGGREGATE, SELECT_PAYMENT};
use crate::error::{DbError, DbResult};
use crate::retry::RetryPolicy;
use kardex_core::credit;
use kardex_core::validation::{validate_id, validate_payment_amount};
use kardex_core::{
    AggregateHeader, AggregateKind, AggregateStatus, CoreError, Money, Payment, PaymentMethod,
    PaymentStatus, ValidationError,
};

/// Repository for credit balances and payments.
#[derive(Debug, Clone)]
pub struct CreditRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl CreditRepository {
    /// Creates a new CreditRepository.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        CreditRepository { pool, retry }
    }

    /// What a customer still owes across all confirmed credits.
    pub async fn outstanding_balance(&self, customer_id: &str) -> DbResult<Money> {
        validate_id("customer_id", customer_id)?;

        let credits = sqlx::query_as::<_, AggregateHeader>(&format!(
            "{SELECT_AGGREGATE} WHERE kind = 'credito' AND customer_id = ?1"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        let payments = sqlx::query_as::<_, Payment>(&format!(
            "{SELECT_PAYMENT} WHERE aggregate_id IN \
             (SELECT id FROM aggregates WHERE kind = 'credito' AND customer_id = ?1)"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        let balance = credit::outstanding_balance(&credits, &payments);
        debug!(customer_id, credits = credits.len(), balance = %balance, "Outstanding balance computed");
        Ok(balance)
    }

    /// What is left to pay on one credit. Zero until the credit is confirmed.
    pub async fn credit_balance(&self, credit_id: &str) -> DbResult<Money> {
        let mut conn = self.pool.acquire().await?;
        let header = queries::fetch_header(&mut conn, credit_id).await?;
        ensure_credit(&header)?;
        let payments = queries::fetch_payments_for(&mut conn, credit_id).await?;
        Ok(credit::credit_balance(&header, &payments))
    }

    /// Payments recorded against a credit, oldest first.
    pub async fn payments(&self, credit_id: &str) -> DbResult<Vec<Payment>> {
        let mut conn = self.pool.acquire().await?;
        queries::fetch_payments_for(&mut conn, credit_id).await
    }

    /// Records a payment against a confirmed credit.
    ///
    /// ## Errors
    /// - `Core(InvalidPaymentAmount)` when the credit is not confirmed or
    ///   `amount_cents` exceeds its balance
    pub async fn register_payment(
        &self,
        credit_id: &str,
        amount_cents: i64,
        method: PaymentMethod,
    ) -> DbResult<Payment> {
        validate_id("credit_id", credit_id)?;
        validate_payment_amount(amount_cents)?;

        let payment_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let operation = format!("pay credit {credit_id}");
        let (this, payment_ref) = (self, payment_id.as_str());
        let payment = this
            .retry
            .run(&operation, move || {
                this.register_payment_attempt(credit_id, payment_ref, amount_cents, method, now)
            })
            .await?;

        info!(
            credit_id,
            payment_id = %payment.id,
            amount_cents,
            "Payment registered"
        );
        Ok(payment)
    }

    async fn register_payment_attempt(
        &self,
        credit_id: &str,
        payment_id: &str,
        amount_cents: i64,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> DbResult<Payment> {
        let mut tx = self.pool.begin().await?;

        let header = queries::fetch_header(&mut *tx, credit_id).await?;
        ensure_credit(&header)?;
        if header.status != AggregateStatus::Confirmed {
            return Err(CoreError::InvalidPaymentAmount {
                reason: format!("credit {credit_id} is {}, not confirmada", header.status.as_str()),
            }
            .into());
        }

        let existing = queries::fetch_payments_for(&mut *tx, credit_id).await?;
        let balance = credit::credit_balance(&header, &existing);
        if amount_cents > balance.cents() {
            return Err(CoreError::InvalidPaymentAmount {
                reason: format!("payment {amount_cents} exceeds the balance {}", balance.cents()),
            }
            .into());
        }

        let payment = Payment {
            id: payment_id.to_string(),
            aggregate_id: credit_id.to_string(),
            customer_id: header.customer_id.clone(),
            amount_cents,
            method,
            status: PaymentStatus::Active,
            created_at: now,
        };
        queries::insert_payment(&mut *tx, &payment).await?;

        let result = sqlx::query(
            "UPDATE aggregates SET updated_at = ?2 WHERE id = ?1 AND status = 'confirmada'",
        )
        .bind(credit_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::conflict(format!("credit {credit_id} changed")));
        }

        tx.commit().await?;
        Ok(payment)
    }

    /// Moves a payment along its lifecycle.
    pub async fn set_payment_status(&self, payment_id: &str, status: PaymentStatus) -> DbResult<Payment> {
        let operation = format!("set payment {payment_id} to {}", status.as_str());
        let this = self;
        let payment = this
            .retry
            .run(&operation, move || this.set_payment_status_attempt(payment_id, status))
            .await?;
        info!(payment_id, status = status.as_str(), "Payment status changed");
        Ok(payment)
    }

    async fn set_payment_status_attempt(&self, payment_id: &str, status: PaymentStatus) -> DbResult<Payment> {
        let mut tx = self.pool.begin().await?;

        let mut payment = queries::fetch_payment(&mut *tx, payment_id).await?;
        let from = payment.status;
        payment.status = from.transition(status, payment_id)?;

        let result = sqlx::query("UPDATE payments SET status = ?3 WHERE id = ?1 AND status = ?2")
            .bind(payment_id)
            .bind(from)
            .bind(payment.status)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::conflict(format!("payment {payment_id} status changed")));
        }

        tx.commit().await?;
        Ok(payment)
    }
}

fn ensure_credit(header: &AggregateHeader) -> DbResult<()> {
    if header.kind == AggregateKind::Credit {
        return Ok(());
    }
    Err(ValidationError::Mismatch {
        field: format!("aggregate {} kind", header.id),
        expected: AggregateKind::Credit.as_str().to_string(),
        actual: header.kind.as_str().to_string(),
    }
    .into())
}

// =============================================================================
// Unit Tests
// =============================================================================
