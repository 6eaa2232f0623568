//! # Ledger Repository
//!
//! Confirmation of quotations and credits into sales.
//!
//! ## Transaction Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  confirm(COT-17, [efectivo 4500])                                       │
//! │                                                                         │
//! │  sale_id, now  ← fixed once, reused by every attempt                    │
//! │                                                                         │
//! │  ┌─ attempt ─────────────────────────────────────────────────────────┐ │
//! │  │ BEGIN                                                              │ │
//! │  │  read      header, items, products, active + bound lots           │ │
//! │  │  plan      plan_confirmation(snapshot)  → WriteSet  (pure)         │ │
//! │  │  apply     lots      UPDATE … WHERE remaining_quantity = seen     │ │
//! │  │            products  UPDATE … WHERE stock_actual = seen           │ │
//! │  │            sale header, sale items, movements, payments           │ │
//! │  │            source    UPDATE … WHERE status = seen                 │ │
//! │  │ COMMIT                                                             │ │
//! │  └────────────────────────────────────────────────────────────────────┘ │
//! │        │ Conflict (busy / stale compare-and-set) → rollback, retry     │
//! │        │ InsufficientStock / NotFound / … → rollback, return           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two confirmations racing for the same lot cannot both commit: the loser
//! either hits SQLite's write lock or a compare-and-set that matches no row,
//! rolls back, and re-plans against the winner's stock.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::queries;
use crate::error::{DbError, DbResult};
use crate::retry::RetryPolicy;
use kardex_core::plan::plan_confirmation;
use kardex_core::validation::validate_id;
use kardex_core::{
    AggregateHeader, ConfirmationRequest, ConfirmationSnapshot, LineItem, Movement, Payment,
    PaymentInput, WriteSet,
};

/// What a committed confirmation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmOutcome {
    pub sale_id: String,
    pub sale: AggregateHeader,
    pub sale_items: Vec<LineItem>,
    pub movements: Vec<Movement>,
    pub payments: Vec<Payment>,
}

impl From<WriteSet> for ConfirmOutcome {
    fn from(writes: WriteSet) -> Self {
        ConfirmOutcome {
            sale_id: writes.sale.id.clone(),
            sale: writes.sale,
            sale_items: writes.sale_items,
            movements: writes.movements,
            payments: writes.payments,
        }
    }
}

/// Repository for the confirmation ledger.
///
/// ## Usage
/// ```rust,ignore
/// let outcome = db.ledger().confirm(&quotation.id, &[]).await?;
/// println!("sale {} consumed {} lots", outcome.sale_id, outcome.movements.len());
/// ```
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        LedgerRepository { pool, retry }
    }

    /// Confirms a quotation or credit into a sale.
    ///
    /// ## Returns
    /// The new sale with its items, movements and payments.
    ///
    /// ## Errors
    /// - `Core(InsufficientStock)` when stock ran out, `shortfall()` says by how much
    /// - `Core(InvalidStatusTransition)` when the source is already terminal
    /// - `ConflictRetryExhausted` when every attempt lost a write race
    pub async fn confirm(&self, source_id: &str, payments: &[PaymentInput]) -> DbResult<ConfirmOutcome> {
        validate_id("source_id", source_id)?;

        let request = ConfirmationRequest {
            sale_id: Uuid::new_v4().to_string(),
            payments: payments.to_vec(),
            now: Utc::now(),
        };

        let operation = format!("confirm {source_id}");
        let (this, request_ref) = (self, &request);
        let writes = this
            .retry
            .run(&operation, move || this.confirm_attempt(source_id, request_ref))
            .await?;

        info!(
            source_id,
            sale_id = %writes.sale.id,
            total_cents = writes.sale.total_cents,
            profit_cents = writes.sale.profit_cents,
            lots = writes.movements.len(),
            units = writes.units_consumed(),
            "Confirmation committed"
        );
        Ok(writes.into())
    }

    async fn confirm_attempt(&self, source_id: &str, request: &ConfirmationRequest) -> DbResult<WriteSet> {
        let mut tx = self.pool.begin().await?;

        let snapshot = read_snapshot(&mut *tx, source_id).await?;
        let writes = plan_confirmation(&snapshot, request)?;
        debug!(
            source_id,
            lot_updates = writes.lot_updates.len(),
            product_updates = writes.product_updates.len(),
            items = writes.sale_items.len(),
            "Confirmation planned"
        );

        apply(&mut *tx, &writes, request.now).await?;
        tx.commit().await?;
        Ok(writes)
    }

    /// Plans a confirmation without writing anything.
    ///
    /// The read runs in a transaction that is always rolled back. The result
    /// is a snapshot: a later `confirm` may see different stock.
    pub async fn preview_confirmation(&self, source_id: &str, payments: &[PaymentInput]) -> DbResult<WriteSet> {
        validate_id("source_id", source_id)?;

        let request = ConfirmationRequest {
            sale_id: Uuid::new_v4().to_string(),
            payments: payments.to_vec(),
            now: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;
        let planned = match read_snapshot(&mut *tx, source_id).await {
            Ok(snapshot) => plan_confirmation(&snapshot, &request).map_err(DbError::from),
            Err(err) => Err(err),
        };
        tx.rollback().await?;
        planned
    }
}

// =============================================================================
// Read Phase
// =============================================================================

/// Loads everything `plan_confirmation` needs.
///
/// Missing products are left out so the planner reports them as `NotFound`.
async fn read_snapshot(conn: &mut SqliteConnection, source_id: &str) -> DbResult<ConfirmationSnapshot> {
    let source = queries::fetch_header(&mut *conn, source_id).await?;
    let items = queries::fetch_items(&mut *conn, source_id).await?;

    let product_ids: BTreeSet<&str> = items.iter().map(|i| i.product_id.as_str()).collect();
    let mut products = Vec::with_capacity(product_ids.len());
    let mut lots = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for product_id in product_ids {
        if let Some(product) = queries::find_product(&mut *conn, product_id).await? {
            products.push(product);
        }
        for lot in queries::fetch_active_lots(&mut *conn, product_id).await? {
            if seen.insert(lot.id.clone()) {
                lots.push(lot);
            }
        }
    }

    // Bound lots may be depleted already; the planner still needs them to
    // report the shortfall against the right lot.
    for lot_id in items.iter().filter_map(|i| i.lot_id.as_deref()) {
        if seen.contains(lot_id) {
            continue;
        }
        if let Some(lot) = queries::find_lot(&mut *conn, lot_id).await? {
            seen.insert(lot.id.clone());
            lots.push(lot);
        }
    }

    debug!(
        source_id,
        items = items.len(),
        products = products.len(),
        lots = lots.len(),
        "Confirmation snapshot read"
    );

    Ok(ConfirmationSnapshot {
        source,
        items,
        products,
        lots,
    })
}

// =============================================================================
// Apply Phase
// =============================================================================

/// Writes a planned confirmation. Every stock write is compare-and-set on
/// the value the read phase saw.
async fn apply(conn: &mut SqliteConnection, writes: &WriteSet, now: DateTime<Utc>) -> DbResult<()> {
    for update in &writes.lot_updates {
        let result = sqlx::query(
            r#"
            UPDATE lots SET remaining_quantity = ?2, status = ?3
            WHERE id = ?1 AND remaining_quantity = ?4
            "#,
        )
        .bind(&update.lot_id)
        .bind(update.remaining_quantity)
        .bind(update.status)
        .bind(update.previous_remaining)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::conflict(format!("lot {} stock changed", update.lot_id)));
        }
    }

    for update in &writes.product_updates {
        let result = sqlx::query(
            r#"
            UPDATE products SET stock_actual = ?2, default_cost_cents = ?3, updated_at = ?4
            WHERE id = ?1 AND stock_actual = ?5
            "#,
        )
        .bind(&update.product_id)
        .bind(update.stock_actual)
        .bind(update.default_cost_cents)
        .bind(now)
        .bind(update.previous_stock)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::conflict(format!(
                "product {} stock changed",
                update.product_id
            )));
        }
    }

    queries::insert_header(&mut *conn, &writes.sale).await?;
    for item in &writes.sale_items {
        queries::insert_item(&mut *conn, item).await?;
    }
    for movement in &writes.movements {
        queries::insert_movement(&mut *conn, movement).await?;
    }
    for payment in &writes.payments {
        queries::insert_payment(&mut *conn, payment).await?;
    }

    let source = &writes.source_update;
    let result = sqlx::query(
        r#"
        UPDATE aggregates SET status = ?3, confirmed_into = ?4, confirmed_at = ?5, updated_at = ?5
        WHERE id = ?1 AND status = ?2
        "#,
    )
    .bind(&source.aggregate_id)
    .bind(source.previous_status)
    .bind(source.status)
    .bind(&source.confirmed_into)
    .bind(source.confirmed_at)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::conflict(format!(
            "aggregate {} status changed",
            source.aggregate_id
        )));
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
