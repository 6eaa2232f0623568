//! # Lot Repository
//!
//! Stock intake and FIFO reads.
//!
//! ## Intake Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  receive(FILTRO-01, 10 @ $8.50)                                         │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   ├── INSERT lot        remaining 10, activo                            │
//! │   ├── UPDATE product    stock_actual += 10  (compare-and-set)           │
//! │   │                     default_cost = FIFO head over active lots       │
//! │   └── INSERT movement   entrada, lot_remaining_after 10                 │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use super::queries::{self, SELECT_LOT};
use crate::error::{DbError, DbResult};
use crate::retry::RetryPolicy;
use kardex_core::fifo::{fifo_head_cost, select_lots};
use kardex_core::validation::{validate_id, validate_price_cents, validate_quantity};
use kardex_core::{Lot, LotAllocation, LotStatus, Movement, MovementKind};

/// A delivery of one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotIntake {
    pub product_id: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    /// Defaults to now. Older dates put the lot ahead in FIFO order.
    pub received_at: Option<DateTime<Utc>>,
}

/// Repository for lot database operations.
#[derive(Debug, Clone)]
pub struct LotRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl LotRepository {
    /// Creates a new LotRepository.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        LotRepository { pool, retry }
    }

    /// Gets a lot by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Lot>> {
        let mut conn = self.pool.acquire().await?;
        queries::find_lot(&mut conn, id).await
    }

    /// Active lots of a product, oldest intake first.
    pub async fn list_active(&self, product_id: &str) -> DbResult<Vec<Lot>> {
        let mut conn = self.pool.acquire().await?;
        queries::fetch_active_lots(&mut conn, product_id).await
    }

    /// Every lot of a product, depleted ones included.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<Lot>> {
        let lots = sqlx::query_as::<_, Lot>(&format!(
            "{SELECT_LOT} WHERE product_id = ?1 ORDER BY received_at, id"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lots)
    }

    /// Speculative FIFO selection against current stock.
    ///
    /// Runs outside any transaction: the answer may be stale by the time the
    /// caller acts on it. Confirmation re-selects inside its own transaction.
    pub async fn select_lots(&self, product_id: &str, quantity: i64) -> DbResult<Vec<LotAllocation>> {
        let lots = self.list_active(product_id).await?;
        Ok(select_lots(product_id, &lots, quantity)?)
    }

    /// Receives a delivery as a new lot.
    pub async fn receive(&self, intake: &LotIntake) -> DbResult<Lot> {
        validate_id("product_id", &intake.product_id)?;
        validate_quantity(intake.quantity)?;
        validate_price_cents("unit_cost", intake.unit_cost_cents)?;

        let lot_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let lot = Lot {
            id: lot_id.clone(),
            product_id: intake.product_id.clone(),
            received_at: intake.received_at.unwrap_or(now),
            original_quantity: intake.quantity,
            remaining_quantity: intake.quantity,
            unit_cost_cents: intake.unit_cost_cents,
            status: LotStatus::Active,
        };

        let operation = format!("receive lot {lot_id}");
        let (this, lot_ref) = (self, &lot);
        this.retry
            .run(&operation, move || this.receive_attempt(lot_ref, now))
            .await?;

        info!(
            lot_id = %lot.id,
            product_id = %lot.product_id,
            quantity = lot.original_quantity,
            unit_cost_cents = lot.unit_cost_cents,
            "Lot received"
        );
        Ok(lot)
    }

    async fn receive_attempt(&self, lot: &Lot, now: DateTime<Utc>) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let product = queries::fetch_product(&mut *tx, &lot.product_id).await?;

        sqlx::query(
            r#"
            INSERT INTO lots (
                id, product_id, received_at, original_quantity, remaining_quantity,
                unit_cost_cents, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&lot.id)
        .bind(&lot.product_id)
        .bind(lot.received_at)
        .bind(lot.original_quantity)
        .bind(lot.remaining_quantity)
        .bind(lot.unit_cost_cents)
        .bind(lot.status)
        .execute(&mut *tx)
        .await?;

        let lots = queries::fetch_active_lots(&mut *tx, &lot.product_id).await?;
        let head_cost = fifo_head_cost(&lot.product_id, &lots);
        debug!(product_id = %product.id, head_cost, "Recomputed FIFO head cost");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                stock_actual = ?2,
                default_cost_cents = ?3,
                updated_at = ?4
            WHERE id = ?1 AND stock_actual = ?5
            "#,
        )
        .bind(&product.id)
        .bind(product.stock_actual + lot.original_quantity)
        .bind(head_cost)
        .bind(now)
        .bind(product.stock_actual)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::conflict(format!("product {} stock changed", product.id)));
        }

        queries::insert_movement(
            &mut *tx,
            &Movement {
                id: Movement::id_for("entrada", &lot.id),
                kind: MovementKind::Intake,
                aggregate_id: None,
                product_id: lot.product_id.clone(),
                lot_id: lot.id.clone(),
                quantity: lot.original_quantity,
                unit_cost_cents: lot.unit_cost_cents,
                lot_remaining_after: lot.remaining_quantity,
                created_at: now,
            },
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
