//! # Quotation Repository
//!
//! Editing of open quotations and credits, with incremental header totals.
//!
//! ## Write Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_product / update_item / remove_item                               │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   ├── read header (must be borrador/pendiente)                         │
//! │   ├── write line item(s)                                               │
//! │   └── header.total  += Δsubtotal                                       │
//! │       header.profit += Δprofit                                         │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  recompute_totals(): Σ live items vs header, repaired and logged       │
//! │                      when they drift                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Editing never touches stock. Lots are only consumed at confirmation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::queries;
use crate::error::{DbError, DbResult};
use crate::retry::RetryPolicy;
use kardex_core::fifo::select_lots;
use kardex_core::materialize::materialize;
use kardex_core::validation::{validate_id, validate_quantity, validate_sale_price};
use kardex_core::{
    AggregateHeader, AggregateKind, AggregateStatus, CoreError, HeaderTotals, LineItem,
    LotStatus, TotalsDelta, ValidationError,
};

/// Result of a totals reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsReconciliation {
    /// Totals the header held before reconciliation.
    pub stored: HeaderTotals,
    /// Totals recomputed from live line items (now stored).
    pub live: HeaderTotals,
}

impl TotalsReconciliation {
    pub fn drifted(&self) -> bool {
        !self.stored.drift_from(&self.live).is_zero()
    }
}

/// Repository for quotation and credit editing.
#[derive(Debug, Clone)]
pub struct QuotationRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl QuotationRepository {
    /// Creates a new QuotationRepository.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        QuotationRepository { pool, retry }
    }

    /// Opens a new draft quotation or credit.
    ///
    /// Sales are never created directly; they come out of confirmation.
    /// A credit needs a customer to owe the balance.
    pub async fn create(&self, kind: AggregateKind, customer_id: Option<&str>) -> DbResult<AggregateHeader> {
        if !kind.is_confirmable() {
            return Err(ValidationError::Mismatch {
                field: "aggregate kind".to_string(),
                expected: "cotizacion or credito".to_string(),
                actual: kind.as_str().to_string(),
            }
            .into());
        }
        if kind == AggregateKind::Credit {
            validate_id("customer_id", customer_id.unwrap_or_default())?;
        }

        let now = Utc::now();
        let header = AggregateHeader {
            id: Uuid::new_v4().to_string(),
            kind,
            status: AggregateStatus::Draft,
            customer_id: customer_id.map(str::to_string),
            total_cents: 0,
            profit_cents: 0,
            source_id: None,
            confirmed_into: None,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
        };

        debug!(id = %header.id, kind = kind.as_str(), "Creating aggregate");
        let mut conn = self.pool.acquire().await?;
        queries::insert_header(&mut conn, &header).await?;
        Ok(header)
    }

    /// Gets a header by ID.
    pub async fn get(&self, id: &str) -> DbResult<AggregateHeader> {
        let mut conn = self.pool.acquire().await?;
        queries::fetch_header(&mut conn, id).await
    }

    /// Live line items of an aggregate.
    pub async fn items(&self, aggregate_id: &str) -> DbResult<Vec<LineItem>> {
        let mut conn = self.pool.acquire().await?;
        queries::fetch_items(&mut conn, aggregate_id).await
    }

    /// Adds `quantity` of a product, split FIFO across lots.
    ///
    /// Lot availability is reduced by what this aggregate already binds to
    /// each lot. `unit_price_cents` defaults to the product's sale price and
    /// may not go below its minimum sale price.
    ///
    /// ## Returns
    /// The new line items, one per lot drawn from.
    pub async fn add_product(
        &self,
        aggregate_id: &str,
        product_id: &str,
        quantity: i64,
        unit_price_cents: Option<i64>,
    ) -> DbResult<Vec<LineItem>> {
        validate_id("product_id", product_id)?;
        validate_quantity(quantity)?;

        let operation = format!("add {product_id} to {aggregate_id}");
        let this = self;
        this.retry
            .run(&operation, move || {
                this.add_product_attempt(aggregate_id, product_id, quantity, unit_price_cents)
            })
            .await
    }

    async fn add_product_attempt(
        &self,
        aggregate_id: &str,
        product_id: &str,
        quantity: i64,
        unit_price_cents: Option<i64>,
    ) -> DbResult<Vec<LineItem>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let header = queries::fetch_header(&mut *tx, aggregate_id).await?;
        ensure_editable(&header)?;

        let product = queries::fetch_product(&mut *tx, product_id).await?;
        let price = unit_price_cents.unwrap_or(product.default_sale_price_cents);
        validate_sale_price(&product, price)?;

        let bound = queries::fetch_items(&mut *tx, aggregate_id).await?;
        let mut lots = queries::fetch_active_lots(&mut *tx, product_id).await?;
        for lot in &mut lots {
            let claimed: i64 = bound
                .iter()
                .filter(|i| i.lot_id.as_deref() == Some(lot.id.as_str()))
                .map(|i| i.quantity)
                .sum();
            lot.remaining_quantity = (lot.remaining_quantity - claimed).max(0);
            lot.status = LotStatus::for_remaining(lot.remaining_quantity);
        }

        let allocations = select_lots(product_id, &lots, quantity)?;
        let items = materialize(aggregate_id, product_id, quantity, price, &allocations, now)?;

        for item in &items {
            queries::insert_item(&mut *tx, item).await?;
        }
        queries::apply_totals_delta(&mut *tx, aggregate_id, TotalsDelta::added(&items), now).await?;

        tx.commit().await?;

        debug!(
            aggregate_id,
            product_id,
            quantity,
            lots = items.len(),
            "Product added"
        );
        Ok(items)
    }

    /// Changes the quantity and price of a line item.
    ///
    /// A lot-bound item is checked against that lot's remaining stock minus
    /// what other items of the same aggregate claim from it.
    pub async fn update_item(&self, item_id: &str, quantity: i64, unit_price_cents: i64) -> DbResult<LineItem> {
        validate_quantity(quantity)?;

        let operation = format!("update item {item_id}");
        let this = self;
        this.retry
            .run(&operation, move || this.update_item_attempt(item_id, quantity, unit_price_cents))
            .await
    }

    async fn update_item_attempt(&self, item_id: &str, quantity: i64, unit_price_cents: i64) -> DbResult<LineItem> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let old = queries::fetch_item(&mut *tx, item_id).await?;
        let header = queries::fetch_header(&mut *tx, &old.aggregate_id).await?;
        ensure_editable(&header)?;

        let product = queries::fetch_product(&mut *tx, &old.product_id).await?;
        validate_sale_price(&product, unit_price_cents)?;

        let siblings = queries::fetch_items(&mut *tx, &old.aggregate_id).await?;
        let others = siblings.iter().filter(|i| i.id != old.id);
        let (available, lot_id) = match &old.lot_id {
            Some(lot_id) => {
                let lot = queries::find_lot(&mut *tx, lot_id)
                    .await?
                    .ok_or_else(|| DbError::not_found("Lot", lot_id))?;
                let claimed: i64 = others
                    .filter(|i| i.lot_id.as_deref() == Some(lot_id.as_str()))
                    .map(|i| i.quantity)
                    .sum();
                let remaining = if lot.is_available() { lot.remaining_quantity } else { 0 };
                (remaining - claimed, Some(lot_id.clone()))
            }
            None => {
                let claimed: i64 = others
                    .filter(|i| i.product_id == old.product_id)
                    .map(|i| i.quantity)
                    .sum();
                (product.stock_actual - claimed, None)
            }
        };
        if available < quantity {
            return Err(CoreError::InsufficientStock {
                product_id: old.product_id.clone(),
                lot_id,
                available: available.max(0),
                requested: quantity,
            }
            .into());
        }

        let mut new = old.clone();
        new.quantity = quantity;
        new.unit_price_cents = unit_price_cents;
        new.recompute()?;

        sqlx::query(
            r#"
            UPDATE line_items SET
                quantity = ?2,
                unit_price_cents = ?3,
                subtotal_cents = ?4,
                unit_profit_cents = ?5,
                total_profit_cents = ?6
            WHERE id = ?1
            "#,
        )
        .bind(&new.id)
        .bind(new.quantity)
        .bind(new.unit_price_cents)
        .bind(new.subtotal_cents)
        .bind(new.unit_profit_cents)
        .bind(new.total_profit_cents)
        .execute(&mut *tx)
        .await?;
        queries::apply_totals_delta(&mut *tx, &new.aggregate_id, TotalsDelta::replaced(&old, &new), now)
            .await?;

        tx.commit().await?;
        Ok(new)
    }

    /// Deletes a line item.
    pub async fn remove_item(&self, item_id: &str) -> DbResult<()> {
        let operation = format!("remove item {item_id}");
        let this = self;
        this.retry
            .run(&operation, move || this.remove_item_attempt(item_id))
            .await
    }

    async fn remove_item_attempt(&self, item_id: &str) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let item = queries::fetch_item(&mut *tx, item_id).await?;
        let header = queries::fetch_header(&mut *tx, &item.aggregate_id).await?;
        ensure_editable(&header)?;

        sqlx::query("DELETE FROM line_items WHERE id = ?1")
            .bind(&item.id)
            .execute(&mut *tx)
            .await?;
        queries::apply_totals_delta(&mut *tx, &item.aggregate_id, TotalsDelta::removed(&item), now).await?;

        tx.commit().await?;
        debug!(item_id, aggregate_id = %item.aggregate_id, "Line item removed");
        Ok(())
    }

    /// `borrador → pendiente`.
    pub async fn submit(&self, id: &str) -> DbResult<AggregateHeader> {
        self.transition(id, AggregateStatus::Pending).await
    }

    /// `pendiente → cancelada`. No stock effect.
    pub async fn cancel(&self, id: &str) -> DbResult<AggregateHeader> {
        self.transition(id, AggregateStatus::Cancelled).await
    }

    async fn transition(&self, id: &str, to: AggregateStatus) -> DbResult<AggregateHeader> {
        let operation = format!("move {id} to {}", to.as_str());
        let this = self;
        let header = this
            .retry
            .run(&operation, move || this.transition_attempt(id, to))
            .await?;
        info!(id, status = to.as_str(), "Aggregate status changed");
        Ok(header)
    }

    async fn transition_attempt(&self, id: &str, to: AggregateStatus) -> DbResult<AggregateHeader> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut header = queries::fetch_header(&mut *tx, id).await?;
        if !header.kind.is_confirmable() {
            return Err(ValidationError::Mismatch {
                field: "aggregate kind".to_string(),
                expected: "cotizacion or credito".to_string(),
                actual: header.kind.as_str().to_string(),
            }
            .into());
        }
        let from = header.status;
        header.status = from.transition(to, id)?;
        header.updated_at = now;

        set_status(&mut *tx, id, from, to, now).await?;
        tx.commit().await?;
        Ok(header)
    }

    /// Recomputes header totals from live items.
    ///
    /// On drift the header is repaired and a warning is logged.
    pub async fn recompute_totals(&self, id: &str) -> DbResult<TotalsReconciliation> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let header = queries::fetch_header(&mut *tx, id).await?;
        let items = queries::fetch_items(&mut *tx, id).await?;

        let reconciliation = TotalsReconciliation {
            stored: HeaderTotals::of(&header),
            live: HeaderTotals::recompute(&items),
        };

        if reconciliation.drifted() {
            let drift = reconciliation.stored.drift_from(&reconciliation.live);
            warn!(
                id,
                stored_total = reconciliation.stored.total_cents,
                live_total = reconciliation.live.total_cents,
                drift_total = drift.total_cents,
                drift_profit = drift.profit_cents,
                "Header totals drifted from line items, repairing"
            );
            sqlx::query(
                r#"
                UPDATE aggregates SET total_cents = ?2, profit_cents = ?3, updated_at = ?4
                WHERE id = ?1
                "#,
            )
            .bind(id)
            .bind(reconciliation.live.total_cents)
            .bind(reconciliation.live.profit_cents)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(reconciliation)
    }
}

/// Line items may only change on an open quotation or credit.
fn ensure_editable(header: &AggregateHeader) -> DbResult<()> {
    if header.kind.is_confirmable() && header.status.is_editable() {
        return Ok(());
    }
    Err(ValidationError::Mismatch {
        field: format!("aggregate {} state", header.id),
        expected: "open cotizacion or credito".to_string(),
        actual: format!("{} {}", header.status.as_str(), header.kind.as_str()),
    }
    .into())
}

/// Compare-and-set status write.
async fn set_status(
    conn: &mut SqliteConnection,
    id: &str,
    from: AggregateStatus,
    to: AggregateStatus,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE aggregates SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2")
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::conflict(format!("aggregate {id} status changed")));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::lot::LotIntake;
    use crate::{Database, DbConfig};
    use kardex_core::Product;

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        db.products()
            .insert(&Product {
                id: "ACEITE".to_string(),
                name: "Aceite 20W50".to_string(),
                brand: None,
                color: None,
                size: Some("1L".to_string()),
                location_code: None,
                stock_actual: 0,
                default_cost_cents: 0,
                min_sale_price_cents: 900,
                default_sale_price_cents: 1200,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        for (qty, cost) in [(3, 700), (5, 800)] {
            db.lots()
                .receive(&LotIntake {
                    product_id: "ACEITE".to_string(),
                    quantity: qty,
                    unit_cost_cents: cost,
                    received_at: None,
                })
                .await
                .unwrap();
        }
        db
    }

    #[tokio::test]
    async fn test_add_product_splits_and_accumulates() {
        let db = setup().await;
        let q = db.quotations().create(AggregateKind::Quotation, None).await.unwrap();

        let items = db.quotations().add_product(&q.id, "ACEITE", 4, None).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, 3);
        assert_eq!(items[0].unit_cost_cents, 700);

        let header = db.quotations().get(&q.id).await.unwrap();
        assert_eq!(header.total_cents, 4 * 1200);
        assert_eq!(header.profit_cents, 3 * 500 + 400);

        // Stock is untouched until confirmation.
        let product = db.products().get_by_id("ACEITE").await.unwrap().unwrap();
        assert_eq!(product.stock_actual, 8);
    }

    #[tokio::test]
    async fn test_add_product_respects_own_claims() {
        let db = setup().await;
        let q = db.quotations().create(AggregateKind::Quotation, None).await.unwrap();
        db.quotations().add_product(&q.id, "ACEITE", 3, None).await.unwrap();

        // The first lot is fully bound already; the next line goes to lot 2.
        let items = db.quotations().add_product(&q.id, "ACEITE", 2, None).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit_cost_cents, 800);

        let err = db.quotations().add_product(&q.id, "ACEITE", 4, None).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InsufficientStock { available: 3, requested: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_price_floor() {
        let db = setup().await;
        let q = db.quotations().create(AggregateKind::Quotation, None).await.unwrap();
        let err = db.quotations().add_product(&q.id, "ACEITE", 1, Some(899)).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::Validation(ValidationError::BelowMinimum { .. }))
        ));
    }

    #[tokio::test]
    async fn test_update_and_remove_keep_header_consistent() {
        let db = setup().await;
        let q = db.quotations().create(AggregateKind::Quotation, None).await.unwrap();
        let items = db.quotations().add_product(&q.id, "ACEITE", 4, None).await.unwrap();

        db.quotations().update_item(&items[1].id, 5, 1000).await.unwrap();
        db.quotations().remove_item(&items[0].id).await.unwrap();

        let header = db.quotations().get(&q.id).await.unwrap();
        assert_eq!(header.total_cents, 5000);
        assert_eq!(header.profit_cents, 5 * 200);

        let check = db.quotations().recompute_totals(&q.id).await.unwrap();
        assert!(!check.drifted());
    }

    #[tokio::test]
    async fn test_update_item_checks_lot_stock() {
        let db = setup().await;
        let q = db.quotations().create(AggregateKind::Quotation, None).await.unwrap();
        let items = db.quotations().add_product(&q.id, "ACEITE", 2, None).await.unwrap();

        let err = db.quotations().update_item(&items[0].id, 4, 1200).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InsufficientStock { available: 3, requested: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_recompute_repairs_drift() {
        let db = setup().await;
        let q = db.quotations().create(AggregateKind::Quotation, None).await.unwrap();
        db.quotations().add_product(&q.id, "ACEITE", 1, None).await.unwrap();

        sqlx::query("UPDATE aggregates SET total_cents = 1 WHERE id = ?1")
            .bind(&q.id)
            .execute(db.pool())
            .await
            .unwrap();

        let check = db.quotations().recompute_totals(&q.id).await.unwrap();
        assert!(check.drifted());
        assert_eq!(check.stored.total_cents, 1);
        assert_eq!(check.live.total_cents, 1200);
        assert_eq!(db.quotations().get(&q.id).await.unwrap().total_cents, 1200);
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let db = setup().await;
        let q = db.quotations().create(AggregateKind::Quotation, None).await.unwrap();

        assert!(db.quotations().cancel(&q.id).await.is_err());
        assert_eq!(
            db.quotations().submit(&q.id).await.unwrap().status,
            AggregateStatus::Pending
        );
        assert_eq!(
            db.quotations().cancel(&q.id).await.unwrap().status,
            AggregateStatus::Cancelled
        );
        assert!(db.quotations().add_product(&q.id, "ACEITE", 1, None).await.is_err());
    }

    #[tokio::test]
    async fn test_credit_needs_customer_and_sales_are_not_created() {
        let db = setup().await;
        assert!(db.quotations().create(AggregateKind::Credit, None).await.is_err());
        assert!(db.quotations().create(AggregateKind::Sale, Some("C1")).await.is_err());
        assert!(db.quotations().create(AggregateKind::Credit, Some("C1")).await.is_ok());
    }
}
