//! Row-level reads and writes shared by the repositories.
//!
//! Every function takes a `&mut SqliteConnection` so it can run inside the
//! caller's transaction (`&mut *tx`).

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::error::{DbError, DbResult};
use kardex_core::{AggregateHeader, LineItem, Lot, Movement, Payment, Product, TotalsDelta};

pub(crate) const SELECT_PRODUCT: &str = r#"
    SELECT id, name, brand, color, size, location_code,
           stock_actual, default_cost_cents, min_sale_price_cents, default_sale_price_cents,
           created_at, updated_at
    FROM products
"#;

pub(crate) const SELECT_LOT: &str = r#"
    SELECT id, product_id, received_at, original_quantity, remaining_quantity,
           unit_cost_cents, status
    FROM lots
"#;

pub(crate) const SELECT_AGGREGATE: &str = r#"
    SELECT id, kind, status, customer_id, total_cents, profit_cents,
           source_id, confirmed_into, created_at, updated_at, confirmed_at
    FROM aggregates
"#;

pub(crate) const SELECT_LINE_ITEM: &str = r#"
    SELECT id, aggregate_id, product_id, lot_id, quantity, unit_price_cents,
           subtotal_cents, unit_cost_cents, unit_profit_cents, total_profit_cents,
           created_at
    FROM line_items
"#;

pub(crate) const SELECT_MOVEMENT: &str = r#"
    SELECT id, kind, aggregate_id, product_id, lot_id, quantity, unit_cost_cents,
           lot_remaining_after, created_at
    FROM movements
"#;

pub(crate) const SELECT_PAYMENT: &str = r#"
    SELECT id, aggregate_id, customer_id, amount_cents, method, status, created_at
    FROM payments
"#;

// =============================================================================
// Reads
// =============================================================================

pub(crate) async fn find_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(&format!("{SELECT_PRODUCT} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(product)
}

pub(crate) async fn fetch_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Product> {
    find_product(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Product", id))
}

pub(crate) async fn find_lot(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Lot>> {
    let lot = sqlx::query_as::<_, Lot>(&format!("{SELECT_LOT} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(lot)
}

/// Active lots of a product with stock left, oldest intake first.
pub(crate) async fn fetch_active_lots(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Vec<Lot>> {
    let lots = sqlx::query_as::<_, Lot>(&format!(
        "{SELECT_LOT} WHERE product_id = ?1 AND status = 'activo' AND remaining_quantity > 0 \
         ORDER BY received_at, id"
    ))
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(lots)
}

pub(crate) async fn find_header(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<AggregateHeader>> {
    let header = sqlx::query_as::<_, AggregateHeader>(&format!("{SELECT_AGGREGATE} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(header)
}

pub(crate) async fn fetch_header(conn: &mut SqliteConnection, id: &str) -> DbResult<AggregateHeader> {
    find_header(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Aggregate", id))
}

pub(crate) async fn fetch_items(conn: &mut SqliteConnection, aggregate_id: &str) -> DbResult<Vec<LineItem>> {
    let items = sqlx::query_as::<_, LineItem>(&format!(
        "{SELECT_LINE_ITEM} WHERE aggregate_id = ?1 ORDER BY created_at, id"
    ))
    .bind(aggregate_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

pub(crate) async fn fetch_item(conn: &mut SqliteConnection, id: &str) -> DbResult<LineItem> {
    sqlx::query_as::<_, LineItem>(&format!("{SELECT_LINE_ITEM} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("LineItem", id))
}

pub(crate) async fn fetch_payment(conn: &mut SqliteConnection, id: &str) -> DbResult<Payment> {
    sqlx::query_as::<_, Payment>(&format!("{SELECT_PAYMENT} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Payment", id))
}

pub(crate) async fn fetch_payments_for(conn: &mut SqliteConnection, aggregate_id: &str) -> DbResult<Vec<Payment>> {
    let payments = sqlx::query_as::<_, Payment>(&format!(
        "{SELECT_PAYMENT} WHERE aggregate_id = ?1 ORDER BY created_at, id"
    ))
    .bind(aggregate_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(payments)
}

// =============================================================================
// Writes
// =============================================================================

pub(crate) async fn insert_header(conn: &mut SqliteConnection, header: &AggregateHeader) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO aggregates (
            id, kind, status, customer_id, total_cents, profit_cents,
            source_id, confirmed_into, created_at, updated_at, confirmed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&header.id)
    .bind(header.kind)
    .bind(header.status)
    .bind(&header.customer_id)
    .bind(header.total_cents)
    .bind(header.profit_cents)
    .bind(&header.source_id)
    .bind(&header.confirmed_into)
    .bind(header.created_at)
    .bind(header.updated_at)
    .bind(header.confirmed_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn insert_item(conn: &mut SqliteConnection, item: &LineItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO line_items (
            id, aggregate_id, product_id, lot_id, quantity, unit_price_cents,
            subtotal_cents, unit_cost_cents, unit_profit_cents, total_profit_cents,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&item.id)
    .bind(&item.aggregate_id)
    .bind(&item.product_id)
    .bind(&item.lot_id)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.subtotal_cents)
    .bind(item.unit_cost_cents)
    .bind(item.unit_profit_cents)
    .bind(item.total_profit_cents)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn insert_movement(conn: &mut SqliteConnection, movement: &Movement) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO movements (
            id, kind, aggregate_id, product_id, lot_id, quantity, unit_cost_cents,
            lot_remaining_after, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&movement.id)
    .bind(movement.kind)
    .bind(&movement.aggregate_id)
    .bind(&movement.product_id)
    .bind(&movement.lot_id)
    .bind(movement.quantity)
    .bind(movement.unit_cost_cents)
    .bind(movement.lot_remaining_after)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, aggregate_id, customer_id, amount_cents, method, status, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.aggregate_id)
    .bind(&payment.customer_id)
    .bind(payment.amount_cents)
    .bind(payment.method)
    .bind(payment.status)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Applies a signed totals delta to a header. Must run in the transaction
/// that writes the matching line items.
pub(crate) async fn apply_totals_delta(
    conn: &mut SqliteConnection,
    aggregate_id: &str,
    delta: TotalsDelta,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE aggregates SET
            total_cents = total_cents + ?2,
            profit_cents = profit_cents + ?3,
            updated_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(aggregate_id)
    .bind(delta.total_cents)
    .bind(delta.profit_cents)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Aggregate", aggregate_id));
    }
    Ok(())
}
