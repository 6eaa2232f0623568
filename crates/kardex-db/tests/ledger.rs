//! End-to-end ledger scenarios against a real SQLite store.

use chrono::{Duration, TimeZone, Utc};
use kardex_core::document::decode_line_item;
use kardex_core::{
    AggregateHeader, AggregateKind, AggregateStatus, CoreError, LotStatus, Movement, MovementKind,
    PaymentInput, PaymentMethod, PaymentStatus, Product,
};
use kardex_db::{Database, DbConfig, DbError, LotIntake};
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

// =============================================================================
// Fixtures
// =============================================================================

fn product(id: &str, min: i64, price: i64) -> Product {
    let now = Utc::now();
    Product {
        id: id.to_string(),
        name: format!("Repuesto {id}"),
        brand: None,
        color: None,
        size: None,
        location_code: None,
        stock_actual: 0,
        default_cost_cents: 0,
        min_sale_price_cents: min,
        default_sale_price_cents: price,
        created_at: now,
        updated_at: now,
    }
}

async fn stock(db: &Database, product_id: &str, lots: &[(i64, i64)]) {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    for (n, (qty, cost)) in lots.iter().enumerate() {
        db.lots()
            .receive(&LotIntake {
                product_id: product_id.to_string(),
                quantity: *qty,
                unit_cost_cents: *cost,
                received_at: Some(base + Duration::days(n as i64)),
            })
            .await
            .unwrap();
    }
}

async fn memory_db() -> Database {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    db.products().insert(&product("CADENA-428", 2000, 2500)).await.unwrap();
    db
}

async fn quote(db: &Database, kind: AggregateKind, customer: Option<&str>, qty: i64) -> AggregateHeader {
    let header = db.quotations().create(kind, customer).await.unwrap();
    db.quotations()
        .add_product(&header.id, "CADENA-428", qty, None)
        .await
        .unwrap();
    header
}

/// File-backed store so several connections can race.
struct FileDb {
    path: PathBuf,
}

impl FileDb {
    fn new() -> Self {
        FileDb {
            path: std::env::temp_dir().join(format!("kardex-test-{}.db", Uuid::new_v4())),
        }
    }

    fn config(&self) -> DbConfig {
        DbConfig::new(&self.path)
            .max_connections(4)
            .max_transaction_attempts(20)
            .retry_backoff(std::time::Duration::from_millis(2))
    }
}

impl Drop for FileDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn fifo_split_consumes_oldest_lot_first() {
    let db = memory_db().await;
    stock(&db, "CADENA-428", &[(3, 1500), (5, 1700)]).await;
    let q = quote(&db, AggregateKind::Quotation, None, 5).await;

    let outcome = db.ledger().confirm(&q.id, &[]).await.unwrap();

    let mut quantities: Vec<(i64, i64)> = outcome
        .movements
        .iter()
        .map(|m| (m.unit_cost_cents, m.quantity))
        .collect();
    quantities.sort();
    assert_eq!(quantities, vec![(1500, 3), (1700, 2)]);
    assert_eq!(outcome.sale.total_cents, 5 * 2500);
    assert_eq!(outcome.sale.profit_cents, 3 * 1000 + 2 * 800);

    let audit = db.movements().for_aggregate(&outcome.sale_id).await.unwrap();
    assert_eq!(audit.len(), 2);
    for movement in &audit {
        assert_eq!(movement.kind, MovementKind::Consumption);
        assert_eq!(movement.id, Movement::id_for(&outcome.sale_id, &movement.lot_id));
    }
}

#[tokio::test]
async fn depleting_a_lot_moves_the_head_cost() {
    let db = memory_db().await;
    stock(&db, "CADENA-428", &[(2, 1500), (4, 1800)]).await;
    assert_eq!(
        db.products().get_by_id("CADENA-428").await.unwrap().unwrap().default_cost_cents,
        1500
    );

    let q = quote(&db, AggregateKind::Quotation, None, 2).await;
    db.ledger().confirm(&q.id, &[]).await.unwrap();

    let lots = db.lots().list_for_product("CADENA-428").await.unwrap();
    assert_eq!(lots[0].status, LotStatus::Depleted);
    assert_eq!(lots[0].remaining_quantity, 0);
    assert_eq!(lots[1].status, LotStatus::Active);

    let product = db.products().get_by_id("CADENA-428").await.unwrap().unwrap();
    assert_eq!(product.stock_actual, 4);
    assert_eq!(product.default_cost_cents, 1800);

    let q = quote(&db, AggregateKind::Quotation, None, 4).await;
    db.ledger().confirm(&q.id, &[]).await.unwrap();
    let product = db.products().get_by_id("CADENA-428").await.unwrap().unwrap();
    assert_eq!(product.stock_actual, 0);
    assert_eq!(product.default_cost_cents, 0);
    assert!(db.lots().list_active("CADENA-428").await.unwrap().is_empty());
}

#[tokio::test]
async fn imported_unbound_items_resolve_through_fifo() {
    let db = memory_db().await;
    stock(&db, "CADENA-428", &[(2, 1500), (6, 1700)]).await;
    let q = db.quotations().create(AggregateKind::Quotation, None).await.unwrap();

    // A legacy document with no lot assigned yet.
    let item = decode_line_item(
        "legacy-1",
        &q.id,
        &json!({ "productoId": "CADENA-428", "loteId": "", "cantidad": "5", "precioVenta": 25 }),
    )
    .unwrap();
    assert!(item.lot_id.is_none());
    sqlx::query(
        "INSERT INTO line_items (id, aggregate_id, product_id, lot_id, quantity, unit_price_cents, \
         subtotal_cents, unit_cost_cents, unit_profit_cents, total_profit_cents, created_at) \
         VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )
    .bind(&item.id)
    .bind(&item.aggregate_id)
    .bind(&item.product_id)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.subtotal_cents)
    .bind(item.unit_cost_cents)
    .bind(item.unit_profit_cents)
    .bind(item.total_profit_cents)
    .bind(item.created_at)
    .execute(db.pool())
    .await
    .unwrap();

    let outcome = db.ledger().confirm(&q.id, &[]).await.unwrap();
    assert_eq!(outcome.sale_items.len(), 2);
    assert!(outcome.sale_items.iter().all(|i| i.lot_id.is_some()));
    assert_eq!(outcome.sale_items.iter().map(|i| i.quantity).sum::<i64>(), 5);
    assert_eq!(outcome.sale.total_cents, 12500);
}

#[tokio::test]
async fn preview_then_confirm_agree() {
    let db = memory_db().await;
    stock(&db, "CADENA-428", &[(3, 1500), (5, 1700)]).await;
    let q = quote(&db, AggregateKind::Quotation, None, 4).await;

    let preview = db.ledger().preview_confirmation(&q.id, &[]).await.unwrap();
    let preview_again = db.ledger().preview_confirmation(&q.id, &[]).await.unwrap();
    assert_eq!(preview.lot_updates, preview_again.lot_updates);
    assert_eq!(preview.product_updates, preview_again.product_updates);

    let outcome = db.ledger().confirm(&q.id, &[]).await.unwrap();
    assert_eq!(outcome.sale.total_cents, preview.sale.total_cents);
    assert_eq!(outcome.movements.len(), preview.movements.len());
    assert!(db
        .movements()
        .for_aggregate(&preview.sale.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn terminal_aggregates_reject_edits_and_confirmation() {
    let db = memory_db().await;
    stock(&db, "CADENA-428", &[(10, 1500)]).await;

    let confirmed = quote(&db, AggregateKind::Quotation, None, 1).await;
    db.ledger().confirm(&confirmed.id, &[]).await.unwrap();
    assert!(db
        .quotations()
        .add_product(&confirmed.id, "CADENA-428", 1, None)
        .await
        .is_err());

    let cancelled = quote(&db, AggregateKind::Quotation, None, 1).await;
    db.quotations().submit(&cancelled.id).await.unwrap();
    db.quotations().cancel(&cancelled.id).await.unwrap();
    let err = db.ledger().confirm(&cancelled.id, &[]).await.unwrap_err();
    assert!(matches!(
        err,
        DbError::Core(CoreError::InvalidStatusTransition { .. })
    ));

    let product = db.products().get_by_id("CADENA-428").await.unwrap().unwrap();
    assert_eq!(product.stock_actual, 9);
}

#[tokio::test]
async fn audit_rows_are_append_only() {
    let db = memory_db().await;
    stock(&db, "CADENA-428", &[(1, 1500)]).await;
    let lot = &db.lots().list_active("CADENA-428").await.unwrap()[0];

    assert!(sqlx::query("DELETE FROM lots WHERE id = ?1")
        .bind(&lot.id)
        .execute(db.pool())
        .await
        .is_err());
    assert!(sqlx::query("UPDATE movements SET quantity = 99 WHERE lot_id = ?1")
        .bind(&lot.id)
        .execute(db.pool())
        .await
        .is_err());
    assert!(sqlx::query("DELETE FROM movements")
        .execute(db.pool())
        .await
        .is_err());
}

#[tokio::test]
async fn credit_balance_follows_active_payments() {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    db.products().insert(&product("CADENA-428", 8000, 10000)).await.unwrap();
    stock(&db, "CADENA-428", &[(5, 7000)]).await;

    let credit = quote(&db, AggregateKind::Credit, Some("CLI-1"), 1).await;
    db.ledger().confirm(&credit.id, &[]).await.unwrap();
    assert_eq!(db.credits().outstanding_balance("CLI-1").await.unwrap().cents(), 10000);

    let payment = db
        .credits()
        .register_payment(&credit.id, 4000, PaymentMethod::Cash)
        .await
        .unwrap();
    assert_eq!(db.credits().outstanding_balance("CLI-1").await.unwrap().cents(), 6000);

    db.credits()
        .set_payment_status(&payment.id, PaymentStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(db.credits().outstanding_balance("CLI-1").await.unwrap().cents(), 10000);

    // A quotation's payments settle the sale, not the customer's credits.
    let cash = quote(&db, AggregateKind::Quotation, Some("CLI-1"), 1).await;
    db.ledger()
        .confirm(
            &cash.id,
            &[PaymentInput {
                method: PaymentMethod::Card,
                amount_cents: 10000,
            }],
        )
        .await
        .unwrap();
    assert_eq!(db.credits().outstanding_balance("CLI-1").await.unwrap().cents(), 10000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_confirmations_never_oversell() {
    let file = FileDb::new();
    let db = Database::new(file.config()).await.unwrap();
    db.products().insert(&product("CADENA-428", 2000, 2500)).await.unwrap();
    stock(&db, "CADENA-428", &[(5, 1500)]).await;

    let first = quote(&db, AggregateKind::Quotation, None, 4).await;
    let second = quote(&db, AggregateKind::Quotation, None, 4).await;

    let (left, right) = (db.ledger(), db.ledger());
    let (a, b) = tokio::join!(left.confirm(&first.id, &[]), right.confirm(&second.id, &[]));

    let (won, lost) = match (a, b) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        (a, b) => panic!("expected exactly one confirmation to commit: {a:?} / {b:?}"),
    };
    assert_eq!(won.movements.len(), 1);
    assert!(matches!(
        lost,
        DbError::Core(CoreError::InsufficientStock { .. })
    ));

    let lots = db.lots().list_for_product("CADENA-428").await.unwrap();
    assert_eq!(lots[0].remaining_quantity, 1);
    let product = db.products().get_by_id("CADENA-428").await.unwrap().unwrap();
    assert_eq!(product.stock_actual, 1);

    let statuses = [
        db.quotations().get(&first.id).await.unwrap().status,
        db.quotations().get(&second.id).await.unwrap().status,
    ];
    assert_eq!(
        statuses.iter().filter(|s| **s == AggregateStatus::Confirmed).count(),
        1
    );

    db.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_confirmations_racing_for_one_lot() {
    let file = FileDb::new();
    let db = Database::new(file.config()).await.unwrap();
    db.products().insert(&product("CADENA-428", 2000, 2500)).await.unwrap();
    stock(&db, "CADENA-428", &[(5, 1500), (4, 1600)]).await;

    // Every quotation binds its 3 units to the oldest lot.
    let mut quotes = Vec::new();
    for _ in 0..8 {
        quotes.push(quote(&db, AggregateKind::Quotation, None, 3).await);
    }

    let mut tasks = tokio::task::JoinSet::new();
    for q in &quotes {
        let ledger = db.ledger();
        let id = q.id.clone();
        tasks.spawn(async move { ledger.confirm(&id, &[]).await });
    }

    let mut committed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => committed += 1,
            Err(DbError::Core(CoreError::InsufficientStock {
                available, requested, ..
            })) => {
                assert_eq!(available, 2);
                assert_eq!(requested, 3);
            }
            Err(other) => panic!("unexpected failure: {other}"),
        }
    }
    assert_eq!(committed, 1);

    let remaining: Vec<i64> = db
        .lots()
        .list_for_product("CADENA-428")
        .await
        .unwrap()
        .iter()
        .map(|l| l.remaining_quantity)
        .collect();
    assert_eq!(remaining, vec![2, 4]);
    let product = db.products().get_by_id("CADENA-428").await.unwrap().unwrap();
    assert_eq!(product.stock_actual, 6);

    db.close().await;
}
