//! # Seed Data Generator
//!
//! Populates the store with a demo parts catalogue and its lots.
//!
//! ## Usage
//! ```bash
//! # Uses KARDEX_DB_PATH (default ./kardex.db)
//! cargo run -p kardex-db --bin seed
//!
//! # Specify database path
//! cargo run -p kardex-db --bin seed -- --db ./data/kardex.db
//!
//! # More log detail
//! RUST_LOG=debug cargo run -p kardex-db --bin seed
//! ```
//!
//! ## Generated Data
//! The catalogue is written as store documents (Spanish camelCase keys,
//! prices in major units) and decoded through `kardex_core::document`, the
//! same path records imported from the legacy store take. Each product gets
//! two or three lots received on different days, so FIFO order and the
//! head-cost figure are visible straight away.

use chrono::{Duration, Utc};
use kardex_core::document::{decode_lot, decode_product};
use kardex_db::{Database, DbConfig, LotIntake};
use serde_json::{json, Value};
use std::env;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Demo catalogue: `(id, product document, [(quantity, unit cost, days ago)])`.
fn catalogue() -> Vec<(&'static str, Value, Vec<(i64, f64, i64)>)> {
    vec![
        (
            "FILTRO-01",
            json!({
                "nombre": "Filtro de aceite",
                "marca": "Fram",
                "ubicacion": "A-03",
                "precioVentaMinimo": 12.0,
                "precioVentaDefault": 15.5,
            }),
            vec![(12, 8.5, 40), (20, 9.1, 12)],
        ),
        (
            "BUJIA-NGK",
            json!({
                "nombre": "Bujía iridium",
                "marca": "NGK",
                "ubicacion": "A-07",
                "precioVentaMinimo": "6.00",
                "precioVentaDefault": "7.50",
            }),
            vec![(40, 4.2, 60), (40, 4.35, 30), (24, 4.6, 2)],
        ),
        (
            "PASTILLA-DEL",
            json!({
                "nombre": "Pastillas de freno delanteras",
                "marca": "Brembo",
                "ubicacion": "B-12",
                "precioVentaMinimo": 38,
                "precioVentaDefault": 45,
            }),
            vec![(6, 27.0, 25), (10, 28.75, 5)],
        ),
        (
            "CASCO-M",
            json!({
                "nombre": "Casco integral",
                "marca": "LS2",
                "color": "Negro mate",
                "talla": "M",
                "ubicacion": "C-01",
                "precioVentaMinimo": 90,
                "precioVentaDefault": 110,
            }),
            vec![(3, 68.0, 90), (4, 71.5, 15)],
        ),
        (
            "ACEITE-20W50",
            json!({
                "nombre": "Aceite 20W50 1L",
                "marca": "Castrol",
                "ubicacion": "A-01",
                "precioVentaMinimo": 7.25,
                "precioVentaDefault": 8.9,
            }),
            vec![(48, 5.1, 45), (48, 5.3, 20), (24, 5.45, 1)],
        ),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,kardex=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut config = DbConfig::from_env()?;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.database_path = args[i + 1].clone().into();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kardex POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: $KARDEX_DB_PATH or ./kardex.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => warn!(argument = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    info!(path = %config.database_path.display(), "Seeding database");
    let db = Database::new(config).await?;

    let existing = db.products().list(1).await?;
    if !existing.is_empty() {
        warn!("Database already has products, skipping seed to avoid duplicates");
        return Ok(());
    }

    let now = Utc::now();
    let mut products = 0;
    let mut lots = 0;

    for (id, doc, deliveries) in catalogue() {
        let product = decode_product(id, &doc)?;
        if let Err(e) = db.products().insert(&product).await {
            error!(product_id = id, error = %e, "Failed to insert product");
            continue;
        }
        products += 1;

        for (n, (quantity, cost, days_ago)) in deliveries.into_iter().enumerate() {
            let lot_doc = json!({
                "productoId": id,
                "fechaIngreso": (now - Duration::days(days_ago)).to_rfc3339(),
                "cantidadOriginal": quantity,
                "stockRestante": quantity,
                "precioCompraUnitario": cost,
            });
            let lot = decode_lot(&format!("{id}-L{}", n + 1), &lot_doc)?;

            db.lots()
                .receive(&LotIntake {
                    product_id: lot.product_id,
                    quantity: lot.original_quantity,
                    unit_cost_cents: lot.unit_cost_cents,
                    received_at: Some(lot.received_at),
                })
                .await?;
            lots += 1;
        }
    }

    for product in db.products().list(100).await? {
        info!(
            product_id = %product.id,
            stock = product.stock_actual,
            head_cost = %product.default_cost(),
            price = %product.default_sale_price(),
            "Seeded"
        );
    }
    info!(products, lots, "Seed complete");

    Ok(())
}
