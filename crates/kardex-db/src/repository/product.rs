//! # Product Repository
//!
//! Catalogue reads and writes.
//!
//! Stock and cost columns are ledger-owned: a new product always starts with
//! no stock and no cost, and only intakes and confirmations move them.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use super::queries::{self, SELECT_PRODUCT};
use crate::error::{DbError, DbResult};
use kardex_core::validation::{validate_id, validate_price_cents};
use kardex_core::Product;

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let filtro = repo.get_by_id("FILTRO-01").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Adds a product to the catalogue.
    ///
    /// `stock_actual` and `default_cost_cents` are ignored and stored as 0;
    /// receive a lot to stock the product.
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        validate_id("product id", &product.id)?;
        validate_price_cents("min_sale_price", product.min_sale_price_cents)?;
        validate_price_cents("default_sale_price", product.default_sale_price_cents)?;

        debug!(id = %product.id, name = %product.name, "Inserting product");

        let now = Utc::now();
        let stored = Product {
            stock_actual: 0,
            default_cost_cents: 0,
            created_at: now,
            updated_at: now,
            ..product.clone()
        };

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, brand, color, size, location_code,
                stock_actual, default_cost_cents, min_sale_price_cents, default_sale_price_cents,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.name)
        .bind(&stored.brand)
        .bind(&stored.color)
        .bind(&stored.size)
        .bind(&stored.location_code)
        .bind(stored.stock_actual)
        .bind(stored.default_cost_cents)
        .bind(stored.min_sale_price_cents)
        .bind(stored.default_sale_price_cents)
        .bind(stored.created_at)
        .bind(stored.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    /// Gets a product by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        queries::find_product(&mut conn, id).await
    }

    /// Lists products by name.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!("{SELECT_PRODUCT} ORDER BY name LIMIT ?1"))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Updates the sale prices of a product. Stock and cost stay untouched.
    pub async fn update_prices(
        &self,
        id: &str,
        min_sale_price_cents: i64,
        default_sale_price_cents: i64,
    ) -> DbResult<()> {
        validate_price_cents("min_sale_price", min_sale_price_cents)?;
        validate_price_cents("default_sale_price", default_sale_price_cents)?;

        let result = sqlx::query(
            r#"
            UPDATE products SET
                min_sale_price_cents = ?2,
                default_sale_price_cents = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(min_sale_price_cents)
        .bind(default_sale_price_cents)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};
    use chrono::Utc;
    use kardex_core::Product;

    fn product(id: &str) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            name: "Pastillas de freno".to_string(),
            brand: Some("Brembo".to_string()),
            color: None,
            size: None,
            location_code: Some("B-12".to_string()),
            stock_actual: 99,
            default_cost_cents: 1234,
            min_sale_price_cents: 2000,
            default_sale_price_cents: 2500,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_ignores_stock_fields() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let stored = db.products().insert(&product("FRENO-01")).await.unwrap();
        assert_eq!(stored.stock_actual, 0);

        let loaded = db.products().get_by_id("FRENO-01").await.unwrap().unwrap();
        assert_eq!(loaded.stock_actual, 0);
        assert_eq!(loaded.default_cost_cents, 0);
        assert_eq!(loaded.brand.as_deref(), Some("Brembo"));
    }

    #[tokio::test]
    async fn test_update_prices() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.products().insert(&product("FRENO-01")).await.unwrap();
        db.products().update_prices("FRENO-01", 1800, 2200).await.unwrap();

        let loaded = db.products().get_by_id("FRENO-01").await.unwrap().unwrap();
        assert_eq!(loaded.min_sale_price_cents, 1800);
        assert!(db.products().update_prices("NOPE", 1, 1).await.is_err());
        assert_eq!(db.products().list(10).await.unwrap().len(), 1);
    }
}
