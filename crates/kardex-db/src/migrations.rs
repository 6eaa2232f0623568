//! # Database Migrations
//!
//! Embedded SQL migrations for the ledger store.
//!
//! ## Schema Guards
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lots        CHECK (status = 'agotado') = (remaining_quantity = 0)     │
//! │              trigger lots_no_delete        lots are never deleted      │
//! │  movements   PRIMARY KEY "{transaction}:{lot}"   one per pair          │
//! │              triggers movements_no_update / movements_no_delete        │
//! │  products    CHECK stock_actual >= 0                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `migrations/sqlite/` with the next sequence number
//! 2. Name format: `NNN_description.sql`
//! 3. **NEVER** modify existing migrations - always add new ones

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the `migrations/sqlite` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending database migrations.
///
/// Idempotent; each migration runs in its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!(embedded = MIGRATOR.migrations.len(), "Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)` for diagnostics.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    // No bookkeeping table yet means nothing was applied.
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}
