//! # Movement Repository
//!
//! Read-only access to the append-only stock audit trail. Movements are
//! written by intake and confirmation transactions only; triggers reject
//! updates and deletes.

use sqlx::SqlitePool;

use super::queries::SELECT_MOVEMENT;
use crate::error::DbResult;
use kardex_core::Movement;

/// Repository for movement reads.
#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    /// Creates a new MovementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }

    /// Movements written by one sale.
    pub async fn for_aggregate(&self, aggregate_id: &str) -> DbResult<Vec<Movement>> {
        let movements = sqlx::query_as::<_, Movement>(&format!(
            "{SELECT_MOVEMENT} WHERE aggregate_id = ?1 ORDER BY created_at, id"
        ))
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(movements)
    }

    /// Full history of one lot, intake first.
    pub async fn for_lot(&self, lot_id: &str) -> DbResult<Vec<Movement>> {
        let movements = sqlx::query_as::<_, Movement>(&format!(
            "{SELECT_MOVEMENT} WHERE lot_id = ?1 ORDER BY created_at, kind, id"
        ))
        .bind(lot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(movements)
    }
}
