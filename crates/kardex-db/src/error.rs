//! # Database Error Types
//!
//! Error types for store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          Ledger rule (CoreError)           │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  DbError (this module) ← categorized, busy/locked → Conflict           │
//! │       │                                                                 │
//! │       ├── Conflict ──► transaction runner retries from the read phase  │
//! │       │                   │                                             │
//! │       │                   └── attempts exhausted ──► ConflictRetryExhausted
//! │       ▼                                                                 │
//! │  Caller                                                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use kardex_core::CoreError;
use thiserror::Error;

/// Store operation errors.
///
/// These errors wrap sqlx errors and ledger rule violations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting a product or lot id twice
    /// - A second movement for the same (transaction, lot) pair
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation {
        field: String,
        value: String,
    },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Referencing a non-existent product_id, lot_id or aggregate_id
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation {
        message: String,
    },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Another writer got there first.
    ///
    /// ## When This Occurs
    /// - SQLite reports the database busy or locked
    /// - A compare-and-set write finds a value other than the one read
    ///
    /// Retryable: the transaction runner re-executes from the read phase.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// A transaction kept conflicting.
    #[error("{operation} still conflicting after {attempts} attempts")]
    ConflictRetryExhausted {
        operation: String,
        attempts: u32,
    },

    /// A ledger rule rejected the operation. Nothing was written.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    ///
    /// Missing rows surface as `Core(CoreError::NotFound)`, the same shape
    /// the confirmation planner uses for records absent from its snapshot.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::Core(CoreError::not_found(entity, id))
    }

    /// Creates a Conflict error.
    pub fn conflict(reason: impl Into<String>) -> Self {
        DbError::Conflict(reason.into())
    }

    /// Whether the transaction runner may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Conflict(_))
    }

    /// The ledger rule violation, if that is what this is.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            DbError::Core(err) => Some(err),
            _ => None,
        }
    }
}

/// SQLite primary result codes for a busy or locked database.
///
/// ```text
/// 5    SQLITE_BUSY
/// 6    SQLITE_LOCKED
/// 517  SQLITE_BUSY_SNAPSHOT   (WAL reader upgraded to writer too late)
/// 262  SQLITE_LOCKED_SHAREDCACHE
/// ```
const BUSY_CODES: &[&str] = &["5", "6", "517", "262"];

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::Core(CoreError::NotFound)
/// sqlx::Error::Database       → busy/locked → Conflict, else constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let busy = db_err
                    .code()
                    .map(|code| BUSY_CODES.iter().any(|busy| code == *busy))
                    .unwrap_or(false);

                if busy || msg.contains("is locked") {
                    DbError::Conflict(msg.to_string())
                } else if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<kardex_core::ValidationError> for DbError {
    fn from(err: kardex_core::ValidationError) -> Self {
        DbError::Core(CoreError::Validation(err))
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(DbError::conflict("lot L1 changed").is_retryable());
        assert!(!DbError::PoolExhausted.is_retryable());
        assert!(!DbError::from(CoreError::not_found("Lot", "L1")).is_retryable());
    }

    #[test]
    fn test_not_found_has_one_shape() {
        let from_store = DbError::not_found("Aggregate", "COT-1");
        let from_plan = DbError::from(CoreError::not_found("Aggregate", "COT-1"));
        assert_eq!(from_store.as_core(), from_plan.as_core());
        assert!(matches!(
            DbError::from(sqlx::Error::RowNotFound),
            DbError::Core(CoreError::NotFound { .. })
        ));
        assert_eq!(from_store.to_string(), "Aggregate not found: COT-1");
    }

    #[test]
    fn test_core_errors_pass_through() {
        let err = DbError::from(CoreError::InsufficientStock {
            product_id: "P".to_string(),
            lot_id: None,
            available: 2,
            requested: 5,
        });
        assert_eq!(err.as_core().map(CoreError::shortfall), Some(3));
        assert!(err.to_string().contains("available 2, requested 5"));
    }

    #[test]
    fn test_exhausted_message() {
        let err = DbError::ConflictRetryExhausted {
            operation: "confirm Q1".to_string(),
            attempts: 5,
        };
        assert_eq!(err.to_string(), "confirm Q1 still conflicting after 5 attempts");
    }
}
