//! # Store Database Errors
//!
//! Every repository returns [`DbResult`]. SQLite failures are sorted into the
//! handful of cases the register reacts to differently; everything else
//! collapses into `QueryFailed` or `Internal`.
//!
//! ```text
//!   sqlx::Error ─────┐
//!   csv::Error ──────┼──► DbError ──► ApiError (register) ──► shell output
//!   std::io::Error ──┘
//! ```

use sqlx::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A second customer with the same phone, or a reused sale id.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// A sale line or refund row pointing at a missing parent.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A stock delta would drive stock below zero.
    #[error("Stock for {barcode} cannot change by {delta}: only {available} on hand")]
    StockUnderflow {
        barcode: String,
        delta: i64,
        available: i64,
    },

    /// A guarded update found the row already changed, e.g. a sale that
    /// another refund already processed.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The file could not be opened or created.
    #[error("Cannot open database: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Every connection stayed busy past the acquire timeout.
    #[error("Database busy: no connection available")]
    PoolExhausted,

    /// Reading or writing a legacy file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A legacy file could not be parsed.
    #[error("Import failed at line {line}: {message}")]
    Import { line: u64, message: String },

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Repositories call this to put the offending value back into a
    /// constraint error, which SQLite does not report.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Row", "?"),
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.kind() {
                    // "UNIQUE constraint failed: customers.phone"
                    ErrorKind::UniqueViolation => DbError::UniqueViolation {
                        field: message
                            .rsplit(": ")
                            .next()
                            .unwrap_or("value")
                            .to_string(),
                        value: "?".to_string(),
                    },
                    ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation { message },
                    _ => DbError::QueryFailed(message),
                }
            }
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("database is closed".to_string()),
            sqlx::Error::Io(e) => DbError::ConnectionFailed(e.to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Malformed rows are reported with their line number.
impl From<csv::Error> for DbError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        let message = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(io) => DbError::Io(io),
            _ => DbError::Import { line, message },
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            DbError::not_found("Sale", "abc").to_string(),
            "Sale not found: abc"
        );
        assert_eq!(
            DbError::StockUnderflow {
                barcode: "1001".to_string(),
                delta: -5,
                available: 3
            }
            .to_string(),
            "Stock for 1001 cannot change by -5: only 3 on hand"
        );
    }
}
