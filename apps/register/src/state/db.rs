//! # Database State
//!
//! Wraps the `Database` connection for use in register commands.
//!
//! ## Thread Safety
//! The `Database` struct from `till-db` holds a `SqlitePool`, which is
//! internally synchronized. Commands can query concurrently without a lock.
//!
//! ## Usage in Commands
//! ```rust,ignore
//! pub async fn list_sales(state: &AppState, limit: u32) -> Result<Vec<SaleSummaryDto>, ApiError> {
//!     let records = state.db.inner().sales().list_recent(limit).await?;
//!     Ok(records.iter().map(SaleSummaryDto::from).collect())
//! }
//! ```

use till_db::Database;

/// Wrapper around `Database` shared by every command.
#[derive(Debug, Clone)]
pub struct DbState {
    db: Database,
}

impl DbState {
    pub fn new(db: Database) -> Self {
        DbState { db }
    }

    /// Returns a reference to the inner Database.
    pub fn inner(&self) -> &Database {
        &self.db
    }
}
