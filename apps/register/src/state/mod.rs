//! # State Module
//!
//! Application state shared by the register commands.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Architecture                                   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                         AppState                                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │          │                │                 │                │          │
//! │          ▼                ▼                 ▼                ▼          │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ ┌──────────────┐   │
//! │  │   DbState    │ │InventoryState│ │ SessionState │ │ ConfigState  │   │
//! │  │  Database    │ │ Arc<Mutex<   │ │ Arc<Mutex<   │ │ AppConfig,   │   │
//! │  │  (SQLite     │ │  Inventory   │ │  Session     │ │ users,       │   │
//! │  │   pool)      │ │ >>           │ │ >>           │ │ promotions   │   │
//! │  └──────────────┘ └──────────────┘ └──────────────┘ └──────────────┘   │
//! │                                                                         │
//! │  LOCKING:                                                              │
//! │  • Inventory before session, always (see `with_register_mut`)          │
//! │  • No guard is held across an `.await`                                 │
//! │  • ConfigState is read-only after startup                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod inventory;
mod session;

pub use config::ConfigState;
pub use db::DbState;
pub use inventory::InventoryState;
pub use session::{Session, SessionState};

use till_core::Inventory;

/// Everything a command may touch.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: DbState,
    pub inventory: InventoryState,
    pub session: SessionState,
    pub config: ConfigState,
}

impl AppState {
    pub fn new(db: DbState, inventory: InventoryState, config: ConfigState) -> Self {
        AppState {
            db,
            inventory,
            session: SessionState::new(),
            config,
        }
    }

    /// Runs `f` with both the inventory and the session locked.
    ///
    /// The only place both locks are taken, in inventory-then-session order.
    pub fn with_register_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Inventory, &mut Session) -> R,
    {
        let mut inventory = self.inventory.lock();
        let mut session = self.session.lock();
        f(&mut inventory, &mut session)
    }
}
