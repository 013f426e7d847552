//! # Inventory State
//!
//! The in-memory stock map the cart reserves against.
//!
//! ## Two Copies of Stock
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  InventoryState (memory)              products table (SQLite)           │
//! │  ───────────────────────              ───────────────────────           │
//! │  add 1001 x2   ──► stock 10 → 8       stock 10 (unchanged)              │
//! │  remove line   ──► stock 8 → 10       stock 10                          │
//! │  complete      ──► stock 8            stock 10 → 8 (same transaction    │
//! │                                        as the sale rows)                │
//! │  refund        ──► stock 8 → 10       stock 8 → 10                      │
//! │  restock +5    ──► stock 10 → 15      stock 10 → 15                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Memory runs ahead of the database only while items sit in an open cart.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use till_core::Inventory;

/// Shared handle to the register's `Inventory`.
#[derive(Debug, Clone, Default)]
pub struct InventoryState {
    inventory: Arc<Mutex<Inventory>>,
}

impl InventoryState {
    pub fn new(inventory: Inventory) -> Self {
        InventoryState {
            inventory: Arc::new(Mutex::new(inventory)),
        }
    }

    /// Executes a function with read access to the inventory.
    pub fn with_inventory<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Inventory) -> R,
    {
        let inventory = self.lock();
        f(&inventory)
    }

    /// Executes a function with write access to the inventory.
    pub fn with_inventory_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Inventory) -> R,
    {
        let mut inventory = self.lock();
        f(&mut inventory)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inventory> {
        // A panic mid-update leaves the map consistent per barcode, so the
        // guard is still usable.
        self.inventory.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
