//! # Session State
//!
//! Who is logged in, and the checkout they have open.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Session Lifecycle                                    │
//! │                                                                         │
//! │   logged out ──login──► user=Some, checkout=None                       │
//! │                              │                                          │
//! │                        first "add"                                      │
//! │                              ▼                                          │
//! │                    user=Some, checkout=Some ──complete──► checkout=None │
//! │                              │                                          │
//! │                           logout (reservations released)                │
//! │                              ▼                                          │
//! │                         logged out                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use till_core::{Checkout, CoreError, CoreResult, Permission, User};

/// The single cashier session of this register.
#[derive(Debug, Default)]
pub struct Session {
    pub user: Option<User>,
    pub checkout: Option<Checkout>,
}

impl Session {
    /// The logged-in user, or `NotAuthenticated`.
    pub fn user(&self) -> CoreResult<&User> {
        self.user.as_ref().ok_or(CoreError::NotAuthenticated)
    }

    /// The logged-in user, checked for `permission`.
    pub fn authorize(&self, permission: Permission) -> CoreResult<&User> {
        let user = self.user()?;
        user.require(permission)?;
        Ok(user)
    }

    /// The open checkout, started for the current user if there is none.
    pub fn checkout_mut(&mut self) -> CoreResult<&mut Checkout> {
        let cashier = self.authorize(Permission::Sale)?.username.clone();
        Ok(self.checkout.get_or_insert_with(|| Checkout::start(cashier)))
    }
}

/// Shared handle to the `Session`.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    session: Arc<Mutex<Session>>,
}

impl SessionState {
    pub fn new() -> Self {
        SessionState::default()
    }

    /// Executes a function with read access to the session.
    pub fn with_session<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Session) -> R,
    {
        let session = self.lock();
        f(&session)
    }

    /// Executes a function with write access to the session.
    pub fn with_session_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut session = self.lock();
        f(&mut session)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
