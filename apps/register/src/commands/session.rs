//! # Session Commands
//!
//! Logging a cashier in and out.
//!
//! Logging out (or a different user logging in) abandons the open checkout
//! and returns its reserved stock to the shelf.

use serde::Serialize;
use tracing::{info, warn};

use till_core::{Inventory, Role, User};

use crate::error::ApiError;
use crate::state::{AppState, Session};

/// The logged-in user, without the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub username: String,
    pub role: Role,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        UserDto {
            username: user.username.clone(),
            role: user.role,
        }
    }
}

/// Authenticates against the configured users and starts a session.
pub fn login(state: &AppState, username: &str, password: &str) -> Result<UserDto, ApiError> {
    let user = match state.config.users.authenticate(username, password) {
        Ok(user) => user,
        Err(e) => {
            warn!(target: "audit", event = "login_failed", username = %username.trim());
            return Err(e.into());
        }
    };

    state.with_register_mut(|inventory, session| {
        end_session(inventory, session);
        session.user = Some(user.clone());
    });

    info!(target: "audit", event = "login", username = %user.username, role = %user.role);
    Ok(UserDto::from(&user))
}

/// Ends the session. Returns who was logged out, if anyone.
pub fn logout(state: &AppState) -> Result<Option<UserDto>, ApiError> {
    let user = state.with_register_mut(end_session);

    if let Some(user) = &user {
        info!(target: "audit", event = "logout", username = %user.username);
    }
    Ok(user.as_ref().map(UserDto::from))
}

/// The logged-in user, if any.
pub fn whoami(state: &AppState) -> Option<UserDto> {
    state
        .session
        .with_session(|s| s.user.as_ref().map(UserDto::from))
}

fn end_session(inventory: &mut Inventory, session: &mut Session) -> Option<User> {
    if let Some(checkout) = session.checkout.take() {
        let id = checkout.id().to_string();
        let lines = checkout.items().len();
        if let Err(e) = checkout.abandon(inventory) {
            warn!(checkout = %id, error = %e, "Could not release every reservation");
        } else if lines > 0 {
            info!(checkout = %id, lines, "Abandoned open checkout");
        }
    }
    session.user.take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cart::add_to_cart;
    use crate::commands::test_support::{memory_stock, test_state};
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn test_login_and_logout() {
        let state = test_state().await;

        let err = login(&state, "admin", "wrong").unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert!(whoami(&state).is_none());

        let user = login(&state, "manager", "2222").unwrap();
        assert_eq!(user.role, Role::Manager);
        assert_eq!(whoami(&state).unwrap().username, "manager");

        let out = logout(&state).unwrap();
        assert_eq!(out.unwrap().username, "manager");
        assert!(logout(&state).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logout_releases_reservations() {
        let state = test_state().await;
        login(&state, "cashier1", "1111").unwrap();
        add_to_cart(&state, "9000", 4).unwrap();
        assert_eq!(memory_stock(&state, "9000"), 6);

        // Switching user ends the previous session
        login(&state, "admin", "1234").unwrap();
        assert_eq!(memory_stock(&state, "9000"), 10);
        assert!(state.session.with_session(|s| s.checkout.is_none()));
    }

    #[test]
    fn test_user_dto_hides_password() {
        let user = User::new("admin", "1234", Role::Admin);
        let json = serde_json::to_value(UserDto::from(&user)).unwrap();
        assert_eq!(json["username"], "admin");
        assert_eq!(json["role"], "admin");
        assert!(json.get("password").is_none());
    }
}
