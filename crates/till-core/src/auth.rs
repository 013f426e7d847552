//! # Users, Roles and Permissions
//!
//! Who may do what at the register.
//!
//! ## Permission Matrix
//! ```text
//! ┌──────────────────┬─────────┬─────────┬─────────┐
//! │ Permission       │  Admin  │ Manager │ Cashier │
//! ├──────────────────┼─────────┼─────────┼─────────┤
//! │ Sale             │   ✓     │   ✓     │   ✓     │
//! │ Refund           │   ✓     │   ✓     │         │
//! │ ManageInventory  │   ✓     │   ✓     │         │
//! └──────────────────┴─────────┴─────────┴─────────┘
//! ```
//!
//! Passwords are compared as plaintext. The directory is a convenience for a
//! single trusted terminal, not a security boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult, ValidationError};

// =============================================================================
// Role
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Cashier,
}

impl Role {
    /// Whether this role holds `permission`.
    pub fn can(&self, permission: Permission) -> bool {
        match permission {
            Permission::Sale => true,
            Permission::Refund | Permission::ManageInventory => {
                matches!(self, Role::Admin | Role::Manager)
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Admin => "Admin",
            Role::Manager => "Manager",
            Role::Cashier => "Cashier",
        })
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "cashier" => Ok(Role::Cashier),
            _ => Err(ValidationError::NotAllowed {
                field: "role".to_string(),
                allowed: vec!["admin".into(), "manager".into(), "cashier".into()],
            }),
        }
    }
}

// =============================================================================
// Permission
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Sale,
    Refund,
    ManageInventory,
}

impl Permission {
    /// Verb phrase used in denial messages.
    pub fn action(&self) -> &'static str {
        match self {
            Permission::Sale => "process sales",
            Permission::Refund => "process refunds",
            Permission::ManageInventory => "manage inventory",
        }
    }
}

// =============================================================================
// User
// =============================================================================

/// A register operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
    pub role: Role,
}

impl User {
    pub fn new(username: impl Into<String>, password: impl Into<String>, role: Role) -> Self {
        User {
            username: username.into(),
            password: password.into(),
            role,
        }
    }

    /// Returns `Ok(())` if the user's role holds `permission`.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::auth::{Permission, Role, User};
    ///
    /// let cashier = User::new("cashier1", "1111", Role::Cashier);
    /// assert!(cashier.require(Permission::Sale).is_ok());
    /// assert!(cashier.require(Permission::Refund).is_err());
    /// ```
    pub fn require(&self, permission: Permission) -> CoreResult<()> {
        if self.role.can(permission) {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied {
                username: self.username.clone(),
                role: self.role.to_string(),
                action: permission.action().to_string(),
            })
        }
    }
}

// =============================================================================
// User Directory
// =============================================================================

/// The set of users allowed to log in.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    users: Vec<User>,
}

impl UserDirectory {
    /// Builds a directory from configured users.
    pub fn new(users: Vec<User>) -> Self {
        UserDirectory { users }
    }

    /// The three stock accounts shipped with the register.
    pub fn default_users() -> Vec<User> {
        vec![
            User::new("admin", "1234", Role::Admin),
            User::new("cashier1", "1111", Role::Cashier),
            User::new("manager", "2222", Role::Manager),
        ]
    }

    /// Looks up a user by exact username and password.
    pub fn authenticate(&self, username: &str, password: &str) -> CoreResult<User> {
        self.users
            .iter()
            .find(|u| u.username == username.trim() && u.password == password)
            .cloned()
            .ok_or(CoreError::InvalidCredentials)
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        UserDirectory::new(UserDirectory::default_users())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_matrix() {
        assert!(Role::Cashier.can(Permission::Sale));
        assert!(!Role::Cashier.can(Permission::Refund));
        assert!(!Role::Cashier.can(Permission::ManageInventory));

        for role in [Role::Admin, Role::Manager] {
            assert!(role.can(Permission::Sale));
            assert!(role.can(Permission::Refund));
            assert!(role.can(Permission::ManageInventory));
        }
    }

    #[test]
    fn test_default_logins() {
        let dir = UserDirectory::default();
        assert_eq!(dir.authenticate("admin", "1234").unwrap().role, Role::Admin);
        assert_eq!(dir.authenticate("cashier1", "1111").unwrap().role, Role::Cashier);
        assert_eq!(dir.authenticate("manager", "2222").unwrap().role, Role::Manager);

        assert!(matches!(
            dir.authenticate("admin", "wrong"),
            Err(CoreError::InvalidCredentials)
        ));
        assert!(dir.authenticate("nobody", "1234").is_err());
    }

    #[test]
    fn test_require_message() {
        let user = User::new("cashier1", "1111", Role::Cashier);
        let err = user.require(Permission::Refund).unwrap_err();
        assert_eq!(err.to_string(), "cashier1 (Cashier) is not allowed to process refunds");
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Manager".parse::<Role>().unwrap(), Role::Manager);
        assert!("owner".parse::<Role>().is_err());
    }
}
