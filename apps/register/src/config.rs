//! # Register Configuration
//!
//! Configuration loaded once at startup.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILL_STORE_NAME="Corner Mart"                                      │
//! │     TILL_DB_PATH=/var/lib/till/till.db                                 │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/till-pos/register.toml (Linux)                           │
//! │     ~/Library/Application Support/com.till.pos/register.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     three stock users, FIX10 and PCT5                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! name = "Corner Mart"
//! currency_symbol = "Rs "
//! currency_code = "PKR"
//!
//! [database]
//! path = "/var/lib/till/till.db"
//!
//! [[users]]
//! username = "admin"
//! password = "1234"
//! role = "admin"
//!
//! [promotions.SAVE20]
//! kind = "percent"
//! bps = 2000
//! ```
//!
//! `[[users]]` replaces the stock accounts when present. `[promotions]`
//! adds to (or overrides) the built-in codes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use till_core::{Money, PromoRule, PromotionCatalog, Role, User, UserDirectory};

const CONFIG_FILE: &str = "register.toml";

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No config path available")]
    NoPath,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_name")]
    pub name: String,

    /// Prefix for displayed amounts.
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,

    /// ISO 4217 code.
    #[serde(default = "default_currency_code")]
    pub currency_code: String,
}

fn default_store_name() -> String {
    "Till POS".to_string()
}

fn default_currency_symbol() -> String {
    "Rs ".to_string()
}

fn default_currency_code() -> String {
    "PKR".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            name: default_store_name(),
            currency_symbol: default_currency_symbol(),
            currency_code: default_currency_code(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file. Unset means the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    pub role: Role,
}

impl From<&UserConfig> for User {
    fn from(u: &UserConfig) -> Self {
        User::new(u.username.clone(), u.password.clone(), u.role)
    }
}

// =============================================================================
// AppConfig
// =============================================================================

/// Register configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    /// Replaces the stock accounts when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserConfig>,

    /// Extra promo codes on top of FIX10 and PCT5.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub promotions: BTreeMap<String, PromoRule>,
}

impl AppConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (register.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading register config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns defaults if loading fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load register config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Register config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.store.name.trim().is_empty() {
            return Err(ConfigError::Invalid("store.name must not be empty".into()));
        }

        let mut seen = std::collections::BTreeSet::new();
        for user in &self.users {
            if user.username.trim().is_empty() {
                return Err(ConfigError::Invalid("user with empty username".into()));
            }
            if !seen.insert(user.username.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate user '{}'",
                    user.username
                )));
            }
        }

        self.promotion_catalog()?;
        Ok(())
    }

    /// Applies `TILL_*` overrides from `lookup`.
    ///
    /// `load` passes the process environment; tests pass a map.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("TILL_STORE_NAME") {
            debug!(store_name = %name, "Overriding store name from environment");
            self.store.name = name;
        }

        if let Some(symbol) = lookup("TILL_CURRENCY_SYMBOL") {
            self.store.currency_symbol = symbol;
        }

        if let Some(code) = lookup("TILL_CURRENCY_CODE") {
            self.store.currency_code = code;
        }

        if let Some(path) = lookup("TILL_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "till", "pos")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    // =========================================================================
    // Derived views
    // =========================================================================

    /// Users allowed to log in.
    pub fn user_directory(&self) -> UserDirectory {
        if self.users.is_empty() {
            UserDirectory::default()
        } else {
            UserDirectory::new(self.users.iter().map(User::from).collect())
        }
    }

    /// Built-in codes plus the configured ones.
    pub fn promotion_catalog(&self) -> ConfigResult<PromotionCatalog> {
        let mut catalog = PromotionCatalog::builtin();
        for (code, rule) in &self.promotions {
            catalog
                .insert(code, *rule)
                .map_err(|e| ConfigError::Invalid(format!("promotion {}: {}", code, e)))?;
        }
        Ok(catalog)
    }

    /// Formats an amount for display.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let config = AppConfig::default();
    /// assert_eq!(config.format_currency(Money::from_cents(10_450)), "Rs 104.50");
    /// ```
    pub fn format_currency(&self, amount: Money) -> String {
        if amount.is_negative() {
            format!("-{}{}", self.store.currency_symbol, Money::from_cents(-amount.cents()))
        } else {
            format!("{}{}", self.store.currency_symbol, amount)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.user_directory().len(), 3);

        let catalog = config.promotion_catalog().unwrap();
        assert!(catalog.get("FIX10").is_some());
        assert!(catalog.get("pct5").is_some());
    }

    #[test]
    fn test_parse_file_sections() {
        let toml = r#"
            [store]
            name = "Corner Mart"

            [[users]]
            username = "owner"
            password = "9999"
            role = "admin"

            [promotions.save20]
            kind = "percent"
            bps = 2000

            [promotions.TENOFF]
            kind = "fixed"
            amount_cents = 1000
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.store.name, "Corner Mart");
        assert_eq!(config.store.currency_code, "PKR");

        let users = config.user_directory();
        assert_eq!(users.len(), 1);
        assert_eq!(users.authenticate("owner", "9999").unwrap().role, Role::Admin);
        assert!(users.authenticate("admin", "1234").is_err());

        let catalog = config.promotion_catalog().unwrap();
        assert_eq!(catalog.get("SAVE20"), Some(PromoRule::percent(2000)));
        assert!(catalog.get("PCT5").is_some());
    }

    #[test]
    fn test_validate_rejects_bad_promo_and_duplicate_user() {
        let mut config = AppConfig::default();
        config.promotions.insert("FREE".into(), PromoRule::percent(20_000));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        let user = UserConfig {
            username: "a".into(),
            password: "1".into(),
            role: Role::Cashier,
        };
        config.users = vec![user.clone(), user];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            [("TILL_STORE_NAME", "Night Shop"), ("TILL_DB_PATH", "/tmp/x.db")].into();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.store.name, "Night Shop");
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/x.db")));
        assert_eq!(config.store.currency_symbol, "Rs ");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.store.name = "Saved Store".into();
        config.promotions.insert("HALF".into(), PromoRule::percent(5_000));
        config.save(Some(path.clone())).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_format_currency() {
        let config = AppConfig::default();
        assert_eq!(config.format_currency(Money::from_cents(10_450)), "Rs 104.50");
        assert_eq!(config.format_currency(Money::zero()), "Rs 0.00");
        assert_eq!(config.format_currency(Money::from_cents(-5)), "-Rs 0.05");
    }
}
