//! # Configuration State
//!
//! Read-only after startup, so no mutex.

use till_core::{Money, PromotionCatalog, UserDirectory};

use crate::config::{AppConfig, ConfigResult};

/// Loaded configuration plus the views commands need.
#[derive(Debug, Clone)]
pub struct ConfigState {
    pub config: AppConfig,
    pub users: UserDirectory,
    pub promotions: PromotionCatalog,
}

impl ConfigState {
    pub fn new(config: AppConfig) -> ConfigResult<Self> {
        let users = config.user_directory();
        let promotions = config.promotion_catalog()?;
        Ok(ConfigState {
            config,
            users,
            promotions,
        })
    }

    pub fn format_currency(&self, amount: Money) -> String {
        self.config.format_currency(amount)
    }
}

impl Default for ConfigState {
    fn default() -> Self {
        ConfigState {
            config: AppConfig::default(),
            users: UserDirectory::default(),
            promotions: PromotionCatalog::builtin(),
        }
    }
}
