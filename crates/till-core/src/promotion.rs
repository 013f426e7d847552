//! # Promotions
//!
//! Promo codes map to a discount rule applied to the cart subtotal.
//!
//! ```text
//! "pct5" ──uppercase──► "PCT5" ──catalog──► Percent(500 bps)
//!                                               │
//!                     subtotal 100.00 ──────────┴──► discount 5.00
//! ```
//!
//! A discount never exceeds the subtotal it is applied to.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

// =============================================================================
// Promo Rule
// =============================================================================

/// How a promo code reduces the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PromoRule {
    /// A flat amount off.
    Fixed { amount_cents: i64 },
    /// A share of the subtotal in basis points (500 = 5%).
    Percent { bps: u32 },
}

impl PromoRule {
    pub fn fixed(amount: Money) -> Self {
        PromoRule::Fixed {
            amount_cents: amount.cents(),
        }
    }

    pub fn percent(bps: u32) -> Self {
        PromoRule::Percent { bps }
    }

    /// Discount for `subtotal`, capped to `[0, subtotal]`.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        let raw = match *self {
            PromoRule::Fixed { amount_cents } => Money::from_cents(amount_cents),
            PromoRule::Percent { bps } => subtotal.percentage(bps),
        };
        raw.non_negative().min(subtotal.non_negative())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            PromoRule::Fixed { amount_cents } if amount_cents <= 0 => {
                Err(ValidationError::MustBePositive {
                    field: "promo amount".to_string(),
                })
            }
            PromoRule::Percent { bps } if bps == 0 || bps > 10_000 => {
                Err(ValidationError::OutOfRange {
                    field: "promo percent (bps)".to_string(),
                    min: 1,
                    max: 10_000,
                })
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Known promo codes, keyed case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionCatalog {
    rules: BTreeMap<String, PromoRule>,
}

impl PromotionCatalog {
    /// An empty catalog. Most callers want [`PromotionCatalog::builtin`].
    pub fn empty() -> Self {
        PromotionCatalog {
            rules: BTreeMap::new(),
        }
    }

    /// `FIX10` (10.00 off) and `PCT5` (5% off).
    pub fn builtin() -> Self {
        let mut catalog = PromotionCatalog::empty();
        catalog
            .rules
            .insert("FIX10".to_string(), PromoRule::fixed(Money::from_cents(1_000)));
        catalog
            .rules
            .insert("PCT5".to_string(), PromoRule::percent(500));
        catalog
    }

    /// Normalizes a code the way lookups do.
    pub fn normalize(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Adds or replaces a code.
    pub fn insert(&mut self, code: &str, rule: PromoRule) -> CoreResult<()> {
        let code = Self::normalize(code);
        if code.is_empty() {
            return Err(ValidationError::Required {
                field: "promo code".to_string(),
            }
            .into());
        }
        rule.validate()?;
        self.rules.insert(code, rule);
        Ok(())
    }

    pub fn get(&self, code: &str) -> Option<PromoRule> {
        self.rules.get(&Self::normalize(code)).copied()
    }

    /// Like [`get`](Self::get) but an unknown code is an error.
    pub fn lookup(&self, code: &str) -> CoreResult<PromoRule> {
        self.get(code)
            .ok_or_else(|| CoreError::UnknownPromoCode(code.trim().to_string()))
    }

    /// Discount a (possibly absent) code yields on `subtotal`.
    ///
    /// Codes that have since left the catalog yield no discount.
    pub fn discount_for(&self, code: Option<&str>, subtotal: Money) -> Money {
        code.and_then(|c| self.get(c))
            .map(|rule| rule.discount_for(subtotal))
            .unwrap_or_else(Money::zero)
    }

    pub fn codes(&self) -> impl Iterator<Item = (&str, &PromoRule)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Default for PromotionCatalog {
    fn default() -> Self {
        PromotionCatalog::builtin()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
