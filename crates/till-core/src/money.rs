//! # Money Module
//!
//! Integer money and loyalty point types.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004                                      │
//! │                                                                         │
//! │  A proportional discount split across three lines in f64 can leave a   │
//! │  grand total that no longer equals subtotal − discount + tax.          │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    10000 cents − 500 cents + 950 cents = 10450 cents, exactly.          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use till_core::money::Money;
//!
//! let price: Money = "250.00".parse().unwrap();
//! assert_eq!(price.cents(), 25_000);
//! assert_eq!((price * 2).to_string(), "500.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::str::FromStr;

use crate::error::ValidationError;
use crate::types::TaxRate;
use crate::CENTS_PER_LOYALTY_POINT;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents, paisa).
///
/// ## Design Decisions
/// - **i64 (signed)**: refunds and adjustments can be negative
/// - **Single field tuple struct**: zero-cost wrapper over i64
/// - **No currency symbol**: the register's config owns presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(250, 0).cents(), 25_000);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Clamps negative values to zero.
    #[inline]
    pub const fn non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }

    /// Calculates tax on this amount, rounding half away from zero.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`, widened to i128.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::money::Money;
    /// use till_core::types::TaxRate;
    ///
    /// // 95.00 at 10% = 9.50
    /// let tax = Money::from_cents(9_500).calculate_tax(TaxRate::from_bps(1000));
    /// assert_eq!(tax.cents(), 950);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        self.percentage(rate.bps())
    }

    /// Returns `bps` basis points of this amount, rounding halves away from
    /// zero, so a negative amount mirrors its positive counterpart.
    ///
    /// Used for percentage promotions: 500 bps of 100.00 is 5.00.
    pub fn percentage(&self, bps: u32) -> Money {
        let raw = self.0 as i128 * bps as i128;
        let half = if raw < 0 { -5_000 } else { 5_000 };
        // i128 division truncates toward zero
        Money::from_cents(((raw + half) / 10_000) as i64)
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Splits `self` across `weights` in proportion, summing exactly to `self`.
    ///
    /// Each share is floored; leftover cents go one at a time to the earliest
    /// entries with a non-zero weight. Zero total weight yields all zeros.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::money::Money;
    ///
    /// let parts = Money::from_cents(1000).allocate(&[1, 1, 1]);
    /// let cents: Vec<i64> = parts.iter().map(|m| m.cents()).collect();
    /// assert_eq!(cents, vec![334, 333, 333]);
    /// ```
    pub fn allocate(&self, weights: &[i64]) -> Vec<Money> {
        let total: i128 = weights.iter().map(|w| (*w).max(0) as i128).sum();
        if total == 0 {
            return vec![Money::zero(); weights.len()];
        }

        let mut shares: Vec<i64> = weights
            .iter()
            .map(|w| ((self.0 as i128 * (*w).max(0) as i128) / total) as i64)
            .collect();

        let mut remainder = self.0 - shares.iter().sum::<i64>();
        let step = remainder.signum();
        for (share, weight) in shares.iter_mut().zip(weights) {
            if remainder == 0 {
                break;
            }
            if *weight > 0 {
                *share += step;
                remainder -= step;
            }
        }

        shares.into_iter().map(Money::from_cents).collect()
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering, e.g. `104.50` or `-5.50`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

/// Parses a decimal amount with at most two fraction digits.
///
/// Accepts `250`, `250.5`, `250.00` and a leading `-`. Rejects anything with
/// more precision than cents.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("empty amount"));
        }
        if frac.len() > 2 {
            return Err(invalid("at most two decimal places"));
        }
        if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected digits"));
        }

        let major: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("amount too large"))?
        };
        let minor: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid("expected digits"))? * 10,
            _ => frac.parse().map_err(|_| invalid("expected digits"))?,
        };

        let cents = major
            .checked_mul(100)
            .and_then(|c| c.checked_add(minor))
            .ok_or_else(|| invalid("amount too large"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Loyalty Points
// =============================================================================

/// Customer loyalty balance in hundredths of a point.
///
/// ## Earning and Spending
/// ```text
/// earn:   1 point per 100.00 of grand total
///         grand 104.50 (10450 cents) ──► 104 hundredths = 1.04 points
///
/// spend:  1 point redeems 1.00 of tender
///         Loyalty payment 2.50 ──► debits 250 hundredths
/// ```
/// One hundredth of a point is worth exactly one cent when redeemed, so the
/// conversion in both directions is integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LoyaltyPoints(i64);

impl LoyaltyPoints {
    #[inline]
    pub const fn from_hundredths(hundredths: i64) -> Self {
        LoyaltyPoints(hundredths)
    }

    #[inline]
    pub const fn from_points(points: i64) -> Self {
        LoyaltyPoints(points * 100)
    }

    #[inline]
    pub const fn hundredths(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        LoyaltyPoints(0)
    }

    /// Points earned on a purchase (negative totals earn nothing).
    pub fn earned_on(total: Money) -> Self {
        LoyaltyPoints(total.non_negative().cents() * 100 / CENTS_PER_LOYALTY_POINT)
    }

    /// Points needed to tender `amount`.
    pub fn needed_for(amount: Money) -> Self {
        LoyaltyPoints(amount.non_negative().cents())
    }

    /// Adds points, saturating at zero from below.
    pub fn saturating_add(&self, other: LoyaltyPoints) -> Self {
        LoyaltyPoints((self.0 + other.0).max(0))
    }

    /// Removes points, clamping the balance at zero.
    pub fn saturating_sub(&self, other: LoyaltyPoints) -> Self {
        LoyaltyPoints((self.0 - other.0).max(0))
    }
}

impl fmt::Display for LoyaltyPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Money::from_cents(self.0))
    }
}

impl FromStr for LoyaltyPoints {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let as_money: Money = s.parse().map_err(|_| ValidationError::InvalidFormat {
            field: "loyalty points".to_string(),
            reason: "expected a number with at most two decimal places".to_string(),
        })?;
        Ok(LoyaltyPoints(as_money.cents()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
