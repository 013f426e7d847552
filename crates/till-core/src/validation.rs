//! # Input Validation
//!
//! Checks run on cashier and config input before any state changes.
//!
//! ```text
//!   shell line ──► parse (register) ──► validate_* (here) ──► Checkout / Inventory
//!                   arg count, ints      business ranges        stock, totals
//!                                                                    │
//!                                        SQLite CHECK (stock >= 0) ◄─┘
//! ```
//!
//! Every validator trims its input first; a value that is only whitespace
//! counts as missing.

use crate::error::ValidationError;
use crate::{MAX_AMOUNT_CENTS, MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_BARCODE_LEN: usize = 50;
const MAX_PRODUCT_NAME_LEN: usize = 200;
const MAX_CUSTOMER_NAME_LEN: usize = 100;
const MAX_QUERY_LEN: usize = 100;

// =============================================================================
// Helpers
// =============================================================================

/// Non-empty after trimming and no longer than `max` characters.
fn required_text<'a>(field: &str, value: &'a str, max: usize) -> ValidationResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(value)
}

fn positive(field: &str, value: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn within(field: &str, value: i64, min: i64, max: i64) -> ValidationResult<()> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
        });
    }
    Ok(())
}

// =============================================================================
// Text
// =============================================================================

/// Barcodes are 1-50 letters, digits, `-` or `_`.
///
/// ```rust
/// use till_core::validation::validate_barcode;
///
/// assert!(validate_barcode("1001").is_ok());
/// assert!(validate_barcode("10 01").is_err());
/// ```
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    let barcode = required_text("barcode", barcode, MAX_BARCODE_LEN)?;
    if let Some(bad) = barcode
        .chars()
        .find(|c| !(c.is_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: format!("unexpected character {:?}", bad),
        });
    }
    Ok(())
}

pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    required_text("name", name, MAX_PRODUCT_NAME_LEN).map(|_| ())
}

/// Returns the trimmed query. An empty query matches everything.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();
    if query.chars().count() > MAX_QUERY_LEN {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: MAX_QUERY_LEN,
        });
    }
    Ok(query.to_string())
}

/// 3-20 digits with an optional leading `+`. Customers are keyed by phone,
/// so separators are rejected rather than stripped.
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    let phone = required_text("phone", phone, 21)?;
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    let ok = (3..=20).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit());
    if !ok {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "expected 3-20 digits".to_string(),
        });
    }
    Ok(())
}

pub fn validate_customer_name(name: &str) -> ValidationResult<()> {
    required_text("customer name", name, MAX_CUSTOMER_NAME_LEN).map(|_| ())
}

// =============================================================================
// Numbers
// =============================================================================

/// A cart line holds 1 to 999 units.
///
/// ```text
/// add 1001 0     → "quantity must be positive"
/// add 1001 1000  → "quantity must be between 1 and 999"
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    positive("quantity", qty)?;
    within("quantity", qty, 1, MAX_ITEM_QUANTITY)
}

/// Restocks have no per-line cap, only the column's range.
pub fn validate_restock_quantity(qty: i64) -> ValidationResult<()> {
    positive("restock quantity", qty)?;
    within("restock quantity", qty, 1, i64::from(i32::MAX))
}

/// Zero-priced items (bags, samples) are allowed; the ceiling is
/// [`MAX_AMOUNT_CENTS`].
///
/// ```rust
/// use till_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// assert!(validate_price_cents(i64::MAX).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    within("price", cents, 0, MAX_AMOUNT_CENTS)
}

/// Stock counts and low-stock thresholds.
pub fn validate_stock_level(field: &str, value: i64) -> ValidationResult<()> {
    within(field, value, 0, i64::MAX)
}

pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    positive("payment amount", cents)?;
    within("payment amount", cents, 1, MAX_AMOUNT_CENTS)
}

/// 0 to 10000 basis points (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    within("tax_rate", i64::from(bps), 0, 10_000)
}

/// Whether a cart already holding `current_lines` lines may take another.
pub fn validate_cart_size(current_lines: usize) -> ValidationResult<()> {
    if current_lines >= MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart lines".to_string(),
            min: 0,
            max: MAX_CART_ITEMS as i64,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barcode_rules() {
        assert!(validate_barcode(" 1001 ").is_ok());
        assert!(validate_barcode("ABC-123_x").is_ok());

        assert!(matches!(
            validate_barcode("   "),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_barcode(&"1".repeat(51)),
            Err(ValidationError::TooLong { max: 50, .. })
        ));
        let err = validate_barcode("has space").unwrap_err();
        assert_eq!(err.to_string(), "barcode has invalid format: unexpected character ' '");
    }

    #[test]
    fn test_names() {
        assert!(validate_product_name("Milk 1L").is_ok());
        assert!(validate_product_name("").is_err());
        assert!(validate_product_name(&"A".repeat(201)).is_err());
        assert!(validate_customer_name("Ayesha").is_ok());
        assert!(validate_customer_name(&"B".repeat(101)).is_err());
    }

    #[test]
    fn test_search_query_is_trimmed() {
        assert_eq!(validate_search_query("  milk ").unwrap(), "milk");
        assert_eq!(validate_search_query("").unwrap(), "");
        assert!(validate_search_query(&"q".repeat(101)).is_err());
    }

    #[test]
    fn test_phone_rules() {
        assert!(validate_phone("03001234567").is_ok());
        assert!(validate_phone("+923001234567").is_ok());

        assert!(validate_phone("").is_err());
        assert!(validate_phone("12").is_err());
        assert!(validate_phone("0300-123").is_err());
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());

        assert!(matches!(
            validate_quantity(0),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(validate_quantity(-1).is_err());
        assert!(matches!(
            validate_quantity(MAX_ITEM_QUANTITY + 1),
            Err(ValidationError::OutOfRange { min: 1, .. })
        ));

        assert!(validate_restock_quantity(5_000).is_ok());
        assert!(validate_restock_quantity(0).is_err());
    }

    #[test]
    fn test_money_and_stock() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(-1).is_err());
        assert!(validate_stock_level("threshold", 0).is_ok());
        assert!(validate_stock_level("threshold", -1).is_err());
        assert!(validate_price_cents(MAX_AMOUNT_CENTS).is_ok());
        assert!(matches!(
            validate_price_cents(MAX_AMOUNT_CENTS + 1),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(validate_payment_amount(1).is_ok());
        assert!(validate_payment_amount(MAX_AMOUNT_CENTS).is_ok());
        assert!(validate_payment_amount(0).is_err());
        // 92233720368547758.07
        assert!(validate_payment_amount(i64::MAX).is_err());
        assert!(validate_tax_rate_bps(10_000).is_ok());
        assert!(validate_tax_rate_bps(10_001).is_err());
    }

    #[test]
    fn test_cart_size() {
        assert!(validate_cart_size(MAX_CART_ITEMS - 1).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS).is_err());
    }
}
