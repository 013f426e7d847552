//! # Legacy Flat Files
//!
//! Reads the text files older registers kept instead of a database, and
//! writes the inventory file back out.
//!
//! ## Formats
//! ```text
//! inventory.txt  (fields separated by two tabs)
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │ barcode⇥⇥name⇥⇥price⇥⇥stock⇥⇥lowStockThreshold⇥⇥taxRate             │  header
//! │ 1001⇥⇥Milk 1L⇥⇥250.00⇥⇥30⇥⇥5⇥⇥0.10                                  │
//! └──────────────────────────────────────────────────────────────────────┘
//!
//! customers.txt
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │ phone,name,contact,loyaltyPoints                                     │  header
//! │ =========================================                            │  ignored
//! │ 03001234567,Ayesha,ayesha@example.com,12.50                          │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inventory rows with fewer than six fields are skipped; a row with six
//! fields that do not parse is an error. Customer rows with fewer than four
//! fields, or that do not parse, are skipped with a warning.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use till_core::validation::{validate_barcode, validate_price_cents, validate_stock_level};
use till_core::{Customer, LoyaltyPoints, Money, Product, TaxRate};

const INVENTORY_HEADER: &str = "barcode\t\tname\t\tprice\t\tstock\t\tlowStockThreshold\t\ttaxRate";
const INVENTORY_FIELDS: usize = 6;
const CUSTOMER_FIELDS: usize = 4;

// =============================================================================
// Inventory
// =============================================================================

/// Parses an inventory file.
pub fn parse_inventory<R: Read>(reader: R) -> DbResult<Vec<Product>> {
    let mut csv = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .from_reader(reader);

    let mut products = Vec::new();
    for result in csv.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        // "a\t\tb" reads as ["a", "", "b"]
        let fields: Vec<&str> = record.iter().step_by(2).collect();
        if fields.len() < INVENTORY_FIELDS {
            debug!(line, "Skipping short inventory row");
            continue;
        }

        products.push(product_from_fields(&fields).map_err(|message| DbError::Import { line, message })?);
    }

    debug!(count = products.len(), "Parsed inventory file");
    Ok(products)
}

fn product_from_fields(fields: &[&str]) -> Result<Product, String> {
    let barcode = fields[0];
    validate_barcode(barcode).map_err(|e| e.to_string())?;

    let price: Money = fields[2].parse().map_err(|e| format!("price: {e}"))?;
    let stock: i64 = fields[3].parse().map_err(|e| format!("stock: {e}"))?;
    let threshold: i64 = fields[4].parse().map_err(|e| format!("lowStockThreshold: {e}"))?;
    let tax: TaxRate = fields[5].parse().map_err(|e| format!("taxRate: {e}"))?;

    validate_stock_level("stock", stock).map_err(|e| e.to_string())?;
    validate_stock_level("lowStockThreshold", threshold).map_err(|e| e.to_string())?;
    validate_price_cents(price.cents()).map_err(|e| e.to_string())?;

    Ok(Product::new(barcode, fields[1], price, stock, threshold, tax))
}

/// Writes products in the inventory file format, ordered as given.
pub fn write_inventory<'a, W: Write>(
    mut writer: W,
    products: impl IntoIterator<Item = &'a Product>,
) -> DbResult<()> {
    writeln!(writer, "{INVENTORY_HEADER}")?;
    for p in products {
        writeln!(
            writer,
            "{}\t\t{}\t\t{}\t\t{}\t\t{}\t\t{}",
            p.barcode,
            p.name,
            p.price(),
            p.stock,
            p.low_stock_threshold,
            tax_fraction(p.tax_rate_bps)
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// `1000` → `0.10`, `1050` → `0.105`. Exact: at least two and at most
/// four fraction digits, which is what `TaxRate` parses back.
fn tax_fraction(bps: u32) -> String {
    let frac = format!("{:04}", bps % 10_000);
    let frac = frac.trim_end_matches('0');
    format!("{}.{:0<2}", bps / 10_000, frac)
}

pub fn load_inventory_file(path: &Path) -> DbResult<Vec<Product>> {
    let file = File::open(path)?;
    parse_inventory(BufReader::new(file))
}

pub fn export_inventory_file<'a>(
    path: &Path,
    products: impl IntoIterator<Item = &'a Product>,
) -> DbResult<()> {
    let file = File::create(path)?;
    write_inventory(std::io::BufWriter::new(file), products)
}

// =============================================================================
// Customers
// =============================================================================

/// Parses a customers file.
pub fn parse_customers<R: Read>(reader: R) -> DbResult<Vec<Customer>> {
    let mut csv = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .comment(Some(b'='))
        .trim(Trim::All)
        .from_reader(reader);

    let mut customers = Vec::new();
    for result in csv.records() {
        let record = result?;
        match customer_from_record(&record) {
            Ok(Some(customer)) => customers.push(customer),
            Ok(None) => {}
            Err(reason) => {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                warn!(line, reason = %reason, "Skipping customer row");
            }
        }
    }

    debug!(count = customers.len(), "Parsed customers file");
    Ok(customers)
}

fn customer_from_record(record: &StringRecord) -> Result<Option<Customer>, String> {
    if record.len() < CUSTOMER_FIELDS {
        return Ok(None);
    }

    let phone = &record[0];
    if phone.is_empty() {
        return Err("missing phone".to_string());
    }
    let points: LoyaltyPoints = record[3].parse().map_err(|e| format!("loyaltyPoints: {e}"))?;

    let mut customer = Customer::new(phone, &record[1], &record[2]);
    customer.loyalty_points = points.hundredths().max(0);
    Ok(Some(customer))
}

pub fn load_customers_file(path: &Path) -> DbResult<Vec<Customer>> {
    let file = File::open(path)?;
    parse_customers(BufReader::new(file))
}

// =============================================================================
// Sample data
// =============================================================================

const SAMPLE_INVENTORY: &[(&str, &str, i64, i64, i64, u32)] = &[
    ("1001", "Milk 1L", 25_000, 30, 5, 1000),
    ("1002", "Bread Loaf", 12_000, 50, 10, 500),
    ("1003", "Eggs Dozen", 45_000, 40, 5, 0),
    ("1004", "Rice 5kg", 150_000, 20, 3, 800),
    ("1005", "Sugar 1kg", 18_000, 100, 20, 800),
    ("1006", "Tea Pack", 60_000, 25, 5, 1000),
    ("1007", "Coffee Jar", 95_000, 15, 3, 1000),
    ("1008", "Cooking Oil 5L", 220_000, 10, 2, 1200),
    ("1009", "Butter 250g", 35_000, 30, 5, 500),
    ("1010", "Cheese 500g", 80_000, 20, 4, 500),
    ("1011", "Shampoo Bottle", 55_000, 40, 10, 1500),
    ("1012", "Soap Bar", 12_000, 200, 30, 500),
    ("1013", "Toothpaste", 25_000, 60, 10, 800),
    ("1014", "Detergent 1kg", 40_000, 50, 10, 1000),
    ("1015", "Soft Drink 1.5L", 18_000, 80, 15, 1200),
    ("1016", "Biscuits Pack", 9_000, 150, 20, 500),
    ("1017", "Chips Packet", 7_000, 200, 30, 500),
    ("1018", "Chocolate Bar", 15_000, 100, 20, 800),
    ("1019", "Juice 1L", 22_000, 60, 10, 1000),
    ("1020", "Water Bottle 1.5L", 6_000, 300, 50, 0),
];

/// The twenty-item starter inventory a fresh register is seeded with.
pub fn sample_inventory() -> Vec<Product> {
    SAMPLE_INVENTORY
        .iter()
        .map(|&(barcode, name, price, stock, threshold, bps)| {
            Product::new(barcode, name, Money::from_cents(price), stock, threshold, TaxRate::from_bps(bps))
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_inventory() {
        let text = "barcode\t\tname\t\tprice\t\tstock\t\tlowStockThreshold\t\ttaxRate\n\
                    1001\t\tMilk 1L\t\t250.00\t\t30\t\t5\t\t0.10\n\
                    \n\
                    1002\t\tBread Loaf\t\t120.5\t\t50\n\
                    1020\t\tWater Bottle 1.5L\t\t60.00\t\t300\t\t50\t\t0.00\n";

        let products = parse_inventory(Cursor::new(text)).unwrap();
        assert_eq!(products.len(), 2);

        let milk = &products[0];
        assert_eq!(milk.barcode, "1001");
        assert_eq!(milk.name, "Milk 1L");
        assert_eq!(milk.price_cents, 25_000);
        assert_eq!(milk.stock, 30);
        assert_eq!(milk.low_stock_threshold, 5);
        assert_eq!(milk.tax_rate_bps, 1000);

        assert_eq!(products[1].name, "Water Bottle 1.5L");
        assert!(products[1].tax_rate().is_zero());
    }

    #[test]
    fn test_parse_inventory_rejects_bad_numbers() {
        let text = "header\n1001\t\tMilk\t\tabc\t\t30\t\t5\t\t0.10\n";
        let err = parse_inventory(Cursor::new(text)).unwrap_err();
        assert!(matches!(err, DbError::Import { line: 2, .. }));
    }

    #[test]
    fn test_parse_inventory_rejects_out_of_range_prices() {
        let text = "header\n1001\t\tMilk\t\t1000000000.01\t\t30\t\t5\t\t0.10\n";
        let err = parse_inventory(Cursor::new(text)).unwrap_err();
        assert!(matches!(err, DbError::Import { line: 2, .. }));

        let text = "header\n1001\t\tMilk\t\t-1.00\t\t30\t\t5\t\t0.10\n";
        assert!(parse_inventory(Cursor::new(text)).is_err());

        let text = "header\n1001\t\tMilk\t\t1000000000.00\t\t30\t\t5\t\t0.10\n";
        let products = parse_inventory(Cursor::new(text)).unwrap();
        assert_eq!(products[0].price_cents, 100_000_000_000);
    }

    #[test]
    fn test_inventory_file_roundtrip_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.txt");

        let sample = sample_inventory();
        export_inventory_file(&path, &sample).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(INVENTORY_HEADER));
        assert_eq!(lines.next(), Some("1001\t\tMilk 1L\t\t250.00\t\t30\t\t5\t\t0.10"));

        let loaded = load_inventory_file(&path).unwrap();
        assert_eq!(loaded.len(), 20);
        assert_eq!(loaded[7].name, "Cooking Oil 5L");
        assert_eq!(loaded[7].price_cents, 220_000);
        assert_eq!(loaded[7].tax_rate_bps, 1200);
    }

    #[test]
    fn test_parse_customers() {
        let text = "phone,name,contact,loyaltyPoints\n\
                    =========================================\n\
                    03001234567,Ayesha,ayesha@example.com,12.50\n\
                    \n\
                    0311,Bilal\n\
                    0322,Sana,0322,lots\n\
                    0333,Omar,0333,3\n";

        let customers = parse_customers(Cursor::new(text)).unwrap();
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].phone, "03001234567");
        assert_eq!(customers[0].contact, "ayesha@example.com");
        assert_eq!(customers[0].loyalty_points, 1_250);
        assert_eq!(customers[1].points(), LoyaltyPoints::from_points(3));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_customers_file(&dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, DbError::Io(_)));
    }

    #[test]
    fn test_tax_fraction() {
        assert_eq!(tax_fraction(1000), "0.10");
        assert_eq!(tax_fraction(0), "0.00");
        assert_eq!(tax_fraction(1250), "0.125");
        assert_eq!(tax_fraction(1050), "0.105");
        assert_eq!(tax_fraction(1), "0.0001");
        assert_eq!(tax_fraction(10_000), "1.00");
    }

    #[test]
    fn test_export_keeps_fractional_tax_rates() {
        let products = vec![
            Product::new("2001", "Imported Tea", Money::from_cents(100), 1, 0, TaxRate::from_bps(1050)),
            Product::new("2002", "Spice Mix", Money::from_cents(99), 4, 1, TaxRate::from_bps(1725)),
            Product::new("2003", "Salt", Money::from_cents(40), 9, 2, TaxRate::from_bps(7)),
        ];

        let mut out = Vec::new();
        write_inventory(&mut out, &products).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("2001\t\tImported Tea\t\t1.00\t\t1\t\t0\t\t0.105"));

        let loaded = parse_inventory(Cursor::new(text)).unwrap();
        let rates: Vec<u32> = loaded.iter().map(|p| p.tax_rate_bps).collect();
        assert_eq!(rates, vec![1050, 1725, 7]);
    }
}
