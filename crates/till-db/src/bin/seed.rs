//! # Seed Data Loader
//!
//! Fills a register database with products and customers.
//!
//! ## Usage
//! ```bash
//! # Built-in 20-item sample inventory
//! cargo run -p till-db --bin seed
//!
//! # Import legacy text files
//! cargo run -p till-db --bin seed -- --inventory inventory.txt --customers customers.txt
//!
//! # Write the current inventory back out in the legacy format
//! cargo run -p till-db --bin seed -- --db ./data/till.db --export inventory.txt
//! ```
//!
//! Products are only loaded into an empty database, so running the seed
//! twice never resets stock. Customers are always merged by phone.

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use till_db::flatfile::{export_inventory_file, load_customers_file, load_inventory_file, sample_inventory};
use till_db::{Database, DbConfig, DbResult};

/// Till POS seed data loader
#[derive(Parser, Debug)]
#[command(name = "seed")]
#[command(about = "Seeds a Till POS database with products and customers", long_about = None)]
struct Args {
    /// Database file path
    #[arg(short, long, value_name = "PATH", default_value = "./till_dev.db")]
    db: PathBuf,

    /// Legacy inventory file (barcode, name, price, stock, threshold, tax)
    #[arg(short, long, value_name = "FILE")]
    inventory: Option<PathBuf>,

    /// Legacy customers file (phone, name, contact, points)
    #[arg(short, long, value_name = "FILE")]
    customers: Option<PathBuf>,

    /// Write the database's inventory to FILE after seeding
    #[arg(short, long, value_name = "FILE")]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> DbResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")))
        .init();

    let args = Args::parse();

    println!("Till POS Seed Data Loader");
    println!("=========================");
    println!("Database: {}", args.db.display());
    println!();

    let db = Database::new(DbConfig::new(&args.db)).await?;
    println!("✓ Connected to database, migrations applied");

    seed_products(&db, args.inventory.as_deref()).await?;

    if let Some(path) = &args.customers {
        let customers = load_customers_file(path)?;
        for customer in &customers {
            db.customers().import(customer).await?;
        }
        println!("✓ Imported {} customers from {}", customers.len(), path.display());
    }

    if let Some(path) = &args.export {
        let products = db.products().list_all().await?;
        export_inventory_file(path, &products)?;
        println!("✓ Exported {} products to {}", products.len(), path.display());
    }

    let low = db.products().low_stock().await?;
    println!();
    println!("Products:  {}", db.products().count().await?);
    println!("Customers: {}", db.customers().count().await?);
    println!("Low stock: {}", low.len());

    db.close().await;
    Ok(())
}

async fn seed_products(db: &Database, inventory: Option<&std::path::Path>) -> DbResult<()> {
    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping product seed");
        println!("⚠ Database already has {existing} products");
        println!("  Skipping products so stock levels are kept.");
        return Ok(());
    }

    let (products, source) = match inventory {
        Some(path) => (load_inventory_file(path)?, path.display().to_string()),
        None => (sample_inventory(), "built-in sample".to_string()),
    };

    for product in &products {
        db.products().upsert(product).await?;
    }

    info!(count = products.len(), source = %source, "Seeded products");
    println!("✓ Loaded {} products from {}", products.len(), source);
    Ok(())
}
