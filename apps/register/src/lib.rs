//! # Till POS Register
//!
//! Terminal front end for a single-till shop: one cashier session at a
//! time, reading commands from stdin.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Till Register                                    │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                         shell.rs                                │   │
//! │  │   stdin ──► parse ──► Command ──► commands::* ──► stdout        │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │                                         │
//! │  ┌────────────────────────────▼────────────────────────────────────┐   │
//! │  │                       state/ (AppState)                         │   │
//! │  │   DbState   InventoryState   SessionState   ConfigState         │   │
//! │  └────────────┬───────────────────────────────────────┬────────────┘   │
//! │               │                                       │                 │
//! │  ┌────────────▼────────────┐             ┌────────────▼────────────┐   │
//! │  │  till-db (SQLite)       │             │  till-core (rules)      │   │
//! │  └─────────────────────────┘             └─────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod shell;
pub mod state;

use std::path::PathBuf;

use anyhow::Context;
use directories::ProjectDirs;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use till_core::Inventory;
use till_db::flatfile::sample_inventory;
use till_db::migrations::migration_status;
use till_db::{Database, DbConfig};

use config::AppConfig;
use shell::Shell;
use state::{AppState, ConfigState, DbState, InventoryState};

/// Startup options, usually from the command line.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub config: Option<PathBuf>,
    pub db: Option<PathBuf>,
    /// Load the sample inventory into an empty database.
    pub seed: bool,
    /// One JSON document per reply instead of text.
    pub json: bool,
}

/// Runs the register until `quit` or end of input.
///
/// ## Startup Sequence
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  1. Initialize logging (stderr, RUST_LOG or the default filter)         │
/// │  2. Load AppConfig (defaults < register.toml < TILL_* env)              │
/// │  3. Resolve database path (--db > config > platform data dir)           │
/// │  4. Connect, run migrations, optionally seed sample products            │
/// │  5. Load every product into the in-memory inventory                     │
/// │  6. Build AppState and hand stdin/stdout to the shell                   │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub async fn run(options: Options) -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Till POS register");

    let config = AppConfig::load(options.config.clone()).context("Failed to load configuration")?;
    let db_path = database_path(&options, &config)?;
    info!(?db_path, "Database path determined");

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let (total, applied) = migration_status(db.pool()).await?;
    info!(total, applied, "Database connected and migrations applied");

    if options.seed {
        seed_if_empty(&db).await?;
    }

    let products = db.products().list_all().await?;
    if products.is_empty() {
        warn!("No products in the database. Run with --seed or use the seed tool.");
    }
    let inventory = Inventory::from_products(products);
    info!(products = inventory.len(), "Inventory loaded");

    let config_state = ConfigState::new(config)?;
    let state = AppState::new(DbState::new(db.clone()), InventoryState::new(inventory), config_state);

    let shell = Shell::new(state, options.json);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    shell.run(stdin, &mut stdout).await?;

    db.close().await;
    info!("Register closed");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// Logs go to stderr so stdout carries only shell output.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=audit=info` - Only logins, sales and refunds
/// - Default: `info,till=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,till=debug,sqlx=warn"));

    // A second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Determines the database file path.
///
/// ## Order
/// 1. `--db`
/// 2. `[database] path` (or `TILL_DB_PATH`)
/// 3. Platform data dir, e.g. `~/.local/share/till-pos/till.db` on Linux
fn database_path(options: &Options, config: &AppConfig) -> anyhow::Result<PathBuf> {
    if let Some(path) = options.db.clone().or_else(|| config.database.path.clone()) {
        return Ok(path);
    }

    let proj_dirs = ProjectDirs::from("com", "till", "pos")
        .context("Could not determine app data directory")?;
    let data_dir = proj_dirs.data_dir();

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    Ok(data_dir.join("till.db"))
}

async fn seed_if_empty(db: &Database) -> anyhow::Result<()> {
    let existing = db.products().count().await?;
    if existing > 0 {
        info!(existing, "Products present, skipping sample seed");
        return Ok(());
    }

    let products = sample_inventory();
    for product in &products {
        db.products().upsert(product).await?;
    }
    info!(count = products.len(), "Seeded sample inventory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_precedence() {
        let mut config = AppConfig::default();
        config.database.path = Some(PathBuf::from("/from/config.db"));

        let options = Options {
            db: Some(PathBuf::from("/from/cli.db")),
            ..Options::default()
        };
        assert_eq!(database_path(&options, &config).unwrap(), PathBuf::from("/from/cli.db"));
        assert_eq!(
            database_path(&Options::default(), &config).unwrap(),
            PathBuf::from("/from/config.db")
        );
    }

    #[tokio::test]
    async fn test_seed_only_into_empty_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_if_empty(&db).await.unwrap();
        assert_eq!(db.products().count().await.unwrap(), 20);

        db.products().update_stock("1001", -3).await.unwrap();
        seed_if_empty(&db).await.unwrap();
        let milk = db.products().get("1001").await.unwrap().unwrap();
        assert_eq!(milk.stock, sample_inventory()[0].stock - 3);
    }
}
