//! # till-register
//!
//! ```bash
//! # First run on a fresh machine
//! till-register --seed
//!
//! # Scripted, machine-readable
//! till-register --db ./till.db --json < commands.txt
//! ```

use std::path::PathBuf;

use clap::Parser;

/// Till POS terminal register
#[derive(Parser, Debug)]
#[command(name = "till-register", version)]
#[command(about = "Single-till point of sale in the terminal", long_about = None)]
struct Args {
    /// Config file (default: platform config dir/register.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file path
    #[arg(short, long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Load the sample inventory if the database has no products
    #[arg(long)]
    seed: bool,

    /// Print each reply as one line of JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    till_register::run(till_register::Options {
        config: args.config,
        db: args.db,
        seed: args.seed,
        json: args.json,
    })
    .await
}
