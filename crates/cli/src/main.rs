//! Tangogi CLI - drive the cart store from a terminal.
//!
//! State lives in a data directory (one JSON file per key), so several
//! processes pointed at the same directory behave like browser tabs sharing
//! one origin.
//!
//! # Usage
//!
//! ```bash
//! # Browse the catalog
//! tangogi catalog
//! tangogi catalog --category meat
//!
//! # Add to cart and show totals
//! tangogi cart add prod-001 -q 2
//! tangogi cart show
//!
//! # Wishlist
//! tangogi wishlist toggle prod-003
//! tangogi wishlist move prod-003
//!
//! # Follow changes made from another terminal
//! tangogi watch
//! ```
//!
//! # Environment Variables
//!
//! - `TANGOGI_DATA_DIR` - Data directory (default: `.tangogi`)
//! - `TANGOGI_CATALOG` - Catalog YAML file (default: built-in demo catalog)
//! - `RUST_LOG` - Log filter (default: `tangogi_cli=info,tangogi_cart=info`)
//! - `TANGOGI_LOG_FORMAT` - `json` for structured output
//! - `TANGOGI_*` store settings, see `tangogi_cart::config`

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tangogi_cart::storage::FileStorage;
use tangogi_cart::{CartStore, StoreConfig};
use tracing_subscriber::EnvFilter;

mod catalog;
mod commands;

use catalog::Catalog;

#[derive(Parser)]
#[command(name = "tangogi")]
#[command(author, version, about = "Tangogi cart and wishlist tools")]
struct Cli {
    /// Directory holding the persisted cart and wishlist
    #[arg(long, env = "TANGOGI_DATA_DIR", default_value = ".tangogi", global = true)]
    data_dir: PathBuf,

    /// Catalog YAML file (defaults to the built-in demo catalog)
    #[arg(long, env = "TANGOGI_CATALOG", global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog products
    Catalog {
        /// Only show products in this category (e.g. `fresh-produce`)
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Manage the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Follow changes written by other processes
    Watch {
        /// Poll interval in milliseconds
        #[arg(short, long, default_value_t = 500)]
        interval: u64,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Add a product
    Add {
        /// Catalog product id
        product_id: String,

        /// Quantity to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Remove a line (line id or product id)
    Remove { line: String },
    /// Set a line's quantity; zero or less removes it
    Set {
        /// Line id or product id
        line: String,

        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Show lines and totals
    Show,
    /// Remove every line
    Clear,
}

#[derive(Subcommand)]
enum WishlistAction {
    /// Add or remove a product
    Toggle { product_id: String },
    /// Move a wishlisted product into the cart
    Move { product_id: String },
    /// Show wishlist entries
    Show,
    /// Remove every entry
    Clear,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tangogi_cli=info,tangogi_cart=info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if std::env::var("TANGOGI_LOG_FORMAT").is_ok_and(|format| format == "json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = match &cli.catalog {
        Some(path) => Catalog::from_file(path).await?,
        None => Catalog::builtin()?,
    };

    if let Commands::Catalog { category } = &cli.command {
        commands::catalog::list(&catalog, category.as_deref());
        return Ok(());
    }

    let config = StoreConfig::from_env()?;
    let storage = FileStorage::open(cli.data_dir.clone())?;
    let opened = CartStore::open(storage, config);
    opened.advisories.iter().for_each(commands::report);
    let mut store = opened.into_value();

    match cli.command {
        Commands::Catalog { .. } => {}
        Commands::Cart { action } => match action {
            CartAction::Add {
                product_id,
                quantity,
            } => commands::cart::add(&mut store, &catalog, &product_id, quantity)?,
            CartAction::Remove { line } => commands::cart::remove(&mut store, &line)?,
            CartAction::Set { line, quantity } => {
                commands::cart::set(&mut store, &line, quantity)?;
            }
            CartAction::Show => commands::cart::show(&store),
            CartAction::Clear => commands::cart::clear(&mut store),
        },
        Commands::Wishlist { action } => match action {
            WishlistAction::Toggle { product_id } => {
                commands::wishlist::toggle(&mut store, &catalog, &product_id)?;
            }
            WishlistAction::Move { product_id } => {
                commands::wishlist::move_to_cart(&mut store, &catalog, &product_id)?;
            }
            WishlistAction::Show => commands::wishlist::show(&store, &catalog),
            WishlistAction::Clear => commands::wishlist::clear(&mut store),
        },
        Commands::Watch { interval } => {
            commands::watch::run(&mut store, Duration::from_millis(interval)).await?;
        }
    }
    Ok(())
}
