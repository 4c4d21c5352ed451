//! stampdesk CLI - Address checks and postmark purchases.
//!
//! # Usage
//!
//! ```bash
//! # Show how a label address is parsed
//! stampdesk address label.txt
//!
//! # Show the purchase key of a label and whether it is cached
//! stampdesk key label.txt --product 290
//!
//! # Resolve postmarks for up to four labels (slot order = file order)
//! stampdesk postmarks a.txt b.txt --out ./print
//!
//! # Check API reachability and wallet balance
//! stampdesk status
//! ```
//!
//! # Commands
//!
//! - `address` - Parse an address block
//! - `key` - Compute a purchase key
//! - `postmarks` - Resolve postmarks, buying missing ones after confirmation
//! - `status` - API health and wallet balance

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use stampdesk_core::ProductCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;

#[derive(Parser)]
#[command(name = "stampdesk")]
#[command(author, version, about = "stampdesk postage tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an address block and show its fields
    Address {
        /// File holding the address block
        file: PathBuf,
    },
    /// Compute the purchase key of a label
    Key {
        /// File holding the receiver block
        file: PathBuf,

        /// Internetmarke product code
        #[arg(short, long)]
        product: ProductCode,

        /// Purchase date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Resolve postmarks for up to four labels
    Postmarks {
        /// Receiver files, one per slot in sheet order
        #[arg(required = true, num_args = 1..=4)]
        files: Vec<PathBuf>,

        /// Product for every label (default: per-country preselection)
        #[arg(short, long)]
        product: Option<ProductCode>,

        /// Purchase date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Buy without asking for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Directory for the `slot-<n>.png` files
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Check API reachability and wallet balance
    Status,
}

/// Initialize tracing with `RUST_LOG` (or our default) and optional JSON output.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stampdesk=info,stampdesk_postage=info".into());

    // JSON lines for log shippers, text for the terminal
    let json = std::env::var("STAMPDESK_LOG_JSON").is_ok();
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), error::CliError> {
    let today = || chrono::Local::now().date_naive();

    match cli.command {
        Commands::Address { file } => commands::address::show(&file).await?,
        Commands::Key {
            file,
            product,
            date,
        } => commands::address::key(&file, product, date.unwrap_or_else(today)).await?,
        Commands::Postmarks {
            files,
            product,
            date,
            yes,
            out,
        } => {
            let options = commands::postmarks::Options {
                product,
                date: date.unwrap_or_else(today),
                yes,
                out,
            };
            commands::postmarks::resolve(&files, &options).await?;
        }
        Commands::Status => commands::status::show().await?,
    }
    Ok(())
}
