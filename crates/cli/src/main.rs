//! Góngora CLI - database migrations and geo snapshot tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! gongora migrate
//!
//! # Refresh the region/comuna snapshot used when the DPA API is down
//! gongora geo export --dir crates/storefront/data
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "gongora")]
#[command(author, version, about = "Góngora storefront CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Region and comuna data
    Geo {
        #[command(subcommand)]
        action: GeoAction,
    },
}

#[derive(Subcommand)]
enum GeoAction {
    /// Write `regiones.json` and `comunas_by_region.json` from the DPA API
    Export {
        /// Output directory
        #[arg(short, long, default_value = "crates/storefront/data")]
        dir: PathBuf,

        /// DPA API base URL
        #[arg(
            long,
            env = "GEO_API_BASE_URL",
            default_value = gongora_storefront::config::DPA_BASE_URL
        )]
        base_url: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Geo { action } => match action {
            GeoAction::Export { dir, base_url } => {
                commands::geo::export(&dir, &base_url).await?;
            }
        },
    }
    Ok(())
}
