use std::path::PathBuf;

use anyhow::Result;
use barnivore_sync::SyncConfig;
use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "barnivore")]
#[command(about = "Scrape Barnivore company and product data into a SQLite database")]
struct Cli {
    /// Database file path [default: barnivore_YYYYMMDD.db]
    #[arg(long)]
    db: Option<PathBuf>,
    /// Delay before each company detail request, in seconds
    #[arg(long)]
    delay: Option<f64>,
    /// Override the API base URL
    #[arg(long)]
    base_url: Option<String>,
    /// Show database stats only
    #[arg(long)]
    stats_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    execute(Cli::parse()).await
}

/// Runs the selected mode and logs any failure before handing it back to `main`.
async fn execute(cli: Cli) -> Result<()> {
    if let Err(err) = run(cli).await {
        let chain = format!("{err:#}");
        error!(error = %chain, "scraping failed");
        return Err(err);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = SyncConfig::from_env();
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(delay) = cli.delay {
        config.detail_delay_secs = delay;
    }
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    if cli.stats_only {
        let counts = barnivore_sync::store_counts(&config.database_path).await?;
        println!("Database: {}", config.database_path.display());
        println!("Companies: {}", counts.companies);
        println!("Products: {}", counts.products);
        return Ok(());
    }

    let summary = barnivore_sync::run_sync_once(&config).await?;
    println!(
        "sync complete: run_id={} listed={} processed={} failed={} companies={} products={}",
        summary.run_id,
        summary.listed,
        summary.processed,
        summary.failed,
        summary.counts.companies,
        summary.counts.products
    );
    Ok(())
}
