//! Batch price synchronization CLI.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bourse_collector::{modules, CollectorConfig};
use bourse_data::{ensure_schema, EquityRepository, PriceRepository, RetryPolicy, YahooChartClient};

#[derive(Parser)]
#[command(name = "bourse-collector")]
#[command(about = "Euronext equities price synchronization", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve tickers and synchronize daily price history
    UpdatePrices {
        /// Fixed start date (YYYY-MM-DD) overriding the incremental window
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Process at most this many instruments
        #[arg(long)]
        limit: Option<i64>,

        /// Only these local symbols (comma separated, e.g. "TTE,ASML")
        #[arg(long)]
        only: Option<String>,

        /// Resolve and fetch but write nothing
        #[arg(long)]
        dry_run: bool,

        /// Claim each row (advance its watermark) before processing
        #[arg(long)]
        claim: bool,

        /// Pause between instruments in milliseconds
        #[arg(long)]
        sleep_ms: Option<u64>,
    },

    /// Recompute counters from stored prices and report drift
    Validate {
        /// Rewrite drifted counters and bounds
        #[arg(long)]
        fix: bool,

        /// Days without a bar before an instrument counts as stale
        #[arg(long, default_value_t = 14)]
        stale_days: i64,
    },

    /// Create tables and indexes if missing
    InitSchema,

    /// Check database connectivity
    CheckDb,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "bourse_collector={},bourse_data={}",
                    cli.log_level, cli.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("bourse collector starting");

    let config = CollectorConfig::from_env()?;
    tracing::debug!(database_url = %config.database_url, "configuration loaded");

    let pool = sqlx::PgPool::connect(&config.database_url).await?;
    tracing::info!("database connection established");

    match cli.command {
        Commands::UpdatePrices {
            since,
            limit,
            only,
            dry_run,
            claim,
            sleep_ms,
        } => {
            let client = YahooChartClient::new(config.http_timeout())?
                .with_probe_window(config.probe_window_days)
                .with_retry(RetryPolicy {
                    max_attempts: config.max_retries,
                    base_delay: config.retry_base_delay(),
                });
            let equities = EquityRepository::new(pool.clone());
            let prices = PriceRepository::new(pool.clone());

            let options = modules::RunOptions {
                since,
                limit,
                only: only.map(|s| s.split(',').map(|p| p.trim().to_string()).collect()),
                dry_run,
                claim,
                pause_override: sleep_ms.map(std::time::Duration::from_millis),
            };

            let stats =
                modules::update_prices(&client, &equities, &prices, &config, &options).await?;
            stats.log_summary("price update");
        }
        Commands::Validate { fix, stale_days } => {
            let equities = EquityRepository::new(pool.clone());
            let prices = PriceRepository::new(pool.clone());

            let report =
                modules::validate_prices(&equities, &prices, &config, fix, stale_days).await?;
            if report.is_clean() {
                tracing::info!("nothing to report");
            }
        }
        Commands::InitSchema => {
            ensure_schema(&pool).await?;
        }
        Commands::CheckDb => {
            sqlx::query("SELECT 1").execute(&pool).await?;
            tracing::info!("database reachable");
        }
    }

    pool.close().await;
    tracing::info!("bourse collector finished");

    Ok(())
}
