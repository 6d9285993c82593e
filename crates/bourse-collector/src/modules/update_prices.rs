//! Price synchronization run.
//!
//! Processes one instrument at a time, sequentially: resolve a ticker,
//! fetch the missing history, upsert, recompute freshness counters,
//! record the attempt. Failures stay contained to the instrument that
//! raised them; the run itself only aborts when target selection fails.

use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, error, info};

use bourse_core::{
    AttemptOutcome, EquityStore, EquityTarget, MarketDataProvider, PriceStore, QuoteCounts, Result,
    SyncError,
};
use bourse_data::{ResolverOptions, TickerResolver};

use crate::{CollectorConfig, RunStats};

/// Per-run options, typically from the CLI.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Fixed start date overriding the per-instrument incremental window.
    pub since: Option<NaiveDate>,
    /// Process at most this many instruments.
    pub limit: Option<i64>,
    /// Restrict the run to these local symbols.
    pub only: Option<Vec<String>>,
    /// Resolve and fetch, but write nothing.
    pub dry_run: bool,
    /// Claim each row by advancing its watermark before processing.
    pub claim: bool,
    /// Overrides the configured pause between instruments.
    pub pause_override: Option<Duration>,
}

/// Terminal outcome of one instrument.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Resolved, fetched and persisted.
    Updated {
        ticker: String,
        inserted: usize,
        counts: QuoteCounts,
    },
    /// Resolved and fetched, nothing written.
    DryRun { ticker: String, fetched: usize },
    /// No candidate ticker validated.
    Unresolved,
}

/// Values fixed for the whole run.
struct RunContext<'a> {
    resolver: TickerResolver,
    config: &'a CollectorConfig,
    options: &'a RunOptions,
    /// Today in the business timezone, pinned once so a run crossing
    /// midnight stays on a single calendar day.
    today: NaiveDate,
}

/// Synchronizes price history for every due instrument.
pub async fn update_prices<P, E, S>(
    provider: &P,
    equities: &E,
    prices: &S,
    config: &CollectorConfig,
    options: &RunOptions,
) -> Result<RunStats>
where
    P: MarketDataProvider + ?Sized,
    E: EquityStore + ?Sized,
    S: PriceStore + ?Sized,
{
    // LIMIT NULL disables the cap, but a negative bind would reach the
    // database as a bad statement.
    if let Some(limit) = options.limit {
        if limit < 0 {
            return Err(SyncError::InvalidInput(format!(
                "limit must not be negative: {}",
                limit
            )));
        }
    }

    let run_start = Instant::now();
    let mut stats = RunStats::new();

    let today = config.today();
    let targets = equities
        .targets(today, options.limit, options.only.as_deref())
        .await?;
    stats.total = targets.len();

    if targets.is_empty() {
        info!("no instrument due, nothing to do");
        stats.elapsed = run_start.elapsed();
        return Ok(stats);
    }

    info!(
        targets = targets.len(),
        today = %today,
        dry_run = options.dry_run,
        "price update started"
    );

    let pause = options.pause_override.unwrap_or_else(|| config.request_pause());
    let ctx = RunContext {
        resolver: TickerResolver::new(ResolverOptions {
            min_probe_quotes: config.probe_min_quotes,
            strict_suffix: config.strict_suffix,
        }),
        config,
        options,
        today,
    };

    for (idx, target) in targets.iter().enumerate() {
        let progress = format!("{}/{}", idx + 1, targets.len());

        if options.claim && !options.dry_run {
            match equities.claim(&target.key, today).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        progress = progress,
                        symbol = %target.key.symbol,
                        "already claimed, skipping"
                    );
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(progress = progress, symbol = %target.key.symbol, error = %e, "claim failed");
                    continue;
                }
            }
        }

        match process_instrument(provider, equities, prices, &ctx, target).await {
            Ok(SyncOutcome::Updated {
                ticker,
                inserted,
                counts,
            }) => {
                stats.updated += 1;
                stats.bars_inserted += inserted;
                info!(
                    progress = progress,
                    symbol = %target.key.symbol,
                    ticker = %ticker,
                    inserted = inserted,
                    cnt_1y = counts.last_year,
                    cnt_total = counts.total,
                    "instrument updated"
                );
            }
            Ok(SyncOutcome::DryRun { ticker, fetched }) => {
                stats.updated += 1;
                info!(
                    progress = progress,
                    symbol = %target.key.symbol,
                    ticker = %ticker,
                    fetched = fetched,
                    "dry run, nothing written"
                );
            }
            Ok(SyncOutcome::Unresolved) => {
                stats.unresolved += 1;
                info!(
                    progress = progress,
                    symbol = %target.key.symbol,
                    "no candidate ticker validated"
                );
            }
            Err(e) => {
                stats.failed += 1;
                error!(progress = progress, symbol = %target.key.symbol, error = %e, "instrument failed");

                // Failure still advances the watermark, otherwise the next
                // run inside the same day would retry forever.
                if !options.dry_run {
                    if let Err(mark_err) = equities
                        .mark_attempt(&target.key, today, &AttemptOutcome::failed())
                        .await
                    {
                        error!(
                            symbol = %target.key.symbol,
                            error = %mark_err,
                            "could not record failed attempt"
                        );
                    }
                }
            }
        }

        // Rate limiting
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    stats.elapsed = run_start.elapsed();
    Ok(stats)
}

/// Runs the full resolve / fetch / persist / recompute sequence for one
/// instrument. Any `Err` is an instrument-level failure handled by the
/// caller.
async fn process_instrument<P, E, S>(
    provider: &P,
    equities: &E,
    prices: &S,
    ctx: &RunContext<'_>,
    target: &EquityTarget,
) -> Result<SyncOutcome>
where
    P: MarketDataProvider + ?Sized,
    E: EquityStore + ?Sized,
    S: PriceStore + ?Sized,
{
    // A stored ticker is the cheapest path; re-check it before probing
    // naming conventions.
    let mut resolution = None;
    if let Some(known) = equities.existing_ticker(&target.key).await? {
        resolution = ctx.resolver.check_known(provider, &known).await;
    }
    if resolution.is_none() {
        resolution = ctx.resolver.resolve(provider, target).await;
    }

    let resolution = match resolution {
        Some(r) => r,
        None => {
            if !ctx.options.dry_run {
                equities
                    .mark_attempt(&target.key, ctx.today, &AttemptOutcome::failed())
                    .await?;
            }
            return Ok(SyncOutcome::Unresolved);
        }
    };

    // Incremental window from the stored history unless overridden.
    let since = match ctx.options.since {
        Some(date) => Some(date),
        None => prices.last_price_date(&target.key).await?,
    };

    let bars = provider
        .fetch_daily_history(&resolution.ticker, since)
        .await?;

    if ctx.options.dry_run {
        return Ok(SyncOutcome::DryRun {
            ticker: resolution.ticker,
            fetched: bars.len(),
        });
    }

    // Persist, then recompute from what is actually stored. An empty
    // fetch still refreshes counters and the watermark.
    let inserted = prices.upsert_bars(&target.key, &bars).await?;
    let counts = prices
        .recompute_counts(&target.key, ctx.config.window_cutoff(ctx.today))
        .await?;
    prices.update_quote_bounds(&target.key).await?;

    let outcome = AttemptOutcome {
        ticker: Some(resolution.ticker.clone()),
        valid: counts.last_year >= ctx.config.min_active_quotes,
        cnt_1y: counts.last_year,
        cnt_total: counts.total,
    };
    equities.mark_attempt(&target.key, ctx.today, &outcome).await?;

    Ok(SyncOutcome::Updated {
        ticker: resolution.ticker,
        inserted,
        counts,
    })
}
