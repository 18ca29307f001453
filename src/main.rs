use std::sync::Arc;
use tally::config::Config;
use tally::services::{JournalService, SqliteStore, TICK_TABLE_VERSION};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Opening journal at {} (fallback tick table v{}: {})",
        config.database_path,
        TICK_TABLE_VERSION,
        if config.journal.use_fallback_tick_table { "on" } else { "off" }
    );

    let store = Arc::new(SqliteStore::new(&config.database_path)?);
    let journal = JournalService::new(store, config.journal.clone())?;

    let summaries = journal.summaries()?;
    if summaries.is_empty() {
        warn!("No trades in journal");
        return Ok(());
    }

    for summary in summaries.iter().map(|s| s.for_display()) {
        let r = summary
            .r_multiple
            .map(|r| format!("{}R", r))
            .unwrap_or_else(|| "n/a".to_string());
        info!(
            "{} {} {} [{}] remaining {}/{} pnl {} r {}",
            summary.trade_id,
            summary.symbol,
            summary.direction,
            summary.status,
            summary.remaining_size,
            summary.position_size,
            summary.pnl,
            r
        );
    }

    let stats = tally::services::stats::journal_stats(&summaries);
    info!(
        "{} trades, {}% win rate, net {}, profit factor {}, average R {}",
        stats.total_trades,
        tally::services::pnl::round_display(stats.win_rate_pct),
        tally::services::pnl::round_display(stats.net_pnl),
        stats
            .profit_factor
            .map(|pf| tally::services::pnl::round_display(pf).to_string())
            .unwrap_or_else(|| "n/a".to_string()),
        stats
            .average_r
            .map(|r| tally::services::pnl::round_display(r).to_string())
            .unwrap_or_else(|| "n/a".to_string()),
    );

    Ok(())
}
