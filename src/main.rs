use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use feedpace::config::Config;
use feedpace::feed::{FeedRsParser, HttpFetcher};
use feedpace::scheduler::{CycleSummary, DomainRateLimiter, FeedScheduler};
use feedpace::storage::Database;

/// Get the config directory path (~/.config/feedpace/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedpace"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedpace",
    about = "Adaptive feed refresh daemon with per-domain rate limiting"
)]
struct Args {
    /// Config file (default: ~/.config/feedpace/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database file, overrides the config file
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Subscribe to a feed URL before refreshing (repeatable)
    #[arg(long, value_name = "URL")]
    subscribe: Vec<String>,

    /// Run a single refresh cycle and exit
    #[arg(long)]
    once: bool,

    /// Print the --once summary as JSON
    #[arg(long, requires = "once")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = match args.database.clone().or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => {
            if !config_dir.exists() {
                std::fs::create_dir_all(&config_dir)
                    .context("Failed to create config directory")?;
            }
            config_dir.join("feeds.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    for url in &args.subscribe {
        let parsed = url::Url::parse(url).with_context(|| format!("Invalid feed URL: {}", url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("Feed URL must use http or https: {}", url);
        }
        let id = db
            .insert_feed(parsed.as_str(), parsed.as_str())
            .await
            .context("Failed to subscribe")?;
        tracing::info!(feed_id = id, url = %parsed, "Subscribed");
    }

    let fetcher =
        HttpFetcher::with_user_agent(&config.user_agent).context("Failed to build HTTP client")?;
    let scheduler = FeedScheduler::new(
        config.scheduler_config(),
        Arc::new(db),
        Arc::new(fetcher),
        Arc::new(FeedRsParser),
        Arc::new(DomainRateLimiter::new(config.rate_limit_config())),
    );

    if args.once {
        let summary = scheduler
            .refresh_now()
            .await
            .context("Refresh cycle failed")?;
        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to encode summary")?
            );
        } else {
            print_summary(&summary);
        }
        return Ok(());
    }

    scheduler.start()?;
    println!("feedpace running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    println!("Shutting down, waiting for in-flight fetches...");
    scheduler.stop().await;
    Ok(())
}

fn print_summary(summary: &CycleSummary) {
    println!(
        "Refreshed {} feeds in {:.1}s: {} updated, {} unchanged, {} failed, {} new articles",
        summary.fetched(),
        summary.duration.as_secs_f64(),
        summary.updated,
        summary.unchanged,
        summary.errored,
        summary.new_articles
    );
    if summary.not_due + summary.skipped_in_flight + summary.deferred > 0 {
        println!(
            "Skipped: {} not due, {} already in flight, {} deferred",
            summary.not_due, summary.skipped_in_flight, summary.deferred
        );
    }
    for result in &summary.results {
        if let Some(error) = &result.error {
            eprintln!("  feed {}: {}", result.feed_id, error);
        }
    }
}
