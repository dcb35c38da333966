// Transit delay watch: polls line status, prints the delay summary and keeps
// a rolling daily history on disk.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use transit_delay_watch::display::{day_detail, render_snapshot};
use transit_delay_watch::{AppConfig, FileBlobStore, HistoryTracker, StatusClient, StatusPoller};

#[derive(Parser, Debug)]
#[command(name = "transit-delay-watch")]
#[command(about = "Watch transit line status and keep a rolling delay history")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fetch once, print the summary and exit
    #[arg(long)]
    once: bool,

    /// Print the stored history for one day (YYYY-MM-DD) and exit
    #[arg(long, value_name = "DATE")]
    day: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    let store = match &config.storage_dir {
        Some(dir) => FileBlobStore::new(dir),
        None => FileBlobStore::in_cache_dir(),
    };
    info!(path = %store.path_for(&config.storage_key).display(), "delay history location");

    let tracker = HistoryTracker::new(Box::new(store), config.history_settings()?);

    if let Some(date) = &args.day {
        match day_detail(tracker.records(), date) {
            Some(detail) => print!("{}", detail),
            None => println!("No delay history recorded for {}", date),
        }
        return Ok(());
    }
    let client = StatusClient::new(config.endpoint_url.as_str(), config.request_timeout())
        .context("failed to create status client")?;
    let mut poller = StatusPoller::new(Arc::new(client), tracker, config.poll_interval());

    if args.once {
        let snapshot = poller.poll_once().await;
        println!("{}", render_snapshot(&snapshot));
        if let Some(error) = snapshot.error {
            anyhow::bail!(error);
        }
        return Ok(());
    }

    println!("\n🚇 Transit delay watch");
    println!("📡 Source: {}", config.endpoint_url);
    println!("🔄 Refresh: every {} seconds", config.poll_interval_secs);
    println!("🗓️  History: {} days\n", config.retention_days);

    let handle = poller.spawn();
    let mut updates = handle.subscribe();

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                println!("{}", render_snapshot(&snapshot));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
