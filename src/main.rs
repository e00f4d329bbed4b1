//! # Byline Watch
//!
//! Watches an author's archive on a news site and reports what changed since
//! the previous run: articles that appeared, articles that disappeared, and
//! (optionally) articles whose byline no longer credits the author.
//!
//! ## Usage
//!
//! ```sh
//! TELEGRAM_BOT_TOKEN=... TELEGRAM_CHAT_ID=... \
//!     byline_watch --author-url https://example.com/author/yuri/ --author-name "Yuri"
//! ```
//!
//! The tool performs a single run and exits; schedule it with cron or a
//! systemd timer.
//!
//! ## Architecture
//!
//! 1. **Load**: read the snapshot recorded by the previous run
//! 2. **Scrape**: walk the paginated listing, then optionally check bylines
//! 3. **Diff**: compare the fresh snapshot with the previous one
//! 4. **Notify**: render the changes as HTML messages and send them
//! 5. **Save**: record the fresh snapshot for the next run

use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod diff;
mod http;
mod models;
mod outputs;
mod scrapers;
mod store;
mod utils;
mod watch;

use cli::Cli;
use config::{FileConfig, WatchConfig};
use http::HttpClient;
use outputs::telegram::TelegramNotifier;

#[tokio::main(flavor = "current_thread")]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    info!("byline_watch starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // ---- Configuration ----
    let file = match args.config.as_deref() {
        Some(path) => FileConfig::load(Path::new(path))?,
        None => FileConfig::default(),
    };
    let config = WatchConfig::resolve(&args, file)?;
    info!(
        author_url = %config.author_url,
        author_name = ?config.author_name,
        store = %config.store,
        max_pages = config.max_pages,
        telegram = config.telegram.is_some(),
        dry_run = config.dry_run,
        "Configuration resolved"
    );

    // ---- Collaborators ----
    let client = HttpClient::new(&config.user_agent, config.timeout)?;
    let mut store = store::open(&config.store)?;
    let notifier = config
        .telegram
        .clone()
        .map(|telegram| TelegramNotifier::new(telegram, config.timeout))
        .transpose()?;

    // ---- Run ----
    let summary = watch::run(&config, &client, store.as_mut(), notifier.as_ref()).await?;

    if notifier.is_none() || config.dry_run {
        for message in &summary.messages {
            println!("{message}\n");
        }
    }
    println!("{summary}");

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
