//! Command-line interface definitions for Byline Watch.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Most options can also be supplied via environment variables, which is how
//! a scheduled CI job typically passes the Telegram credentials. Anything not
//! given here falls back to the `--config` profile and then to defaults (see
//! [`crate::config`]).

use crate::config::NewArticleAttribution;
use clap::Parser;
use std::fmt;

/// Command-line arguments for the Byline Watch application.
///
/// # Examples
///
/// ```sh
/// # Minimal run against a WordPress author archive
/// byline_watch --author-url https://www.macitynet.it/author/yuri/
///
/// # Verify the byline of every article and keep state in SQLite
/// byline_watch --author-url https://www.macitynet.it/author/yuri/ \
///     --author-name Yuri --store sqlite:scripts/db.sqlite
///
/// # Load site selectors and limits from a profile
/// byline_watch -c watch.yaml
/// ```
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML profile
    #[arg(short, long)]
    pub config: Option<String>,

    /// Author archive URL; pages are fetched from `{url}/page/{n}/`
    #[arg(long, env = "BYLINE_AUTHOR_URL")]
    pub author_url: Option<String>,

    /// Author name expected on every article page (enables attribution checks)
    #[arg(long, env = "BYLINE_AUTHOR_NAME")]
    pub author_name: Option<String>,

    /// CSS selector for title links on a listing page
    #[arg(long)]
    pub listing_selector: Option<String>,

    /// CSS selector for the byline on an article page ("" to search the full text)
    #[arg(long)]
    pub author_selector: Option<String>,

    /// Maximum number of listing pages to request
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Stop collecting once this many articles are listed
    #[arg(long)]
    pub max_articles: Option<usize>,

    /// Lower bound of the pause between requests, in milliseconds
    #[arg(long)]
    pub delay_min_ms: Option<u64>,

    /// Upper bound of the pause between requests, in milliseconds
    #[arg(long)]
    pub delay_max_ms: Option<u64>,

    /// User-Agent header sent with every request
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// How attribution of newly added articles is reported
    #[arg(long, value_enum)]
    pub new_article_attribution: Option<NewArticleAttribution>,

    /// Snapshot store: `json:<path>` or `sqlite:<path>`
    #[arg(short, long, env = "BYLINE_STORE")]
    pub store: Option<String>,

    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_token: Option<String>,

    /// Telegram chat id that receives the reports
    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    pub telegram_chat_id: Option<String>,

    /// Base URL of the Telegram Bot API
    #[arg(long, env = "TELEGRAM_API_BASE")]
    pub telegram_api: Option<String>,

    /// Fetch and report, but neither send notifications nor save the snapshot
    #[arg(long)]
    pub dry_run: bool,
}

impl fmt::Debug for Cli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cli")
            .field("config", &self.config)
            .field("author_url", &self.author_url)
            .field("author_name", &self.author_name)
            .field("max_pages", &self.max_pages)
            .field("max_articles", &self.max_articles)
            .field("store", &self.store)
            .field("telegram_token", &self.telegram_token.as_ref().map(|_| "<redacted>"))
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl Cli {
    /// The parser with every environment fallback removed.
    fn command_without_env() -> clap::Command {
        use clap::CommandFactory;
        Self::command().mut_args(|arg| arg.env(None::<&'static str>))
    }

    /// Parse `args` (without the program name) from the command line only,
    /// regardless of what the process environment exports.
    pub(crate) fn from_args(args: &[&str]) -> Self {
        use clap::FromArgMatches;
        let argv = std::iter::once("byline_watch").chain(args.iter().copied());
        let matches = Self::command_without_env().get_matches_from(argv);
        Self::from_arg_matches(&matches).unwrap()
    }
}
