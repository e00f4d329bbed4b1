//! Runtime configuration.
//!
//! Settings come from three layers, highest precedence first:
//!
//! 1. Command-line flags and their environment variables ([`Cli`])
//! 2. An optional YAML profile passed with `--config` ([`FileConfig`])
//! 3. Built-in defaults tuned for WordPress author archives
//!
//! [`WatchConfig::resolve`] merges the layers and validates the result before
//! any network I/O happens. Telegram credentials are only ever read from the
//! first layer so they never end up in a profile checked into a repository.
//!
//! # Example profile
//!
//! ```yaml
//! author_url: https://www.macitynet.it/author/yuri/
//! author_name: Yuri
//! selectors:
//!   listing: "h2.entry-title > a"
//!   author: "span.author.vcard"
//! max_pages: 40
//! delay:
//!   min_ms: 1000
//!   max_ms: 3000
//! store: sqlite:state/articles.sqlite
//! notify:
//!   max_message_len: 4000
//! ```

use crate::cli::Cli;
use crate::outputs::message::MIN_MESSAGE_LEN;
use clap::ValueEnum;
use rand::{Rng, rng};
use scraper::Selector;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;

pub const DEFAULT_LISTING_SELECTOR: &str = "h2.entry-title > a";
pub const DEFAULT_AUTHOR_SELECTOR: &str = "span.author.vcard";
pub const DEFAULT_MAX_PAGES: usize = 50;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STORE: &str = "json:articles.json";
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 4000;
pub const DEFAULT_MAX_MESSAGES: usize = 5;
pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("no author listing URL given (use --author-url, BYLINE_AUTHOR_URL or `author_url`)")]
    MissingAuthorUrl,
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid CSS selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("delay lower bound {min_ms}ms exceeds upper bound {max_ms}ms")]
    InvalidDelay { min_ms: u64, max_ms: u64 },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("notify.max_message_len must be at least {min} (got {got})")]
    MessageTooShort { min: usize, got: usize },
    #[error("invalid store location {0:?} (expected json:<path> or sqlite:<path>)")]
    InvalidStore(String),
}

/// Whether newly added articles also surface their attribution in reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NewArticleAttribution {
    /// New articles are reported as added, nothing more.
    #[default]
    Ignore,
    /// New articles whose check was not `Ok` are annotated in the report.
    Flag,
}

/// Bounds of the randomized pause between consecutive requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min_ms: 1000,
            max_ms: 3000,
        }
    }
}

impl DelayRange {
    #[cfg(test)]
    pub const ZERO: DelayRange = DelayRange { min_ms: 0, max_ms: 0 };

    /// Pick a pause uniformly within the bounds.
    pub fn pick(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng().random_range(self.min_ms..=self.max_ms))
    }
}

/// Where the snapshot lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum StoreLocation {
    Json(PathBuf),
    Sqlite(PathBuf),
}

impl FromStr for StoreLocation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("json", path)) if !path.is_empty() => Ok(StoreLocation::Json(path.into())),
            Some(("sqlite", path)) if !path.is_empty() => Ok(StoreLocation::Sqlite(path.into())),
            _ => Err(ConfigError::InvalidStore(s.to_string())),
        }
    }
}

impl TryFrom<String> for StoreLocation {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Json(path) => write!(f, "json:{}", path.display()),
            StoreLocation::Sqlite(path) => write!(f, "sqlite:{}", path.display()),
        }
    }
}

/// Compiled CSS selectors describing the tracked site's markup.
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    /// Matches the title links on a listing page.
    pub listing: Selector,
    /// Matches the structured byline on an article page, if the site has one.
    pub author: Option<Selector>,
}

impl SiteSelectors {
    pub fn parse(listing: &str, author: Option<&str>) -> Result<Self, ConfigError> {
        let author = match author.map(str::trim) {
            None | Some("") => None,
            Some(sel) => Some(compile_selector(sel)?),
        };
        Ok(Self {
            listing: compile_selector(listing)?,
            author,
        })
    }
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self::parse(DEFAULT_LISTING_SELECTOR, Some(DEFAULT_AUTHOR_SELECTOR))
            .expect("default selectors are valid")
    }
}

fn compile_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Limits and endpoint for outgoing notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifySettings {
    /// Maximum characters per message body.
    pub max_message_len: usize,
    /// Maximum messages sent for one run; overflow entries are summarised.
    pub max_messages: usize,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }
}

/// Credentials and endpoint for the Telegram Bot API.
#[derive(Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub api_base: String,
    pub token: String,
    pub chat_id: String,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Optional YAML profile. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub author_url: Option<String>,
    pub author_name: Option<String>,
    #[serde(default)]
    pub selectors: FileSelectors,
    pub max_pages: Option<usize>,
    pub max_articles: Option<usize>,
    pub delay: Option<DelayRange>,
    pub user_agent: Option<String>,
    pub timeout_secs: Option<u64>,
    pub new_article_attribution: Option<NewArticleAttribution>,
    pub store: Option<StoreLocation>,
    #[serde(default)]
    pub notify: FileNotify,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSelectors {
    pub listing: Option<String>,
    /// An empty string disables the structured byline lookup.
    pub author: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileNotify {
    pub max_message_len: Option<usize>,
    pub max_messages: Option<usize>,
    pub api_base: Option<String>,
}

impl FileConfig {
    /// Load a YAML profile from disk.
    #[instrument(level = "info", fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&text)?;
        info!("Loaded config profile");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Fully resolved and validated settings for one run.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Author archive URL; listing pages are `{author_url}/page/{n}/`.
    pub author_url: Url,
    /// Expected byline. `None` disables attribution checks.
    pub author_name: Option<String>,
    pub selectors: SiteSelectors,
    pub max_pages: usize,
    pub max_articles: Option<usize>,
    pub delay: DelayRange,
    pub user_agent: String,
    pub timeout: Duration,
    pub new_article_attribution: NewArticleAttribution,
    pub store: StoreLocation,
    pub notify: NotifySettings,
    /// `None` disables delivery; messages are only printed.
    pub telegram: Option<TelegramConfig>,
    /// Fetch and report without sending or saving.
    pub dry_run: bool,
}

impl WatchConfig {
    /// Merge CLI values over a profile over defaults and validate the result.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let raw_url = cli
            .author_url
            .clone()
            .or(file.author_url)
            .ok_or(ConfigError::MissingAuthorUrl)?;
        let author_url = Url::parse(&raw_url).map_err(|source| ConfigError::InvalidUrl {
            url: raw_url.clone(),
            source,
        })?;

        let author_name = cli
            .author_name
            .clone()
            .or(file.author_name)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        let listing = cli
            .listing_selector
            .clone()
            .or(file.selectors.listing)
            .unwrap_or_else(|| DEFAULT_LISTING_SELECTOR.to_string());
        let author_selector = cli
            .author_selector
            .clone()
            .or(file.selectors.author)
            .unwrap_or_else(|| DEFAULT_AUTHOR_SELECTOR.to_string());
        let selectors = SiteSelectors::parse(&listing, Some(&author_selector))?;

        let max_pages = cli.max_pages.or(file.max_pages).unwrap_or(DEFAULT_MAX_PAGES);
        if max_pages == 0 {
            return Err(ConfigError::Zero("max_pages"));
        }
        let max_articles = cli.max_articles.or(file.max_articles);
        if max_articles == Some(0) {
            return Err(ConfigError::Zero("max_articles"));
        }

        let file_delay = file.delay.unwrap_or_default();
        let delay = DelayRange {
            min_ms: cli.delay_min_ms.unwrap_or(file_delay.min_ms),
            max_ms: cli.delay_max_ms.unwrap_or(file_delay.max_ms),
        };
        if delay.min_ms > delay.max_ms {
            return Err(ConfigError::InvalidDelay {
                min_ms: delay.min_ms,
                max_ms: delay.max_ms,
            });
        }

        let timeout_secs = cli
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::Zero("timeout_secs"));
        }

        let store = match cli.store.as_deref() {
            Some(location) => location.parse::<StoreLocation>()?,
            None => match file.store {
                Some(location) => location,
                None => DEFAULT_STORE.parse::<StoreLocation>()?,
            },
        };

        let notify = NotifySettings {
            max_message_len: file
                .notify
                .max_message_len
                .unwrap_or(DEFAULT_MAX_MESSAGE_LEN),
            max_messages: file.notify.max_messages.unwrap_or(DEFAULT_MAX_MESSAGES),
        };
        if notify.max_message_len < MIN_MESSAGE_LEN {
            return Err(ConfigError::MessageTooShort {
                min: MIN_MESSAGE_LEN,
                got: notify.max_message_len,
            });
        }
        if notify.max_messages == 0 {
            return Err(ConfigError::Zero("notify.max_messages"));
        }

        let api_base = cli
            .telegram_api
            .clone()
            .or(file.notify.api_base)
            .unwrap_or_else(|| DEFAULT_TELEGRAM_API.to_string());
        let telegram = match (cli.telegram_token.as_deref(), cli.telegram_chat_id.as_deref()) {
            (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
                Some(TelegramConfig {
                    api_base: api_base.trim_end_matches('/').to_string(),
                    token: token.to_string(),
                    chat_id: chat_id.to_string(),
                })
            }
            (None, None) => None,
            _ => {
                warn!("Telegram token or chat id missing; notifications disabled");
                None
            }
        };

        Ok(Self {
            author_url,
            author_name,
            selectors,
            max_pages,
            max_articles,
            delay,
            user_agent: cli
                .user_agent
                .clone()
                .or(file.user_agent)
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            timeout: Duration::from_secs(timeout_secs),
            new_article_attribution: cli
                .new_article_attribution
                .or(file.new_article_attribution)
                .unwrap_or_default(),
            store,
            notify,
            telegram,
            dry_run: cli.dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::from_args(args)
    }

    #[test]
    fn test_defaults_apply_when_only_url_given() {
        let config = WatchConfig::resolve(
            &cli(&["--author-url", "https://example.com/author/yuri/"]),
            FileConfig::default(),
        )
        .unwrap();

        assert_eq!(config.author_url.as_str(), "https://example.com/author/yuri/");
        assert_eq!(config.max_pages, DEFAULT_MAX_PAGES);
        assert_eq!(config.delay, DelayRange::default());
        assert_eq!(config.store, StoreLocation::Json("articles.json".into()));
        assert_eq!(config.new_article_attribution, NewArticleAttribution::Ignore);
        assert!(config.selectors.author.is_some());
        assert_eq!(config.notify, NotifySettings::default());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = FileConfig::from_yaml(
            r#"
author_url: https://file.example/author/a/
author_name: From File
max_pages: 7
delay:
  min_ms: 10
  max_ms: 20
store: sqlite:state.db
"#,
        )
        .unwrap();
        let config = WatchConfig::resolve(
            &cli(&[
                "--author-url",
                "https://cli.example/author/b/",
                "--max-pages",
                "3",
                "--delay-max-ms",
                "50",
            ]),
            file,
        )
        .unwrap();

        assert_eq!(config.author_url.host_str(), Some("cli.example"));
        assert_eq!(config.author_name.as_deref(), Some("From File"));
        assert_eq!(config.max_pages, 3);
        assert_eq!(config.delay, DelayRange { min_ms: 10, max_ms: 50 });
        assert_eq!(config.store, StoreLocation::Sqlite("state.db".into()));
    }

    #[test]
    fn test_empty_author_selector_disables_byline_lookup() {
        let config = WatchConfig::resolve(
            &cli(&["--author-url", "https://example.com/a/", "--author-selector", ""]),
            FileConfig::default(),
        )
        .unwrap();
        assert!(config.selectors.author.is_none());
    }

    #[test]
    fn test_validation_errors() {
        let err = WatchConfig::resolve(&cli(&[]), FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingAuthorUrl));

        let err = WatchConfig::resolve(
            &cli(&["--author-url", "https://example.com/", "--listing-selector", "h2[[["]),
            FileConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSelector { .. }));

        let err = WatchConfig::resolve(
            &cli(&[
                "--author-url",
                "https://example.com/",
                "--delay-min-ms",
                "5000",
                "--delay-max-ms",
                "100",
            ]),
            FileConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDelay { .. }));

        let err = WatchConfig::resolve(
            &cli(&["--author-url", "https://example.com/", "--max-pages", "0"]),
            FileConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Zero("max_pages")));
    }

    #[test]
    fn test_store_location_parsing() {
        assert_eq!(
            "json:data/a.json".parse::<StoreLocation>().unwrap(),
            StoreLocation::Json("data/a.json".into())
        );
        assert_eq!(
            "sqlite:db.sqlite".parse::<StoreLocation>().unwrap(),
            StoreLocation::Sqlite("db.sqlite".into())
        );
        assert!("postgres:x".parse::<StoreLocation>().is_err());
        assert!("json:".parse::<StoreLocation>().is_err());
    }

    #[test]
    fn test_message_length_floor() {
        let file = FileConfig::from_yaml("notify:\n  max_message_len: 100\n").unwrap();
        let err = WatchConfig::resolve(&cli(&["--author-url", "https://example.com/"]), file)
            .unwrap_err();
        assert!(matches!(err, ConfigError::MessageTooShort { min: MIN_MESSAGE_LEN, got: 100 }));
    }

    #[test]
    fn test_unknown_yaml_keys_rejected() {
        assert!(FileConfig::from_yaml("author_urll: https://x/").is_err());
    }

    #[test]
    fn test_telegram_requires_both_values() {
        let config = WatchConfig::resolve(
            &cli(&[
                "--author-url",
                "https://example.com/",
                "--telegram-token",
                "123:abc",
                "--telegram-chat-id",
                "42",
                "--telegram-api",
                "http://localhost:9/",
            ]),
            FileConfig::default(),
        )
        .unwrap();
        let telegram = config.telegram.unwrap();
        assert_eq!(telegram.api_base, "http://localhost:9");
        assert!(!format!("{telegram:?}").contains("abc"));
    }

    #[test]
    fn test_delay_pick_within_bounds() {
        let range = DelayRange { min_ms: 5, max_ms: 9 };
        for _ in 0..50 {
            let d = range.pick().as_millis();
            assert!((5..=9).contains(&d));
        }
        assert_eq!(DelayRange::ZERO.pick(), Duration::ZERO);
    }
}
