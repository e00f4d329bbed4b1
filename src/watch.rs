//! One complete watch run.
//!
//! ```text
//! load previous snapshot ─► walk listing ─► check bylines (optional)
//!        ─► build current snapshot ─► diff ─► notify ─► save
//! ```
//!
//! Every step runs to completion before the next starts. The store is read
//! once at the beginning and written once at the end, after all network work
//! is done, so an interrupted run leaves the previous snapshot untouched.

use crate::config::WatchConfig;
use crate::diff::{ChangeSet, diff};
use crate::http::HttpClient;
use crate::models::{Article, Attribution, ListedArticle, Snapshot};
use crate::outputs::message::{ReportOptions, render};
use crate::outputs::telegram::{DeliveryReport, Messenger, deliver};
use crate::scrapers::attribution::{AttributionCheck, AuthorCheck, check_articles};
use crate::scrapers::listing::{Listing, fetch_all_articles};
use crate::store::{SnapshotStore, StoreError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// No previous snapshot: the current one was recorded, nothing reported.
    Baseline,
    /// Changes were found and reported.
    Changes,
    NoChanges,
    /// The listing came back empty while articles were recorded before;
    /// treated as a scraping failure, nothing reported or saved.
    EmptyListing,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Baseline => "baseline recorded",
            RunMode::Changes => "changes detected",
            RunMode::NoChanges => "no changes",
            RunMode::EmptyListing => "empty listing, snapshot kept",
        })
    }
}

/// What a run did, printed to stdout when it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub mode: RunMode,
    /// Articles in the fresh listing.
    pub listed: usize,
    pub added: usize,
    pub removed: usize,
    pub attribution_changed: usize,
    /// Messages rendered from the change set.
    pub messages: Vec<String>,
    pub delivery: DeliveryReport,
    pub saved: bool,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} listed, {} added, {} removed, {} author changes, {}/{} messages sent, snapshot {}",
            self.mode,
            self.listed,
            self.added,
            self.removed,
            self.attribution_changed,
            self.delivery.sent,
            self.messages.len(),
            if self.saved { "saved" } else { "not saved" },
        )
    }
}

impl RunSummary {
    fn new(mode: RunMode, listed: usize) -> Self {
        Self {
            mode,
            listed,
            added: 0,
            removed: 0,
            attribution_changed: 0,
            messages: Vec::new(),
            delivery: DeliveryReport::default(),
            saved: false,
        }
    }

    fn record(&mut self, changes: &ChangeSet) {
        self.added = changes.added.len();
        self.removed = changes.removed.len();
        self.attribution_changed = changes.attribution_changed.len();
    }
}

/// Build the current snapshot from a fresh listing.
///
/// Titles come from the listing. Authors come from this run's checks when they
/// ran, otherwise they are carried over from `previous`. First-seen times are
/// carried over for known URLs and set to `now` for new ones.
pub fn build_snapshot(
    listed: &[ListedArticle],
    checks: &HashMap<String, AttributionCheck>,
    previous: &Snapshot,
    now: DateTime<Utc>,
) -> Snapshot {
    listed
        .iter()
        .map(|item| {
            let known = previous.get(&item.url);
            let author = match checks.get(&item.url) {
                Some(check) => Attribution::from(check.clone()),
                None => known.map(|a| a.author.clone()).unwrap_or_default(),
            };
            let first_seen_at = match known {
                Some(article) => article.first_seen_at,
                None => Some(now),
            };
            let article = Article {
                title: item.title.clone(),
                author,
                first_seen_at,
            };
            (item.url.clone(), article)
        })
        .collect()
}

fn report_options(config: &WatchConfig) -> ReportOptions {
    let url = &config.author_url;
    let source = format!(
        "{}{}",
        url.host_str().unwrap_or_default(),
        url.path().trim_end_matches('/')
    );
    ReportOptions {
        source,
        max_len: config.notify.max_message_len,
        max_messages: config.notify.max_messages,
        new_article_attribution: config.new_article_attribution,
    }
}

/// Run one watch pass.
///
/// Only store failures are fatal. Listing and article fetch failures shape
/// the snapshot; notification failures are logged and counted.
#[instrument(level = "info", skip_all, fields(author_url = %config.author_url))]
pub async fn run<M: Messenger>(
    config: &WatchConfig,
    client: &HttpClient,
    store: &mut dyn SnapshotStore,
    messenger: Option<&M>,
) -> Result<RunSummary, StoreError> {
    let previous = store.load()?;
    info!(count = previous.len(), "Previous snapshot loaded");

    let listed = fetch_all_articles(client, &Listing::from_config(config)).await;
    if listed.is_empty() && !previous.is_empty() {
        warn!(
            previous = previous.len(),
            "Listing is empty but articles were recorded before; keeping previous snapshot"
        );
        return Ok(RunSummary::new(RunMode::EmptyListing, 0));
    }

    let checks: HashMap<String, AttributionCheck> = match &config.author_name {
        Some(expected) => {
            let check = AuthorCheck {
                expected: expected.clone(),
                selector: config.selectors.author.clone(),
                delay: config.delay,
            };
            check_articles(client, &listed, &check).await.into_iter().collect()
        }
        None => HashMap::new(),
    };

    let current = build_snapshot(&listed, &checks, &previous, Utc::now());

    let mut summary = if previous.is_empty() {
        info!(count = current.len(), "First run; recording baseline without notifications");
        RunSummary::new(RunMode::Baseline, listed.len())
    } else {
        let changes = diff(&previous, &current);
        debug!(total = changes.len(), "Snapshots compared");
        let mode = if changes.is_empty() {
            RunMode::NoChanges
        } else {
            RunMode::Changes
        };
        let mut summary = RunSummary::new(mode, listed.len());
        summary.record(&changes);
        summary.messages = render(&changes, &report_options(config));
        summary
    };

    if !summary.messages.is_empty() {
        info!(
            added = summary.added,
            removed = summary.removed,
            attribution_changed = summary.attribution_changed,
            messages = summary.messages.len(),
            "Changes detected"
        );
        match (messenger, config.dry_run) {
            (Some(messenger), false) => {
                summary.delivery = deliver(messenger, &summary.messages).await;
            }
            (_, true) => info!("Dry run; notifications not sent"),
            (None, false) => warn!("Notifications disabled; printing messages instead"),
        }
    }

    if config.dry_run {
        info!("Dry run; snapshot not saved");
    } else {
        store.save(&current)?;
        summary.saved = true;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::config::{DelayRange, FileConfig, NewArticleAttribution};
    use crate::models::AttributionStatus;
    use crate::outputs::telegram::NotifyError;
    use crate::store::JsonStore;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Messenger for RecordingMessenger {
        async fn send(&self, text: &str) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(text.to_string());
            if self.fail {
                Err(NotifyError::Rejected("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    fn config(server: &MockServer, author_name: Option<&str>) -> WatchConfig {
        let url = format!("{}/author/yuri/", server.uri());
        let mut args = vec!["--author-url", url.as_str()];
        if let Some(name) = author_name {
            args.extend(["--author-name", name]);
        }
        let mut config = WatchConfig::resolve(&Cli::from_args(&args), FileConfig::default()).unwrap();
        config.delay = DelayRange::ZERO;
        config
    }

    fn client() -> HttpClient {
        HttpClient::new("byline-test/1.0", Duration::from_secs(5)).unwrap()
    }

    async fn mount_listing(server: &MockServer, links: &[(&str, &str)]) {
        let items: String = links
            .iter()
            .map(|(href, title)| format!(r#"<h2 class="entry-title"><a href="{href}">{title}</a></h2>"#))
            .collect();
        Mock::given(method("GET"))
            .and(path("/author/yuri/page/1/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(items))
            .mount(server)
            .await;
    }

    async fn mount_article(server: &MockServer, at: &str, byline: &str) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(r#"<span class="author vcard">{byline}</span>"#)),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn test_build_snapshot_carries_state() {
        let seen = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let ok = Attribution::checked(AttributionStatus::Ok, None);

        let mut previous = Snapshot::new();
        let mut old = Article::new("Old title").with_author(ok.clone());
        old.first_seen_at = Some(seen);
        previous.insert("A", old);

        let listed = vec![
            ListedArticle {
                url: "A".into(),
                title: "New title".into(),
            },
            ListedArticle {
                url: "B".into(),
                title: "B".into(),
            },
        ];
        let current = build_snapshot(&listed, &HashMap::new(), &previous, now);

        let a = current.get("A").unwrap();
        assert_eq!(a.title, "New title");
        assert_eq!(a.author, ok);
        assert_eq!(a.first_seen_at, Some(seen));
        let b = current.get("B").unwrap();
        assert_eq!(b.author, Attribution::Unchecked);
        assert_eq!(b.first_seen_at, Some(now));
    }

    #[tokio::test]
    async fn test_first_run_records_baseline_silently() {
        let server = MockServer::start().await;
        mount_listing(&server, &[("/a/", "T1")]).await;
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::new(dir.path().join("articles.json"));
        let messenger = RecordingMessenger::default();

        let summary = run(&config(&server, None), &client(), &mut store, Some(&messenger))
            .await
            .unwrap();

        assert_eq!(summary.mode, RunMode::Baseline);
        assert!(summary.saved);
        assert!(messenger.sent.lock().unwrap().is_empty());
        let stored = store.load().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.get(&format!("{}/a/", server.uri())).unwrap().title, "T1");
    }

    #[tokio::test]
    async fn test_added_and_removed_are_notified() {
        let server = MockServer::start().await;
        mount_listing(&server, &[("/a/", "T1"), ("/b/", "T2")]).await;
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::new(dir.path().join("articles.json"));
        let mut previous = Snapshot::new();
        previous.insert(format!("{}/a/", server.uri()), Article::new("T1"));
        previous.insert(format!("{}/c/", server.uri()), Article::new("T3"));
        store.save(&previous).unwrap();
        let messenger = RecordingMessenger::default();

        let summary = run(&config(&server, None), &client(), &mut store, Some(&messenger))
            .await
            .unwrap();

        assert_eq!(summary.mode, RunMode::Changes);
        assert_eq!((summary.added, summary.removed), (1, 1));
        assert_eq!(summary.delivery, DeliveryReport { sent: 1, failed: 0 });
        let sent = messenger.sent.lock().unwrap();
        assert!(sent[0].contains(">T2</a>"));
        assert!(sent[0].contains("Removed articles"));
        assert!(sent[0].contains(">T3</a>"));

        let stored = store.load().unwrap();
        assert_eq!(stored.len(), 2);
        assert!(!stored.contains(&format!("{}/c/", server.uri())));
    }

    #[tokio::test]
    async fn test_delivery_failure_still_saves() {
        let server = MockServer::start().await;
        mount_listing(&server, &[("/a/", "T1"), ("/b/", "T2")]).await;
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::new(dir.path().join("articles.json"));
        let mut previous = Snapshot::new();
        previous.insert(format!("{}/a/", server.uri()), Article::new("T1"));
        store.save(&previous).unwrap();
        let messenger = RecordingMessenger {
            fail: true,
            ..Default::default()
        };

        let summary = run(&config(&server, None), &client(), &mut store, Some(&messenger))
            .await
            .unwrap();

        assert_eq!(summary.delivery, DeliveryReport { sent: 0, failed: 1 });
        assert!(summary.saved);
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_listing_keeps_previous_snapshot() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::new(dir.path().join("articles.json"));
        let mut previous = Snapshot::new();
        previous.insert("https://example.com/a/", Article::new("T1"));
        store.save(&previous).unwrap();
        let messenger = RecordingMessenger::default();

        let summary = run(&config(&server, None), &client(), &mut store, Some(&messenger))
            .await
            .unwrap();

        assert_eq!(summary.mode, RunMode::EmptyListing);
        assert!(!summary.saved);
        assert!(messenger.sent.lock().unwrap().is_empty());
        assert_eq!(store.load().unwrap(), previous);
    }

    #[tokio::test]
    async fn test_attribution_change_detected_across_runs() {
        let server = MockServer::start().await;
        mount_listing(&server, &[("/a/", "T1")]).await;
        mount_article(&server, "/a/", "Redazione").await;
        let url = format!("{}/a/", server.uri());

        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::new(dir.path().join("articles.json"));
        let mut previous = Snapshot::new();
        previous.insert(
            url.clone(),
            Article::new("T1").with_author(Attribution::checked(
                AttributionStatus::Ok,
                Some("Yuri".into()),
            )),
        );
        store.save(&previous).unwrap();
        let messenger = RecordingMessenger::default();

        let summary = run(&config(&server, Some("Yuri")), &client(), &mut store, Some(&messenger))
            .await
            .unwrap();

        assert_eq!(summary.attribution_changed, 1);
        let sent = messenger.sent.lock().unwrap();
        assert!(sent[0].contains("<i>Yuri</i> → <i>Redazione</i>"));
        assert_eq!(
            store.load().unwrap().get(&url).unwrap().author.status(),
            Some(AttributionStatus::AuthorChanged)
        );
    }

    #[tokio::test]
    async fn test_flag_policy_marks_new_uncredited_article() {
        let server = MockServer::start().await;
        mount_listing(&server, &[("/a/", "T1"), ("/b/", "T2")]).await;
        mount_article(&server, "/a/", "Yuri").await;
        mount_article(&server, "/b/", "Mario").await;

        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::new(dir.path().join("articles.json"));
        let mut previous = Snapshot::new();
        previous.insert(
            format!("{}/a/", server.uri()),
            Article::new("T1").with_author(Attribution::checked(
                AttributionStatus::Ok,
                Some("Yuri".into()),
            )),
        );
        store.save(&previous).unwrap();
        let messenger = RecordingMessenger::default();
        let mut config = config(&server, Some("Yuri"));
        config.new_article_attribution = NewArticleAttribution::Flag;

        let summary = run(&config, &client(), &mut store, Some(&messenger)).await.unwrap();

        assert_eq!((summary.added, summary.attribution_changed), (1, 0));
        let sent = messenger.sent.lock().unwrap();
        assert!(sent[0].contains("T2</a> ⚠️ <i>Mario</i>"));
    }

    #[tokio::test]
    async fn test_dry_run_neither_sends_nor_saves() {
        let server = MockServer::start().await;
        mount_listing(&server, &[("/a/", "T1"), ("/b/", "T2")]).await;
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::new(dir.path().join("articles.json"));
        let mut previous = Snapshot::new();
        previous.insert(format!("{}/a/", server.uri()), Article::new("T1"));
        store.save(&previous).unwrap();
        let messenger = RecordingMessenger::default();
        let mut config = config(&server, None);
        config.dry_run = true;

        let summary = run(&config, &client(), &mut store, Some(&messenger)).await.unwrap();

        assert_eq!(summary.messages.len(), 1);
        assert!(!summary.saved);
        assert!(messenger.sent.lock().unwrap().is_empty());
        assert_eq!(store.load().unwrap(), previous);
    }
}
