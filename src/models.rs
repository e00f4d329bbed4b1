//! Data models for tracked articles and snapshots.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ListedArticle`]: A `(url, title)` pair scraped from one listing page
//! - [`Attribution`]: Whether (and how) an article's byline was verified
//! - [`Article`]: The stored attributes of one tracked article
//! - [`Snapshot`]: Every tracked article at one point in time, keyed by URL
//!
//! Snapshots are ordered maps so that iteration, and therefore every report
//! built from them, is lexicographic by URL and reproducible across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

/// An article link as found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedArticle {
    /// Absolute URL of the article.
    pub url: String,
    /// Link text with whitespace collapsed.
    pub title: String,
}

/// Outcome of checking one article page for the expected author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionStatus {
    /// The expected author's name is present on the page.
    Ok,
    /// The page loaded but the expected author's name is absent.
    AuthorChanged,
    /// The page could not be fetched (transport error or non-success status).
    NotFound,
}

impl fmt::Display for AttributionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AttributionStatus::Ok => "credited",
            AttributionStatus::AuthorChanged => "not credited",
            AttributionStatus::NotFound => "page unavailable",
        };
        f.write_str(label)
    }
}

/// Author attribution of an article.
///
/// `Unchecked` means no attribution check ran for this article (checks
/// disabled, or the entry predates them). It is distinct from a check that
/// ran and did not find the author, and it never produces a change report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case", from = "StoredAttribution")]
pub enum Attribution {
    #[default]
    Unchecked,
    Checked {
        status: AttributionStatus,
        /// Text of the structured byline element, when the page exposes one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        byline: Option<String>,
    },
}

/// Every shape an `author` value has been written in.
///
/// Older snapshot files store the byline as a bare string, or `null` when no
/// byline was found.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredAttribution {
    Tagged(TaggedAttribution),
    Byline(Option<String>),
}

#[derive(Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
enum TaggedAttribution {
    Unchecked,
    Checked {
        status: AttributionStatus,
        #[serde(default)]
        byline: Option<String>,
    },
}

impl From<StoredAttribution> for Attribution {
    fn from(stored: StoredAttribution) -> Self {
        match stored {
            StoredAttribution::Tagged(TaggedAttribution::Unchecked) => Attribution::Unchecked,
            StoredAttribution::Tagged(TaggedAttribution::Checked { status, byline }) => {
                Attribution::Checked { status, byline }
            }
            StoredAttribution::Byline(Some(byline)) => {
                Attribution::checked(AttributionStatus::Ok, Some(byline))
            }
            StoredAttribution::Byline(None) => Attribution::Unchecked,
        }
    }
}

impl Attribution {
    pub fn checked(status: AttributionStatus, byline: Option<String>) -> Self {
        Attribution::Checked { status, byline }
    }

    pub fn status(&self) -> Option<AttributionStatus> {
        match self {
            Attribution::Unchecked => None,
            Attribution::Checked { status, .. } => Some(*status),
        }
    }

    /// Whether two observations of the same article agree.
    ///
    /// An unchecked side agrees with anything.
    pub fn agrees_with(&self, other: &Attribution) -> bool {
        match (self, other) {
            (Attribution::Unchecked, _) | (_, Attribution::Unchecked) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Attribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribution::Unchecked => f.write_str("unchecked"),
            Attribution::Checked {
                status: AttributionStatus::NotFound,
                ..
            } => write!(f, "{}", AttributionStatus::NotFound),
            Attribution::Checked {
                byline: Some(byline),
                ..
            } => f.write_str(byline),
            Attribution::Checked { status, byline: None } => write!(f, "{status}"),
        }
    }
}

/// The stored attributes of one article, keyed externally by its URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub author: Attribution,
    /// When the article first appeared in a snapshot of this listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen_at: Option<DateTime<Utc>>,
}

impl Article {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: Attribution::Unchecked,
            first_seen_at: None,
        }
    }

    pub fn with_author(mut self, author: Attribution) -> Self {
        self.author = author;
        self
    }
}

/// Every tracked article at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    articles: BTreeMap<String, Article>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the article stored under `url`.
    pub fn insert(&mut self, url: impl Into<String>, article: Article) -> Option<Article> {
        self.articles.insert(url.into(), article)
    }

    pub fn get(&self, url: &str) -> Option<&Article> {
        self.articles.get(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.articles.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// Iterate `(url, article)` pairs in URL order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Article> {
        self.articles.iter()
    }
}

impl FromIterator<(String, Article)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, Article)>>(iter: I) -> Self {
        Self {
            articles: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a String, &'a Article);
    type IntoIter = btree_map::Iter<'a, String, Article>;

    fn into_iter(self) -> Self::IntoIter {
        self.articles.iter()
    }
}
