//! Snapshot comparison.
//!
//! [`compare`] is the raw set difference between two snapshots. [`diff`] is
//! what a run reports: identical, except that comparing against an empty
//! previous snapshot yields nothing, since the first run only records a
//! baseline.
//!
//! Both walk `BTreeMap`-backed snapshots, so every list in a [`ChangeSet`] is
//! sorted by URL and the same inputs always give the same output.

use crate::models::{Article, Attribution, Snapshot};

/// One article on either side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub url: String,
    pub article: Article,
}

/// An article present in both snapshots whose attribution changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionChange {
    pub url: String,
    /// Title as currently listed.
    pub title: String,
    pub previous: Attribution,
    pub current: Attribution,
}

/// Differences between two snapshots. The three lists are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// In the current snapshot only; carries the current article.
    pub added: Vec<Entry>,
    /// In the previous snapshot only; carries the previous article.
    pub removed: Vec<Entry>,
    pub attribution_changed: Vec<AttributionChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.attribution_changed.is_empty()
    }

    /// Total number of reported entries.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.attribution_changed.len()
    }
}

/// Raw difference from `previous` to `current`.
pub fn compare(previous: &Snapshot, current: &Snapshot) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (url, article) in current {
        match previous.get(url) {
            None => changes.added.push(Entry {
                url: url.clone(),
                article: article.clone(),
            }),
            Some(old) if !old.author.agrees_with(&article.author) => {
                changes.attribution_changed.push(AttributionChange {
                    url: url.clone(),
                    title: article.title.clone(),
                    previous: old.author.clone(),
                    current: article.author.clone(),
                })
            }
            Some(_) => {}
        }
    }

    changes.removed = previous
        .iter()
        .filter(|(url, _)| !current.contains(url))
        .map(|(url, article)| Entry {
            url: url.clone(),
            article: article.clone(),
        })
        .collect();

    changes
}

/// Changes worth reporting for a run.
///
/// Empty when `previous` is empty: that run establishes the baseline.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> ChangeSet {
    if previous.is_empty() {
        return ChangeSet::default();
    }
    compare(previous, current)
}
