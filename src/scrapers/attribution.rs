//! Per-article byline verification.
//!
//! For each listed article the page is fetched and searched for the expected
//! author's name: first in the structured byline element (when the site's
//! author selector matches), otherwise anywhere in the visible text. The test
//! is a case-insensitive substring match, so markup variations in the byline
//! ("di Yuri", "Yuri R.") still count as credited.

use crate::config::DelayRange;
use crate::http::HttpClient;
use crate::models::{Attribution, AttributionStatus, ListedArticle};
use crate::utils::{collapse_whitespace, contains_name};
use futures::stream::{self, StreamExt};
use scraper::{ElementRef, Html, Selector};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Elements whose text never renders.
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Result of checking one article page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionCheck {
    pub status: AttributionStatus,
    /// Byline text, when the page exposes a structured byline element.
    pub byline: Option<String>,
}

impl AttributionCheck {
    pub fn not_found() -> Self {
        Self {
            status: AttributionStatus::NotFound,
            byline: None,
        }
    }
}

impl From<AttributionCheck> for Attribution {
    fn from(check: AttributionCheck) -> Self {
        Attribution::checked(check.status, check.byline)
    }
}

/// Who to look for and where.
#[derive(Debug, Clone)]
pub struct AuthorCheck {
    pub expected: String,
    pub selector: Option<Selector>,
    pub delay: DelayRange,
}

/// Fetch `url` and decide whether it credits the expected author.
///
/// Fetch failures map to [`AttributionStatus::NotFound`]; they are not retried.
#[instrument(level = "info", skip(client, check), fields(expected = %check.expected))]
pub async fn check_author(client: &HttpClient, url: &str, check: &AuthorCheck) -> AttributionCheck {
    match client.get_html(url).await {
        Ok(body) => inspect_article(&body, &check.expected, check.selector.as_ref()),
        Err(e) => {
            warn!(status = ?e.status(), error = %e, "Article page unavailable");
            AttributionCheck::not_found()
        }
    }
}

/// Check every listed article, one after another, pausing between requests.
///
/// Returns `(url, result)` pairs in listing order.
#[instrument(level = "info", skip_all, fields(count = articles.len()))]
pub async fn check_articles(
    client: &HttpClient,
    articles: &[ListedArticle],
    check: &AuthorCheck,
) -> Vec<(String, AttributionCheck)> {
    let results: Vec<(String, AttributionCheck)> = stream::iter(articles.iter().enumerate())
        .then(|(i, article)| async move {
            if i > 0 {
                sleep(check.delay.pick()).await;
            }
            let result = check_author(client, &article.url, check).await;
            debug!(url = %article.url, status = ?result.status, "Checked attribution");
            (article.url.clone(), result)
        })
        .collect()
        .await;

    let credited = results
        .iter()
        .filter(|(_, r)| r.status == AttributionStatus::Ok)
        .count();
    info!(checked = results.len(), credited, "Attribution checks complete");
    results
}

/// Decide attribution from an already fetched article page.
pub fn inspect_article(html: &str, expected: &str, selector: Option<&Selector>) -> AttributionCheck {
    let document = Html::parse_document(html);

    let byline = selector
        .and_then(|sel| document.select(sel).next())
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty());

    let present = match &byline {
        Some(text) => contains_name(text, expected),
        None => contains_name(&visible_text(&document), expected),
    };

    AttributionCheck {
        status: if present {
            AttributionStatus::Ok
        } else {
            AttributionStatus::AuthorChanged
        },
        byline,
    }
}

fn visible_text(document: &Html) -> String {
    let mut out = String::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| HIDDEN_ELEMENTS.contains(&el.value().name()));
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    out
}
