//! Author archive pagination.
//!
//! WordPress-style author archives list posts across pages at
//! `{author_url}/page/{n}/`. This module walks those pages in order and
//! collects every title link matched by the listing selector.
//!
//! # Termination
//!
//! The walk stops at the first of:
//! - a transport failure or non-success status (indistinguishable from the
//!   end of the archive, so never reported as an error)
//! - a page without any matching link
//! - the configured article cap
//! - the page ceiling, itself clamped to [`HARD_PAGE_CAP`]

use crate::config::{DelayRange, WatchConfig};
use crate::http::HttpClient;
use crate::models::ListedArticle;
use crate::utils::collapse_whitespace;
use itertools::Itertools;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Upper bound on listing pages per run, whatever the configuration says.
pub const HARD_PAGE_CAP: usize = 500;

/// What to paginate and how far.
#[derive(Debug, Clone)]
pub struct Listing {
    pub base_url: Url,
    pub selector: Selector,
    pub max_pages: usize,
    pub max_articles: Option<usize>,
    pub delay: DelayRange,
}

impl Listing {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            base_url: config.author_url.clone(),
            selector: config.selectors.listing.clone(),
            max_pages: config.max_pages,
            max_articles: config.max_articles,
            delay: config.delay,
        }
    }

    /// URL of listing page `page` (1-based). The query string is kept.
    pub fn page_url(&self, page: usize) -> Url {
        let mut url = self.base_url.clone();
        let path = format!("{}/page/{page}/", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_fragment(None);
        url
    }
}

/// Fetch every article currently listed, in listing order.
///
/// URLs are unique in the result; when pagination shifts between requests and
/// an article shows up twice, the first occurrence is kept.
#[instrument(level = "info", skip_all, fields(base = %listing.base_url))]
pub async fn fetch_all_articles(client: &HttpClient, listing: &Listing) -> Vec<ListedArticle> {
    let ceiling = listing.max_pages.min(HARD_PAGE_CAP);
    let mut articles: Vec<ListedArticle> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut pages_read = 0usize;

    for page in 1..=ceiling {
        let page_url = listing.page_url(page);
        let body = match client.get_html(page_url.as_str()).await {
            Ok(body) => body,
            Err(e) if page == 1 => {
                warn!(page, error = %e, "First listing page unavailable");
                break;
            }
            Err(e) => {
                info!(page, status = ?e.status(), error = %e, "Listing page unavailable; treating as end of listing");
                break;
            }
        };
        pages_read = page;

        let found = parse_listing_page(&body, &page_url, &listing.selector);
        if found.is_empty() {
            info!(page, "No articles on page; end of listing");
            break;
        }

        let before = articles.len();
        for article in found {
            if seen.insert(article.url.clone()) {
                articles.push(article);
            }
        }
        debug!(page, new = articles.len() - before, total = articles.len(), "Parsed listing page");

        if let Some(cap) = listing.max_articles.filter(|cap| articles.len() >= *cap) {
            articles.truncate(cap);
            info!(cap, "Article cap reached");
            break;
        }
        if page == ceiling {
            warn!(ceiling, "Page ceiling reached before the end of the listing");
            break;
        }

        let delay = listing.delay.pick();
        debug!(?delay, "Pausing before next listing page");
        sleep(delay).await;
    }

    info!(count = articles.len(), pages = pages_read, "Collected listing");
    articles
}

/// Extract `(url, title)` pairs from one listing page.
///
/// Relative hrefs are resolved against `page_url` and fragments dropped.
/// Links without an href or with blank text are skipped.
pub fn parse_listing_page(html: &str, page_url: &Url, selector: &Selector) -> Vec<ListedArticle> {
    let document = Html::parse_document(html);
    document
        .select(selector)
        .filter_map(|element| {
            let href = element.value().attr("href")?;
            let mut url = page_url.join(href.trim()).ok()?;
            url.set_fragment(None);
            let title = collapse_whitespace(&element.text().collect::<String>());
            if title.is_empty() {
                debug!(%url, "Skipping link without text");
                return None;
            }
            Some(ListedArticle {
                url: url.to_string(),
                title,
            })
        })
        .unique_by(|article| article.url.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_LISTING_SELECTOR;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn listing_html(links: &[(&str, &str)]) -> String {
        let items: String = links
            .iter()
            .map(|(href, title)| {
                format!(r#"<article><h2 class="entry-title"><a href="{href}">{title}</a></h2></article>"#)
            })
            .collect();
        format!("<html><body><main>{items}</main></body></html>")
    }

    fn listing(server: &MockServer, max_pages: usize, max_articles: Option<usize>) -> Listing {
        Listing {
            base_url: Url::parse(&format!("{}/author/yuri/", server.uri())).unwrap(),
            selector: Selector::parse(DEFAULT_LISTING_SELECTOR).unwrap(),
            max_pages,
            max_articles,
            delay: DelayRange::ZERO,
        }
    }

    fn client() -> HttpClient {
        HttpClient::new("byline-test/1.0", Duration::from_secs(5)).unwrap()
    }

    async fn mount_page(server: &MockServer, page: usize, body: String) {
        Mock::given(method("GET"))
            .and(path(format!("/author/yuri/page/{page}/")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_page_url_normalises_trailing_slash() {
        let mut l = Listing {
            base_url: Url::parse("https://example.com/author/yuri/").unwrap(),
            selector: Selector::parse("a").unwrap(),
            max_pages: 1,
            max_articles: None,
            delay: DelayRange::ZERO,
        };
        assert_eq!(l.page_url(3).as_str(), "https://example.com/author/yuri/page/3/");
        l.base_url = Url::parse("https://example.com/author/yuri").unwrap();
        assert_eq!(l.page_url(1).as_str(), "https://example.com/author/yuri/page/1/");
    }

    #[test]
    fn test_page_url_keeps_query_string() {
        let l = Listing {
            base_url: Url::parse("https://example.com/author/yuri/?lang=it#top").unwrap(),
            selector: Selector::parse("a").unwrap(),
            max_pages: 1,
            max_articles: None,
            delay: DelayRange::ZERO,
        };
        assert_eq!(
            l.page_url(2).as_str(),
            "https://example.com/author/yuri/page/2/?lang=it"
        );
    }

    #[test]
    fn test_parse_listing_page_resolves_and_cleans() {
        let html = r##"
            <h2 class="entry-title"><a href="/2024/05/m4-review/#comments">  M4
                review </a></h2>
            <h2 class="entry-title"><a href="https://other.example/x/">Absolute</a></h2>
            <h2 class="entry-title"><a>No href</a></h2>
            <h2 class="entry-title"><a href="/blank/">   </a></h2>
            <h2 class="entry-title"><a href="/2024/05/m4-review/">Duplicate</a></h2>
            <h3 class="entry-title"><a href="/ignored/">Wrong heading</a></h3>
        "##;
        let base = Url::parse("https://example.com/author/yuri/page/1/").unwrap();
        let selector = Selector::parse(DEFAULT_LISTING_SELECTOR).unwrap();

        let found = parse_listing_page(html, &base, &selector);
        assert_eq!(
            found,
            vec![
                ListedArticle {
                    url: "https://example.com/2024/05/m4-review/".into(),
                    title: "M4 review".into(),
                },
                ListedArticle {
                    url: "https://other.example/x/".into(),
                    title: "Absolute".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_paginates_until_non_success() {
        let server = MockServer::start().await;
        mount_page(&server, 1, listing_html(&[("/a/", "A"), ("/b/", "B")])).await;
        mount_page(&server, 2, listing_html(&[("/c/", "C")])).await;
        // page 3 is unmatched, wiremock answers 404

        let articles = fetch_all_articles(&client(), &listing(&server, 10, None)).await;
        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["A", "B", "C"]);
        assert_eq!(articles[2].url, format!("{}/c/", server.uri()));
    }

    #[tokio::test]
    async fn test_query_string_is_sent_with_every_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/author/yuri/page/1/"))
            .and(query_param("lang", "it"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&[("/a/", "A")])))
            .expect(1)
            .mount(&server)
            .await;

        let mut l = listing(&server, 10, None);
        l.base_url = Url::parse(&format!("{}/author/yuri/?lang=it", server.uri())).unwrap();
        let articles = fetch_all_articles(&client(), &l).await;
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].url, format!("{}/a/", server.uri()));
    }

    #[tokio::test]
    async fn test_stops_on_page_without_articles() {
        let server = MockServer::start().await;
        mount_page(&server, 1, listing_html(&[("/a/", "A")])).await;
        mount_page(&server, 2, "<html><body>Nothing here</body></html>".into()).await;
        Mock::given(method("GET"))
            .and(path("/author/yuri/page/3/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&[("/z/", "Z")])))
            .expect(0)
            .mount(&server)
            .await;

        let articles = fetch_all_articles(&client(), &listing(&server, 10, None)).await;
        assert_eq!(articles.len(), 1);
    }

    #[tokio::test]
    async fn test_respects_page_ceiling() {
        let server = MockServer::start().await;
        mount_page(&server, 1, listing_html(&[("/a/", "A")])).await;
        Mock::given(method("GET"))
            .and(path("/author/yuri/page/2/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&[("/b/", "B")])))
            .expect(0)
            .mount(&server)
            .await;

        let articles = fetch_all_articles(&client(), &listing(&server, 1, None)).await;
        assert_eq!(articles.len(), 1);
    }

    #[tokio::test]
    async fn test_article_cap_truncates() {
        let server = MockServer::start().await;
        mount_page(&server, 1, listing_html(&[("/a/", "A"), ("/b/", "B"), ("/c/", "C")])).await;
        mount_page(&server, 2, listing_html(&[("/d/", "D")])).await;

        let articles = fetch_all_articles(&client(), &listing(&server, 10, Some(2))).await;
        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["A", "B"]);
    }

    #[tokio::test]
    async fn test_duplicates_across_pages_keep_first() {
        let server = MockServer::start().await;
        mount_page(&server, 1, listing_html(&[("/a/", "A"), ("/b/", "B")])).await;
        mount_page(&server, 2, listing_html(&[("/b/", "B again"), ("/c/", "C")])).await;

        let articles = fetch_all_articles(&client(), &listing(&server, 10, None)).await;
        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_first_page_failure_yields_empty_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let articles = fetch_all_articles(&client(), &listing(&server, 10, None)).await;
        assert!(articles.is_empty());
    }
}
