//! Scrapers for the tracked author's pages.
//!
//! Scraping follows a two-phase pattern:
//!
//! 1. **Listing**: walk the author archive and collect `(url, title)` pairs
//!    ([`listing`])
//! 2. **Attribution**: optionally fetch each article and verify the byline
//!    ([`attribution`])
//!
//! Both phases run strictly sequentially with a randomized pause between
//! requests. Failed fetches never abort a run: a failed listing page ends the
//! walk, a failed article page is recorded as `NotFound`.

pub mod attribution;
pub mod listing;
