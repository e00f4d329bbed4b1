//! HTTP transport shared by the listing fetcher and the attribution checker.
//!
//! Every request goes through one [`HttpClient`] so the `User-Agent` header
//! and timeout are applied uniformly. Callers decide what a failure means:
//! pagination treats it as the end of the listing, attribution checks map it
//! to `NotFound`.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Why a page could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    /// HTTP status of the failed response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Transport { .. } => None,
        }
    }
}

/// A `reqwest` client configured with the watcher's identity and timeout.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// GET `url` and return the decoded body of a successful response.
    ///
    /// Any non-2xx status is an error.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_html(&self, url: &str) -> Result<String, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(transport)?;
        debug!(bytes = body.len(), "Fetched page");
        Ok(body)
    }
}
