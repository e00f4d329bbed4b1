//! Delivery through the Telegram Bot API.
//!
//! Messages are posted to `sendMessage` with HTML parse mode and link previews
//! disabled. Delivery is best-effort: [`deliver`] logs every failure and
//! reports counts, it never returns an error to the run.

use crate::config::TelegramConfig;
use crate::utils::truncate_for_log;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Why a message was not delivered.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("rejected by API: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL embeds the bot token.
        NotifyError::Transport(e.without_url())
    }
}

/// Something that can deliver one rendered message.
pub trait Messenger {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends messages to one Telegram chat.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.config.api_base, self.config.token)
    }
}

impl Messenger for TelegramNotifier {
    #[instrument(level = "info", skip_all, fields(chat_id = %self.config.chat_id, chars = text.chars().count()))]
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let form = [
            ("chat_id", self.config.chat_id.as_str()),
            ("text", text),
            ("parse_mode", "HTML"),
            ("disable_web_page_preview", "true"),
        ];
        let response = self.client.post(self.endpoint()).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }
        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(ApiResponse { ok: true, .. }) => Ok(()),
            Ok(ApiResponse { description, .. }) => Err(NotifyError::Rejected(
                description.unwrap_or_else(|| "no description".to_string()),
            )),
            Err(e) => {
                warn!(error = %e, "Unparseable API response; assuming delivered");
                Ok(())
            }
        }
    }
}

/// Outcome of delivering a batch of messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

/// Send `messages` in order. Failures are logged and counted, never fatal.
#[instrument(level = "info", skip_all, fields(count = messages.len()))]
pub async fn deliver<M: Messenger>(messenger: &M, messages: &[String]) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for (index, message) in messages.iter().enumerate() {
        match messenger.send(message).await {
            Ok(()) => report.sent += 1,
            Err(e) => {
                error!(index, error = %e, "Failed to deliver notification");
                report.failed += 1;
            }
        }
    }
    info!(sent = report.sent, failed = report.failed, "Notification delivery finished");
    report
}
