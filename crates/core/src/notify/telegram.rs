use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::Settings;
use crate::notify::{escape_html, NotificationChannel, NotificationError, OutgoingReport};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const HEADER: &str = "<b>Daily Stock Report</b>\n\n";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Furthest a cut may move back to reach whitespace.
const WHITESPACE_WINDOW: usize = 200;

/// Stays under Telegram's 4096 character message limit.
pub const TELEGRAM_CEILING: usize = 4000;
pub const TRUNCATION_MARKER: &str = "\n\n...[truncated]";

pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let bot_token = settings.require_telegram_bot_token()?.to_string();
        let chat_id = settings.require_telegram_chat_id()?.to_string();
        let api_base = std::env::var("TELEGRAM_API_BASE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let timeout_secs = std::env::var("TELEGRAM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::new(api_base, bot_token, chat_id, Duration::from_secs(timeout_secs))
    }

    pub fn new(
        api_base: String,
        bot_token: String,
        chat_id: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build telegram http client")?;

        Ok(Self {
            client,
            api_base,
            bot_token,
            chat_id,
        })
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

/// Builds the HTML message and cuts it to at most `ceiling` characters.
///
/// A cut never lands inside an entity or a tag, backs off to whitespace only when
/// it is within [`WHITESPACE_WINDOW`] bytes, and is followed by [`TRUNCATION_MARKER`].
pub fn fit_message(body: &str, ceiling: usize) -> String {
    let full = format!("{HEADER}{}", escape_html(body));
    if full.chars().count() <= ceiling {
        return full;
    }

    let budget = ceiling.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut cut = full
        .char_indices()
        .nth(budget)
        .map(|(i, _)| i)
        .unwrap_or(full.len());

    let head = &full[..cut];
    if let Some(amp) = head.rfind('&') {
        if !head[amp..].contains(';') {
            cut = amp;
        }
    }
    let head = &full[..cut];
    if let Some(lt) = head.rfind('<') {
        if !head[lt..].contains('>') {
            cut = lt;
        }
    }
    let head = &full[..cut];
    if let Some(ws) = head.rfind(char::is_whitespace) {
        if ws >= HEADER.len() && cut - ws <= WHITESPACE_WINDOW {
            cut = ws;
        }
    }

    format!("{}{TRUNCATION_MARKER}", full[..cut].trim_end())
}

#[async_trait]
impl NotificationChannel for TelegramNotifier {
    async fn send(&self, report: &OutgoingReport<'_>) -> Result<(), NotificationError> {
        let text = fit_message(&report.report.body, TELEGRAM_CEILING);
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        );

        let res = self
            .client
            .post(url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text: &text,
                parse_mode: "HTML",
            })
            .send()
            .await
            // reqwest errors embed the URL, which carries the bot token.
            .map_err(|e| NotificationError::Transport(e.without_url().to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(NotificationError::Telegram(format!(
                "status={status} body={}",
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}
