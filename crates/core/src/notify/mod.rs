mod email;
mod telegram;

pub use email::SmtpNotifier;
pub use telegram::{fit_message, TelegramNotifier, TELEGRAM_CEILING, TRUNCATION_MARKER};

use crate::domain::report::Report;
use chrono::NaiveDate;

/// A report on its way out, with the date it was produced for.
#[derive(Debug, Clone, Copy)]
pub struct OutgoingReport<'a> {
    pub report: &'a Report,
    pub run_date: NaiveDate,
}

#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, report: &OutgoingReport<'_>) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("Telegram error: {0}")]
    Telegram(String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug)]
pub struct DeliveryOutcome {
    pub channel: String,
    pub result: Result<(), NotificationError>,
}

impl DeliveryOutcome {
    pub fn delivered(&self) -> bool {
        self.result.is_ok()
    }
}

/// Sends one report to every channel. A failing channel never blocks the others.
#[derive(Default)]
pub struct Dispatcher {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Box<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub async fn dispatch(&self, report: &OutgoingReport<'_>) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let result = channel.send(report).await;
            match &result {
                Ok(()) => tracing::info!(channel = channel.name(), "report delivered"),
                Err(e) => {
                    tracing::error!(channel = channel.name(), error = %e, "report delivery failed");
                    let err = anyhow::anyhow!("{} delivery failed: {e}", channel.name());
                    sentry_anyhow::capture_anyhow(&err);
                }
            }
            outcomes.push(DeliveryOutcome {
                channel: channel.name().to_string(),
                result,
            });
        }
        outcomes
    }
}

/// Escapes text for HTML bodies (email and Telegram HTML parse mode).
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
