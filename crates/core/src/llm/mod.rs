pub mod anthropic;
pub mod error;
pub mod gemini;

use crate::config::Settings;
use crate::error::ConfigurationError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    Gemini,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Anthropic => f.write_str("anthropic"),
            Provider::Gemini => f.write_str("gemini"),
        }
    }
}

/// Best-effort text generation. Callers must treat every error as recoverable.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Builds the configured generator, or `None` when no provider key is set.
///
/// `TEXT_PROVIDER` picks explicitly; otherwise the first configured key wins.
pub fn from_settings(settings: &Settings) -> anyhow::Result<Option<Box<dyn TextGenerator>>> {
    let provider = match settings.text_provider.as_deref() {
        Some(name) => match name.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Some(Provider::Anthropic),
            "gemini" => Some(Provider::Gemini),
            "none" | "off" => None,
            other => {
                return Err(ConfigurationError::InvalidSetting {
                    name: "TEXT_PROVIDER",
                    detail: format!("unknown provider {other:?}"),
                }
                .into())
            }
        },
        None if settings.anthropic_api_key.is_some() => Some(Provider::Anthropic),
        None if settings.gemini_api_key.is_some() => Some(Provider::Gemini),
        None => None,
    };

    let generator: Box<dyn TextGenerator> = match provider {
        Some(Provider::Anthropic) => Box::new(anthropic::AnthropicClient::from_settings(settings)?),
        Some(Provider::Gemini) => Box::new(gemini::GeminiClient::from_settings(settings)?),
        None => return Ok(None),
    };
    Ok(Some(generator))
}
