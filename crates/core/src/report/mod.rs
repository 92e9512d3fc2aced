pub mod format;

use crate::analysis::scoring::ScoringMode;
use crate::domain::recommendation::ScoreResult;
use crate::domain::report::{Report, ReportSource};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::TextGenerator;

const INSTRUCTION: &str = "Write a short email summary. Tell me:\n\
1. My best stock right now\n\
2. My biggest risk\n\
3. One thing I should do today\n\n\
Keep it under 200 words.";

pub fn prompt(listing: &str) -> String {
    format!("You are my stock analyst. Here's my portfolio data:\n{listing}\n\n{INSTRUCTION}")
}

/// Turns score results into the report body sent to every channel.
#[derive(Debug, Clone, Copy)]
pub struct ReportSynthesizer {
    mode: ScoringMode,
}

impl ReportSynthesizer {
    pub fn new(mode: ScoringMode) -> Self {
        Self { mode }
    }

    pub async fn synthesize(
        &self,
        results: &[ScoreResult],
        generator: Option<&dyn TextGenerator>,
    ) -> Report {
        let listing = format::listing(results, self.mode);

        if !results.iter().any(ScoreResult::fetch_ok) {
            tracing::warn!(total = results.len(), "no market data fetched; skipping summary");
            return Report {
                body: format!(
                    "Could not fetch market data for any of the {} stocks in your portfolio.\n{listing}",
                    results.len()
                ),
                source: ReportSource::FallbackNoData,
            };
        }

        let Some(generator) = generator else {
            return Report {
                body: format!("AI summary skipped. Here is raw data:\n{listing}"),
                source: ReportSource::FallbackRaw,
            };
        };

        let provider = generator.provider();
        match generator.generate(&prompt(&listing)).await {
            Ok(text) if !text.trim().is_empty() => {
                tracing::info!(%provider, chars = text.len(), "summary generated");
                Report {
                    body: text,
                    source: ReportSource::Generated,
                }
            }
            Ok(_) => {
                tracing::warn!(%provider, "summary generation returned blank text");
                raw_fallback(listing)
            }
            Err(err) => {
                tracing::error!(%provider, error = %err, "summary generation failed");
                if let Some(diag) = err.downcast_ref::<LlmDiagnosticsError>() {
                    tracing::debug!(stage = diag.stage, raw_output = ?diag.raw_output, "generation diagnostics");
                }
                sentry_anyhow::capture_anyhow(&err);
                raw_fallback(listing)
            }
        }
    }
}

fn raw_fallback(listing: String) -> Report {
    Report {
        body: format!("AI failed. Here is raw data:\n{listing}"),
        source: ReportSource::FallbackRaw,
    }
}
