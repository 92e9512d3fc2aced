use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportSource {
    Generated,
    FallbackRaw,
    FallbackNoData,
}

/// The text delivered to every notification channel. `body` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub body: String,
    pub source: ReportSource,
}
