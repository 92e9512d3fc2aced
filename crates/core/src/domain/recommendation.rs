use crate::domain::indicators::Indicators;
use crate::domain::portfolio::PortfolioEntry;
use crate::ingest::types::FetchFailure;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    Sell,
    Hold,
    Buy,
    StrongBuy,
}

impl Label {
    /// Ordered from weakest to strongest; indexed by the clamped raw score.
    pub const LADDER: [Label; 4] = [Label::Sell, Label::Hold, Label::Buy, Label::StrongBuy];

    pub fn from_raw_score(raw_score: u8) -> Self {
        Self::LADDER[usize::from(raw_score.min(3))]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Sell => "SELL",
            Label::Hold => "HOLD",
            Label::Buy => "BUY",
            Label::StrongBuy => "STRONG BUY",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Scored {
        raw_score: u8,
        label: Label,
        indicators: Indicators,
    },
    FetchError(FetchFailure),
}

/// Per-ticker result. Every portfolio entry produces exactly one of these.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub entry: PortfolioEntry,
    pub outcome: ScoreOutcome,
}

impl ScoreResult {
    pub fn ticker(&self) -> &str {
        &self.entry.ticker
    }

    pub fn fetch_ok(&self) -> bool {
        matches!(self.outcome, ScoreOutcome::Scored { .. })
    }

    pub fn label(&self) -> Option<Label> {
        match &self.outcome {
            ScoreOutcome::Scored { label, .. } => Some(*label),
            ScoreOutcome::FetchError(_) => None,
        }
    }

    pub fn raw_score(&self) -> Option<u8> {
        match &self.outcome {
            ScoreOutcome::Scored { raw_score, .. } => Some(*raw_score),
            ScoreOutcome::FetchError(_) => None,
        }
    }

    pub fn indicators(&self) -> Option<&Indicators> {
        match &self.outcome {
            ScoreOutcome::Scored { indicators, .. } => Some(indicators),
            ScoreOutcome::FetchError(_) => None,
        }
    }
}
