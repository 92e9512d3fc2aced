use crate::domain::indicators::Indicators;
use crate::domain::recommendation::Label;
use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MOMENTUM_6M_MIN: f64 = 0.10;
const MOMENTUM_1M_MIN: f64 = 0.03;
const VOLATILITY_MAX: f64 = 0.03;
const PEG_MAX: f64 = 1.5;
const ROE_MIN: f64 = 0.15;
const DEBT_TO_EQUITY_MAX: f64 = 100.0;

/// Which indicator family a run scores on. Never mixed within one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    #[default]
    PriceHistory,
    Fundamentals,
}

impl ScoringMode {
    pub fn rules(self) -> &'static [Rule] {
        match self {
            ScoringMode::PriceHistory => &[Rule::Momentum6m, Rule::Momentum1m, Rule::LowVolatility],
            ScoringMode::Fundamentals => &[Rule::LowPeg, Rule::Quality, Rule::Leverage],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScoringMode::PriceHistory => "price_history",
            ScoringMode::Fundamentals => "fundamentals",
        }
    }
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoringMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "price_history" | "history" => Ok(ScoringMode::PriceHistory),
            "fundamentals" => Ok(ScoringMode::Fundamentals),
            other => Err(ConfigurationError::InvalidSetting {
                name: "SCORING_MODE",
                detail: format!("unknown mode {other:?} (expected price_history or fundamentals)"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// 6-month return above +10%.
    Momentum6m,
    /// 1-month return above +3%.
    Momentum1m,
    /// Daily volatility below 3%.
    LowVolatility,
    /// PEG below 1.5 and not zero.
    LowPeg,
    /// ROE above 15%.
    Quality,
    /// Debt-to-equity below 100.
    Leverage,
}

impl Rule {
    /// `None` when the indicator the rule reads is unknown.
    pub fn evaluate(self, ind: &Indicators) -> Option<bool> {
        match self {
            Rule::Momentum6m => ind.return_6m.map(|r| r > MOMENTUM_6M_MIN),
            Rule::Momentum1m => ind.return_1m.map(|r| r > MOMENTUM_1M_MIN),
            Rule::LowVolatility => ind.volatility.map(|v| v < VOLATILITY_MAX),
            Rule::LowPeg => ind.peg_ratio.map(|p| p < PEG_MAX && p != 0.0),
            Rule::Quality => ind.return_on_equity.map(|r| r > ROE_MIN),
            Rule::Leverage => ind.debt_to_equity.map(|d| d < DEBT_TO_EQUITY_MAX),
        }
    }
}

pub fn score(indicators: &Indicators, mode: ScoringMode) -> (u8, Label) {
    let satisfied = mode
        .rules()
        .iter()
        .filter(|rule| rule.evaluate(indicators) == Some(true))
        .count();
    let raw_score = satisfied.min(3) as u8;
    (raw_score, Label::from_raw_score(raw_score))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_fundamentals_score_three() {
        let ind = Indicators {
            peg_ratio: Some(1.2),
            return_on_equity: Some(0.20),
            debt_to_equity: Some(50.0),
            ..Indicators::default()
        };
        assert_eq!(score(&ind, ScoringMode::Fundamentals), (3, Label::StrongBuy));
    }

    #[test]
    fn all_unknown_scores_zero_in_both_modes() {
        let ind = Indicators::default();
        assert_eq!(score(&ind, ScoringMode::Fundamentals), (0, Label::Sell));
        assert_eq!(score(&ind, ScoringMode::PriceHistory), (0, Label::Sell));
    }

    #[test]
    fn unknown_indicator_excludes_only_its_rule() {
        let ind = Indicators {
            peg_ratio: None,
            return_on_equity: Some(0.30),
            debt_to_equity: Some(20.0),
            ..Indicators::default()
        };
        assert_eq!(score(&ind, ScoringMode::Fundamentals), (2, Label::Buy));
    }

    #[test]
    fn zero_peg_does_not_count() {
        let ind = Indicators {
            peg_ratio: Some(0.0),
            ..Indicators::default()
        };
        assert_eq!(Rule::LowPeg.evaluate(&ind), Some(false));
        assert_eq!(score(&ind, ScoringMode::Fundamentals).0, 0);
    }

    #[test]
    fn price_history_rules_ignore_fundamentals() {
        let ind = Indicators {
            peg_ratio: Some(1.0),
            return_on_equity: Some(0.5),
            debt_to_equity: Some(1.0),
            return_6m: Some(0.12),
            return_1m: Some(0.01),
            volatility: Some(0.02),
            ..Indicators::default()
        };
        assert_eq!(score(&ind, ScoringMode::PriceHistory), (2, Label::Buy));
    }

    #[test]
    fn thresholds_are_strict() {
        let ind = Indicators {
            return_6m: Some(0.10),
            return_1m: Some(0.03),
            volatility: Some(0.03),
            ..Indicators::default()
        };
        assert_eq!(score(&ind, ScoringMode::PriceHistory), (0, Label::Sell));
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("fundamentals".parse::<ScoringMode>().unwrap(), ScoringMode::Fundamentals);
        assert_eq!("Price-History".parse::<ScoringMode>().unwrap(), ScoringMode::PriceHistory);
        assert!("mixed".parse::<ScoringMode>().is_err());
    }
}
