//! Sequential run over the portfolio: fetch, extract, score.

use crate::analysis::extract::extract;
use crate::analysis::scoring::{score, ScoringMode};
use crate::domain::portfolio::PortfolioEntry;
use crate::domain::recommendation::{ScoreOutcome, ScoreResult};
use crate::ingest::fetcher::ResilientFetcher;
use crate::ingest::types::RawFetchResult;
use std::time::{Duration, Instant};

/// Everything a run produced, in portfolio order.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub mode: ScoringMode,
    pub provider: &'static str,
    pub results: Vec<ScoreResult>,
}

impl RunContext {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.fetch_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn failed_tickers(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.fetch_ok())
            .map(ScoreResult::ticker)
            .collect()
    }
}

pub fn deadline_after(fetcher: &ResilientFetcher, secs: Option<u64>) -> Option<Instant> {
    secs.map(|s| fetcher.now() + Duration::from_secs(s))
}

/// Fetches and scores each entry one at a time. Always yields one result per entry.
pub async fn run(
    fetcher: &ResilientFetcher,
    mode: ScoringMode,
    entries: Vec<PortfolioEntry>,
    deadline: Option<Instant>,
) -> RunContext {
    let total = entries.len();
    let mut results = Vec::with_capacity(total);

    for (i, entry) in entries.into_iter().enumerate() {
        tracing::info!(ticker = %entry.ticker, progress = i + 1, total, "analyzing");

        let outcome = match fetcher.fetch(&entry.ticker, deadline).await {
            RawFetchResult::Success(payload) => {
                let indicators = extract(&payload);
                let (raw_score, label) = score(&indicators, mode);
                tracing::info!(ticker = %entry.ticker, raw_score, %label, "scored");
                ScoreOutcome::Scored {
                    raw_score,
                    label,
                    indicators,
                }
            }
            RawFetchResult::Failure(failure) => {
                tracing::warn!(
                    ticker = %entry.ticker,
                    kind = %failure.kind,
                    attempts = failure.attempts,
                    "no market data"
                );
                ScoreOutcome::FetchError(failure)
            }
        };
        results.push(ScoreResult { entry, outcome });
    }

    RunContext {
        mode,
        provider: fetcher.provider_name(),
        results,
    }
}
