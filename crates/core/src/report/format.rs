use crate::analysis::scoring::ScoringMode;
use crate::domain::indicators::Indicators;
use crate::domain::recommendation::{ScoreOutcome, ScoreResult};
use crate::ingest::types::FetchFailure;

pub const UNKNOWN: &str = "N/A";

pub fn pct(v: Option<f64>) -> String {
    v.map(|x| format!("{:.1}%", x * 100.0))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn signed_pct(v: Option<f64>) -> String {
    v.map(|x| format!("{:+.1}%", x * 100.0))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn num(v: Option<f64>, precision: usize) -> String {
    v.map(|x| format!("{x:.precision$}"))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// One line of the structured listing.
pub fn result_line(result: &ScoreResult, mode: ScoringMode) -> String {
    match &result.outcome {
        ScoreOutcome::Scored {
            label, indicators, ..
        } => {
            let pnl = result.entry.unrealized_return(indicators.current_price);
            format!(
                "{}: {} | Price: {} | {} | P/L: {}",
                result.ticker(),
                label,
                num(indicators.current_price, 2),
                indicator_columns(indicators, mode),
                signed_pct(pnl)
            )
        }
        ScoreOutcome::FetchError(failure) => {
            format!(
                "{}: ERROR - Could not get market data ({})",
                result.ticker(),
                failure_reason(failure)
            )
        }
    }
}

fn indicator_columns(ind: &Indicators, mode: ScoringMode) -> String {
    match mode {
        ScoringMode::PriceHistory => format!(
            "1M: {} | 6M: {} | Vol: {}",
            pct(ind.return_1m),
            pct(ind.return_6m),
            num(ind.volatility, 4)
        ),
        ScoringMode::Fundamentals => format!(
            "PEG: {} | ROE: {} | D/E: {}",
            num(ind.peg_ratio, 2),
            pct(ind.return_on_equity),
            num(ind.debt_to_equity, 1)
        ),
    }
}

fn failure_reason(failure: &FetchFailure) -> String {
    match failure.attempts {
        0 => failure.kind.to_string(),
        1 => format!("{} after 1 attempt", failure.kind),
        n => format!("{} after {n} attempts", failure.kind),
    }
}

/// All result lines followed by the success/failure tally.
pub fn listing(results: &[ScoreResult], mode: ScoringMode) -> String {
    let mut lines: Vec<String> = results.iter().map(|r| result_line(r, mode)).collect();
    let failed = results.iter().filter(|r| !r.fetch_ok()).count();
    lines.push(format!(
        "Analyzed {} of {} stocks ({failed} failed)",
        results.len() - failed,
        results.len()
    ));
    lines.join("\n")
}
