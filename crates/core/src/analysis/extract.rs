use crate::domain::indicators::Indicators;
use crate::ingest::types::{Payload, PriceBar};
use serde_json::{Map, Value};

/// Trading days in roughly one month.
pub const PERIODS_1M: usize = 22;
/// Trading days in roughly six months.
pub const PERIODS_6M: usize = 132;

pub fn extract(payload: &Payload) -> Indicators {
    match payload {
        Payload::Fundamentals(fields) => extract_fundamentals(fields),
        Payload::History(bars) => extract_history(bars),
    }
}

fn extract_fundamentals(fields: &Map<String, Value>) -> Indicators {
    Indicators {
        peg_ratio: first_number(fields, &["pegRatio", "trailingPegRatio"]),
        return_on_equity: first_number(fields, &["returnOnEquity"]),
        debt_to_equity: first_number(fields, &["debtToEquity"]),
        current_price: first_number(fields, &["currentPrice", "regularMarketPrice"]),
        ..Indicators::default()
    }
}

fn extract_history(bars: &[PriceBar]) -> Indicators {
    let closes: Vec<f64> = bars.iter().filter_map(|b| b.close).collect();
    Indicators {
        current_price: closes.last().copied(),
        return_1m: return_over(&closes, PERIODS_1M),
        return_6m: return_over(&closes, PERIODS_6M),
        volatility: volatility(&closes),
        ..Indicators::default()
    }
}

fn first_number(fields: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| fields.get(*k).and_then(as_number))
}

/// Accepts plain JSON numbers and `{"raw": n, "fmt": ".."}` wrappers. Anything else is unknown.
fn as_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::Object(o) => o.get("raw").and_then(Value::as_f64),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Fractional change from `n_periods` observations ago to the latest close.
pub fn return_over(closes: &[f64], n_periods: usize) -> Option<f64> {
    if closes.len() <= n_periods {
        return None;
    }
    let latest = *closes.last()?;
    let past = closes[closes.len() - 1 - n_periods];
    if past == 0.0 {
        return None;
    }
    Some((latest - past) / past)
}

/// Sample standard deviation of period-over-period percentage changes.
pub fn volatility(closes: &[f64]) -> Option<f64> {
    let changes: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .filter(|c| c.is_finite())
        .collect();

    if changes.len() < 2 {
        return None;
    }

    let n = changes.len() as f64;
    let mean = changes.iter().sum::<f64>() / n;
    let var = changes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}
