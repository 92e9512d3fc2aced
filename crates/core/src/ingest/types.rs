use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub close: Option<f64>,
}

/// What a successful upstream call hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Point-in-time fields (PEG, ROE, D/E, price) keyed by upstream field name.
    Fundamentals(Map<String, Value>),
    /// Daily bars, oldest first.
    History(Vec<PriceBar>),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Fundamentals(fields) => fields.is_empty(),
            Payload::History(bars) => bars.iter().all(|b| b.close.is_none()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    RateLimited,
    Timeout,
    EmptyResponse,
    Other,
    DeadlineExceeded,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate limited",
            FailureKind::Timeout => "timed out",
            FailureKind::EmptyResponse => "empty response",
            FailureKind::Other => "upstream error",
            FailureKind::DeadlineExceeded => "run deadline reached",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    /// Kind of the last observed failure.
    pub kind: FailureKind,
    /// Upstream calls actually made for this ticker.
    pub attempts: u32,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawFetchResult {
    Success(Payload),
    Failure(FetchFailure),
}

/// Structured error returned by a market data client.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UpstreamError {
    #[error("too many requests (HTTP 429)")]
    RateLimited,

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("no usable data returned")]
    Empty,

    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    pub fn kind(&self) -> FailureKind {
        match self {
            UpstreamError::RateLimited => FailureKind::RateLimited,
            UpstreamError::Timeout(_) => FailureKind::Timeout,
            UpstreamError::Empty => FailureKind::EmptyResponse,
            UpstreamError::Other(_) => FailureKind::Other,
        }
    }
}
