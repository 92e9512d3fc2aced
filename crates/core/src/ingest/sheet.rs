//! Portfolio sources. Every source funnels its rows through [`parse_rows`], so column
//! and cell rules are identical whether the sheet arrives as CSV or via the Sheets API.

use crate::domain::portfolio::PortfolioEntry;
use crate::error::ConfigurationError;
use async_trait::async_trait;
use std::time::Duration;

pub const TICKER: &str = "Ticker";
pub const SHARES: &str = "Shares";
pub const AVG_COST: &str = "Avg_Cost";
const REQUIRED: [&str; 3] = [TICKER, SHARES, AVG_COST];
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[async_trait]
pub trait PortfolioSource: Send + Sync {
    fn describe(&self) -> String;

    async fn load(&self) -> Result<Vec<PortfolioEntry>, ConfigurationError>;
}

/// Validates a header row plus data rows into portfolio entries, keeping row order.
///
/// Row numbers in errors are 1-based sheet rows, so the first data row is row 2.
pub fn parse_rows<I>(headers: &[String], rows: I) -> Result<Vec<PortfolioEntry>, ConfigurationError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let present: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
    let position = |name: &str| present.iter().position(|h| h == name);

    let missing: Vec<String> = REQUIRED
        .iter()
        .filter(|name| position(name).is_none())
        .map(|name| name.to_string())
        .collect();
    let (Some(ticker_col), Some(shares_col), Some(cost_col)) =
        (position(TICKER), position(SHARES), position(AVG_COST))
    else {
        return Err(ConfigurationError::MissingColumns { missing, present });
    };

    let mut entries = Vec::new();
    for (i, row) in rows.into_iter().enumerate() {
        let row_number = i + 2;
        let cell = |col: usize| row.get(col).map(|s| s.trim()).unwrap_or("");

        let ticker = cell(ticker_col);
        if ticker.is_empty() {
            continue;
        }

        entries.push(PortfolioEntry {
            ticker: ticker.to_string(),
            shares: parse_number(cell(shares_col), row_number, SHARES)?,
            avg_cost: parse_number(cell(cost_col), row_number, AVG_COST)?,
        });
    }

    if entries.is_empty() {
        return Err(ConfigurationError::EmptyPortfolio);
    }
    Ok(entries)
}

fn parse_number(raw: &str, row: usize, column: &'static str) -> Result<f64, ConfigurationError> {
    raw.replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConfigurationError::InvalidCell {
            row,
            column,
            value: raw.to_string(),
        })
}

pub fn parse_csv<R: std::io::Read>(reader: R) -> Result<Vec<PortfolioEntry>, ConfigurationError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| ConfigurationError::PortfolioUnavailable(format!("unreadable header row: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record
            .map_err(|e| ConfigurationError::PortfolioUnavailable(format!("unreadable csv row: {e}")))?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    parse_rows(&headers, rows)
}

/// CSV portfolio read from a local path or an `http(s)` URL such as a published
/// Google Sheet export.
#[derive(Debug, Clone)]
pub struct CsvPortfolioSource {
    location: String,
    timeout: Duration,
}

impl CsvPortfolioSource {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn is_remote(&self) -> bool {
        self.location.starts_with("http://") || self.location.starts_with("https://")
    }

    async fn fetch_text(&self) -> Result<String, ConfigurationError> {
        let unavailable = |e: String| {
            ConfigurationError::PortfolioUnavailable(format!("{}: {e}", self.location))
        };

        if !self.is_remote() {
            return tokio::fs::read_to_string(&self.location)
                .await
                .map_err(|e| unavailable(e.to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| unavailable(e.to_string()))?;
        let res = http
            .get(&self.location)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            return Err(unavailable(format!("status={status}")));
        }
        res.text().await.map_err(|e| unavailable(e.to_string()))
    }
}

#[async_trait]
impl PortfolioSource for CsvPortfolioSource {
    fn describe(&self) -> String {
        format!("csv:{}", self.location)
    }

    async fn load(&self) -> Result<Vec<PortfolioEntry>, ConfigurationError> {
        let text = self.fetch_text().await?;
        parse_csv(text.as_bytes())
    }
}
