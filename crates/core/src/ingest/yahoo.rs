//! Yahoo Finance market data clients.
//!
//! `YahooChartClient` serves price-history mode from the v8 chart endpoint.
//! `YahooQuoteSummaryClient` serves fundamentals mode from v10 quoteSummary,
//! which needs a session cookie plus a crumb token.

use crate::ingest::provider::{classify_transport, read_success_body, MarketDataClient};
use crate::ingest::types::{Payload, PriceBar, UpstreamError};
use anyhow::Context;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RANGE: &str = "1y";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const SUMMARY_MODULES: &str = "defaultKeyStatistics,financialData";

fn timeout_from_env() -> Duration {
    let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    Duration::from_secs(timeout_secs)
}

fn build_http(cookies: bool, timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .cookie_store(cookies)
        .build()
        .context("failed to build market data http client")
}

fn base_url_from_env() -> String {
    std::env::var("MARKET_DATA_BASE_URL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

fn endpoint(base_url: &str, segments: &[&str]) -> Result<reqwest::Url, UpstreamError> {
    let mut url = reqwest::Url::parse(base_url)
        .map_err(|e| UpstreamError::Other(format!("invalid market data base url: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| UpstreamError::Other("market data base url cannot have a path".into()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[derive(Debug, Clone)]
pub struct YahooChartClient {
    http: reqwest::Client,
    base_url: String,
    range: String,
}

impl YahooChartClient {
    pub fn from_env() -> anyhow::Result<Self> {
        let range = std::env::var("MARKET_DATA_RANGE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RANGE.to_string());

        Ok(Self {
            http: build_http(false, timeout_from_env())?,
            base_url: base_url_from_env(),
            range,
        })
    }
}

#[async_trait::async_trait]
impl MarketDataClient for YahooChartClient {
    fn provider_name(&self) -> &'static str {
        "yahoo_chart"
    }

    async fn get(&self, ticker: &str) -> Result<Payload, UpstreamError> {
        let url = endpoint(&self.base_url, &["v8", "finance", "chart", ticker])?;
        let res = self
            .http
            .get(url)
            .query(&[("range", self.range.as_str()), ("interval", "1d")])
            .send()
            .await
            .map_err(classify_transport)?;

        let text = read_success_body(res).await?;
        let chart = serde_json::from_str::<ChartResponse>(&text)
            .map_err(|e| UpstreamError::Other(format!("chart response is not valid JSON: {e}")))?;
        parse_chart(chart)
    }
}

fn parse_chart(resp: ChartResponse) -> Result<Payload, UpstreamError> {
    let Some(results) = resp.chart.result else {
        return Err(match resp.chart.error {
            Some(err) => UpstreamError::Other(format!("{}: {}", err.code, err.description)),
            None => UpstreamError::Empty,
        });
    };

    let Some(data) = results.into_iter().next() else {
        return Err(UpstreamError::Empty);
    };

    let timestamps = data.timestamp.unwrap_or_default();
    let closes = data
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let Some(dt) = chrono::DateTime::from_timestamp(*ts, 0) else {
            continue;
        };
        bars.push(PriceBar {
            date: dt.date_naive(),
            close: closes.get(i).copied().flatten().filter(|c| c.is_finite()),
        });
    }

    Ok(Payload::History(bars))
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    #[serde(default)]
    result: Option<Vec<ChartData>>,
    #[serde(default)]
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug)]
pub struct YahooQuoteSummaryClient {
    http: reqwest::Client,
    base_url: String,
    cookie_url: String,

    // Crumb is bound to the session cookie; reuse it for the whole run.
    crumb: tokio::sync::Mutex<Option<String>>,
}

impl YahooQuoteSummaryClient {
    pub fn from_env() -> anyhow::Result<Self> {
        let cookie_url = std::env::var("MARKET_DATA_COOKIE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_COOKIE_URL.to_string());

        Self::new(base_url_from_env(), cookie_url, timeout_from_env())
    }

    pub fn new(base_url: String, cookie_url: String, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_http(true, timeout)?,
            base_url,
            cookie_url,
            crumb: tokio::sync::Mutex::new(None),
        })
    }

    async fn forget_crumb(&self) {
        *self.crumb.lock().await = None;
    }

    async fn summary(&self, ticker: &str) -> Result<reqwest::Response, UpstreamError> {
        let crumb = self.crumb().await?;
        let url = endpoint(&self.base_url, &["v10", "finance", "quoteSummary", ticker])?;
        self.http
            .get(url)
            .query(&[("modules", SUMMARY_MODULES), ("crumb", crumb.as_str())])
            .send()
            .await
            .map_err(classify_transport)
    }

    async fn crumb(&self) -> Result<String, UpstreamError> {
        let mut guard = self.crumb.lock().await;
        if let Some(crumb) = guard.as_ref() {
            return Ok(crumb.clone());
        }

        // Only the Set-Cookie header matters here; the status is usually 404.
        self.http
            .get(&self.cookie_url)
            .send()
            .await
            .map_err(classify_transport)?;

        let url = endpoint(&self.base_url, &["v1", "test", "getcrumb"])?;
        let res = self.http.get(url).send().await.map_err(classify_transport)?;
        let crumb = read_success_body(res).await?.trim().to_string();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(UpstreamError::Other("crumb endpoint returned no token".into()));
        }

        *guard = Some(crumb.clone());
        Ok(crumb)
    }
}

#[async_trait::async_trait]
impl MarketDataClient for YahooQuoteSummaryClient {
    fn provider_name(&self) -> &'static str {
        "yahoo_quote_summary"
    }

    async fn get(&self, ticker: &str) -> Result<Payload, UpstreamError> {
        let mut res = self.summary(ticker).await?;
        if res.status() == reqwest::StatusCode::UNAUTHORIZED {
            // The crumb expired with its session: handshake again and retry once.
            tracing::warn!(ticker, "quoteSummary rejected crumb; refreshing session");
            self.forget_crumb().await;
            res = self.summary(ticker).await?;
            if res.status() == reqwest::StatusCode::UNAUTHORIZED {
                self.forget_crumb().await;
            }
        }

        let text = read_success_body(res).await?;
        let summary = serde_json::from_str::<QuoteSummaryResponse>(&text).map_err(|e| {
            UpstreamError::Other(format!("quoteSummary response is not valid JSON: {e}"))
        })?;
        parse_quote_summary(summary)
    }
}

/// Merges the requested modules into one flat field map. Later modules win on key clashes.
fn parse_quote_summary(resp: QuoteSummaryResponse) -> Result<Payload, UpstreamError> {
    let Some(results) = resp.quote_summary.result else {
        return Err(match resp.quote_summary.error {
            Some(err) => UpstreamError::Other(format!("{}: {}", err.code, err.description)),
            None => UpstreamError::Empty,
        });
    };

    let mut fields = Map::new();
    for result in results {
        let Value::Object(modules) = result else {
            continue;
        };
        for (_, module) in modules {
            if let Value::Object(module_fields) = module {
                fields.extend(module_fields);
            }
        }
    }

    Ok(Payload::Fundamentals(fields))
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryEnvelope,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    #[serde(default)]
    result: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<YahooError>,
}
