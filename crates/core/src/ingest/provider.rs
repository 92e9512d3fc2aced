use crate::ingest::types::{Payload, UpstreamError};
use reqwest::StatusCode;

/// A single, non-retrying call to the upstream market data source.
///
/// Implementations classify their own failures into [`UpstreamError`] so the
/// fetcher never has to inspect error messages.
#[async_trait::async_trait]
pub trait MarketDataClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn get(&self, ticker: &str) -> Result<Payload, UpstreamError>;
}

pub(crate) fn classify_status(status: StatusCode, body: &str) -> UpstreamError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => UpstreamError::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            UpstreamError::Timeout(format!("HTTP {status}"))
        }
        _ => UpstreamError::Other(format!("HTTP {status}: {}", snippet(body))),
    }
}

pub(crate) fn classify_transport(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout(err.to_string())
    } else {
        UpstreamError::Other(err.to_string())
    }
}

/// Reads the body and maps any non-2xx status to a structured error.
pub(crate) async fn read_success_body(res: reqwest::Response) -> Result<String, UpstreamError> {
    let status = res.status();
    let text = res.text().await.map_err(classify_transport)?;
    if !status.is_success() {
        return Err(classify_status(status, &text));
    }
    Ok(text)
}

fn snippet(body: &str) -> &str {
    let body = body.trim();
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
