//! Portfolio read through the Google Sheets API with a service account.

use crate::config::Settings;
use crate::domain::portfolio::PortfolioEntry;
use crate::error::ConfigurationError;
use crate::ingest::sheet::{parse_rows, PortfolioSource};
use anyhow::Context;
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_TTL_SECS: i64 = 3600;
const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct GoogleSheetSource {
    http: reqwest::Client,
    key: ServiceAccountKey,
    spreadsheet_id: String,
    sheet_name: String,
}

impl GoogleSheetSource {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigurationError> {
        let raw = settings.require_gcp_credentials_json()?;
        let key = serde_json::from_str::<ServiceAccountKey>(raw).map_err(|e| {
            ConfigurationError::InvalidSetting {
                name: "GCP_CREDENTIALS_JSON",
                detail: format!("not a service account key: {e}"),
            }
        })?;
        let spreadsheet_id = settings
            .portfolio_spreadsheet_id
            .clone()
            .ok_or(ConfigurationError::MissingCredential("PORTFOLIO_SPREADSHEET_ID"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| ConfigurationError::PortfolioUnavailable(format!("http client: {e}")))?;

        Ok(Self {
            http,
            key,
            spreadsheet_id,
            sheet_name: settings.portfolio_sheet_name.clone(),
        })
    }

    fn token_uri(&self) -> &str {
        self.key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    fn assertion(&self, now: i64) -> anyhow::Result<String> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPE,
            aud: self.token_uri(),
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
        };

        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .context("failed to parse service account private key")?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        encode(&header, &claims, &key).context("failed to sign service account assertion")
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        let assertion = self.assertion(chrono::Utc::now().timestamp())?;
        let res = self
            .http
            .post(self.token_uri())
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("token request failed")?;

        let status = res.status();
        let text = res.text().await.context("failed to read token response")?;
        anyhow::ensure!(status.is_success(), "token exchange failed: status={status} body={text}");

        let token = serde_json::from_str::<TokenResponse>(&text)
            .context("failed to decode token response")?;
        Ok(token.access_token)
    }

    async fn fetch_values(&self) -> anyhow::Result<Vec<Vec<String>>> {
        let token = self.access_token().await?;

        let mut url = reqwest::Url::parse(SHEETS_BASE_URL)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("sheets base url cannot have a path"))?
            .extend([
                "v4",
                "spreadsheets",
                self.spreadsheet_id.as_str(),
                "values",
                self.sheet_name.as_str(),
            ]);

        let res = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .context("sheets request failed")?;

        let status = res.status();
        let text = res.text().await.context("failed to read sheets response")?;
        anyhow::ensure!(status.is_success(), "sheets read failed: status={status} body={text}");

        let range = serde_json::from_str::<ValueRange>(&text)
            .context("failed to decode sheets response")?;
        Ok(cells_to_strings(range.values))
    }
}

fn cells_to_strings(values: Vec<Vec<Value>>) -> Vec<Vec<String>> {
    values
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect()
}

#[async_trait]
impl PortfolioSource for GoogleSheetSource {
    fn describe(&self) -> String {
        format!("google_sheets:{}/{}", self.spreadsheet_id, self.sheet_name)
    }

    async fn load(&self) -> Result<Vec<PortfolioEntry>, ConfigurationError> {
        let mut rows = self
            .fetch_values()
            .await
            .map_err(|e| ConfigurationError::PortfolioUnavailable(format!("{e:#}")))?
            .into_iter();
        let headers = rows.next().unwrap_or_default();
        parse_rows(&headers, rows)
    }
}
