pub mod analysis;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod notify;
pub mod pipeline;
pub mod report;

#[cfg(test)]
pub(crate) mod test_support;

pub mod config {
    use crate::analysis::scoring::ScoringMode;
    use crate::error::ConfigurationError;

    const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
    const DEFAULT_SMTP_PORT: u16 = 465;
    const DEFAULT_SHEET_NAME: &str = "Sheet1";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub scoring_mode: Option<String>,
        pub portfolio_csv: Option<String>,
        pub portfolio_spreadsheet_id: Option<String>,
        pub portfolio_sheet_name: String,
        pub gcp_credentials_json: Option<String>,
        pub text_provider: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub gemini_api_key: Option<String>,
        pub smtp_host: String,
        pub smtp_port: u16,
        pub email_user: Option<String>,
        pub email_pass: Option<String>,
        pub email_to: Vec<String>,
        pub telegram_bot_token: Option<String>,
        pub telegram_chat_id: Option<String>,
        pub sentry_dsn: Option<String>,
        pub run_deadline_secs: Option<u64>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                scoring_mode: non_empty_var("SCORING_MODE"),
                portfolio_csv: non_empty_var("PORTFOLIO_CSV"),
                portfolio_spreadsheet_id: non_empty_var("PORTFOLIO_SPREADSHEET_ID"),
                portfolio_sheet_name: non_empty_var("PORTFOLIO_SHEET_NAME")
                    .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string()),
                gcp_credentials_json: non_empty_var("GCP_CREDENTIALS_JSON"),
                text_provider: non_empty_var("TEXT_PROVIDER"),
                anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
                gemini_api_key: non_empty_var("GEMINI_API_KEY"),
                smtp_host: non_empty_var("SMTP_HOST")
                    .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                smtp_port: std::env::var("SMTP_PORT")
                    .ok()
                    .and_then(|s| s.parse::<u16>().ok())
                    .unwrap_or(DEFAULT_SMTP_PORT),
                email_user: non_empty_var("EMAIL_USER"),
                email_pass: non_empty_var("EMAIL_PASS"),
                email_to: split_list(std::env::var("EMAIL_TO").ok()),
                telegram_bot_token: non_empty_var("TELEGRAM_BOT_TOKEN"),
                telegram_chat_id: non_empty_var("TELEGRAM_CHAT_ID"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                run_deadline_secs: std::env::var("RUN_DEADLINE_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok()),
            })
        }

        pub fn scoring_mode(&self) -> Result<ScoringMode, ConfigurationError> {
            match self.scoring_mode.as_deref() {
                None => Ok(ScoringMode::default()),
                Some(s) => s.parse(),
            }
        }

        pub fn require_email_user(&self) -> Result<&str, ConfigurationError> {
            self.email_user
                .as_deref()
                .ok_or(ConfigurationError::MissingCredential("EMAIL_USER"))
        }

        pub fn require_email_pass(&self) -> Result<&str, ConfigurationError> {
            self.email_pass
                .as_deref()
                .ok_or(ConfigurationError::MissingCredential("EMAIL_PASS"))
        }

        pub fn require_email_to(&self) -> Result<&[String], ConfigurationError> {
            if self.email_to.is_empty() {
                return Err(ConfigurationError::MissingCredential("EMAIL_TO"));
            }
            Ok(&self.email_to)
        }

        pub fn require_telegram_bot_token(&self) -> Result<&str, ConfigurationError> {
            self.telegram_bot_token
                .as_deref()
                .ok_or(ConfigurationError::MissingCredential("TELEGRAM_BOT_TOKEN"))
        }

        pub fn require_telegram_chat_id(&self) -> Result<&str, ConfigurationError> {
            self.telegram_chat_id
                .as_deref()
                .ok_or(ConfigurationError::MissingCredential("TELEGRAM_CHAT_ID"))
        }

        pub fn require_gcp_credentials_json(&self) -> Result<&str, ConfigurationError> {
            self.gcp_credentials_json
                .as_deref()
                .ok_or(ConfigurationError::MissingCredential("GCP_CREDENTIALS_JSON"))
        }
    }

    fn non_empty_var(name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn split_list(v: Option<String>) -> Vec<String> {
        v.unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

}
