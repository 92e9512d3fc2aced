use thiserror::Error;

/// Fatal problems detected before any ticker is fetched.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("{0} is required")]
    MissingCredential(&'static str),

    #[error("missing columns in sheet: {missing:?}; current columns: {present:?}")]
    MissingColumns {
        missing: Vec<String>,
        present: Vec<String>,
    },

    #[error("row {row}: {column} value {value:?} is not a number")]
    InvalidCell {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("portfolio has no tickers; check the sheet content")]
    EmptyPortfolio,

    #[error("portfolio source unavailable: {0}")]
    PortfolioUnavailable(String),

    #[error("invalid setting {name}: {detail}")]
    InvalidSetting { name: &'static str, detail: String },
}
