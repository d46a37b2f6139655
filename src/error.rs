use thiserror::Error;

/// Main error type for the options desk
#[derive(Error, Debug)]
pub enum GexDeskError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid option symbol: {0}")]
    InvalidSymbol(String),

    #[error("Option chain unavailable for {symbol}: {reason}")]
    ChainUnavailable { symbol: String, reason: String },

    // Account errors
    #[error("Account error: {0}")]
    Account(String),

    // Collaborator capability errors
    #[error("{feature} is not supported by the {source_name} data source")]
    Unsupported {
        feature: String,
        source_name: String,
    },

    // Risk gate
    #[error("New risk blocked: {0}. Use --force to override.")]
    RiskBlocked(#[from] RiskError),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for GexDeskError
pub type Result<T> = std::result::Result<T, GexDeskError>;

/// Risk-limit violations surfaced by the portfolio health check
#[derive(Error, Debug, Clone)]
pub enum RiskError {
    #[error("Buying power usage {usage_pct}% exceeds {limit_pct}% limit")]
    BuyingPowerExceeded {
        usage_pct: rust_decimal::Decimal,
        limit_pct: rust_decimal::Decimal,
    },

    #[error("Trade size {size_pct}% of NLV exceeds {limit_pct}% limit for {symbol}")]
    TradeSizeExceeded {
        symbol: String,
        size_pct: rust_decimal::Decimal,
        limit_pct: rust_decimal::Decimal,
    },
}
