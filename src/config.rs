use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Upper bound for every configured wait, in seconds
pub const MAX_WAIT_SECS: f64 = 300.0;

/// Seconds to a `Duration`, clamped to `[0, MAX_WAIT_SECS]`. NaN maps to zero.
pub fn wait_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_WAIT_SECS)).unwrap_or(Duration::ZERO)
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub gex: GexConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// REST API base URL (market sessions endpoint lives here)
    pub api_url: String,
    /// Session token sent as the Authorization header
    #[serde(default)]
    pub session_token: Option<String>,
    /// Account number to operate on (e.g., "5WW46136")
    #[serde(default)]
    pub account_number: Option<String>,
    /// Use the broker's certification environment
    #[serde(default)]
    pub is_test: bool,
    /// Seconds to cache market session data
    #[serde(default = "default_session_cache_secs")]
    pub session_cache_secs: u64,
}

fn default_session_cache_secs() -> u64 {
    60
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.tastytrade.com".to_string(),
            session_token: None,
            account_number: None,
            is_test: false,
            session_cache_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GexConfig {
    /// Maximum days to expiration included in the profile
    pub max_dte: i64,
    /// Minimum days to expiration included in the profile
    #[serde(default)]
    pub min_dte: i64,
    /// Strike band around spot (0.20 = 80%-120%)
    pub strike_range_pct: f64,
    /// Minimum |net GEX| ($M) for a strike to count as a major level
    pub major_level_threshold: f64,
    /// Seconds to collect streamed greeks
    pub data_wait_secs: f64,
    /// Seconds to wait for a spot quote/trade
    #[serde(default = "default_spot_timeout")]
    pub spot_timeout_secs: f64,
    /// Total GEX above which a mean-reversion regime is signalled
    pub mean_reversion_gex: f64,
    /// Distance to the nearest wall (fraction of spot) that counts as pinning
    pub pin_distance_pct: f64,
    /// Local hour from which pinning is considered
    pub pin_hour: u32,
    /// Underlyings whose gamma walls are used to annotate strategy legs
    pub wall_symbols: Vec<String>,
}

fn default_spot_timeout() -> f64 {
    5.0
}

impl Default for GexConfig {
    fn default() -> Self {
        Self {
            max_dte: 30,
            min_dte: 0,
            strike_range_pct: 0.20,
            major_level_threshold: 50.0,
            data_wait_secs: 5.0,
            spot_timeout_secs: 5.0,
            mean_reversion_gex: 1_000_000_000.0,
            pin_distance_pct: 0.005,
            pin_hour: 14,
            wall_symbols: vec!["SPY".to_string(), "SPX".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Minimum IV rank (percent) before screening spreads
    pub min_ivr: f64,
    /// Target days to expiration for the monthly cycle
    pub target_dte: i64,
    /// Absolute delta targeted for the short strike
    pub short_delta: f64,
    /// Minimum credit as a fraction of spread width
    pub min_credit_pct: Decimal,
    /// Seconds to wait for greeks while screening
    pub greeks_timeout_secs: f64,
    /// Fraction of the opening credit that triggers a profit exit
    pub profit_target_pct: Decimal,
    /// Days to expiration at or below which positions are closed
    pub time_stop_dte: i64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        use rust_decimal_macros::dec;

        Self {
            min_ivr: 25.0,
            target_dte: 45,
            short_delta: 0.30,
            min_credit_pct: dec!(0.25),
            greeks_timeout_secs: 5.0,
            profit_target_pct: dec!(0.50),
            time_stop_dte: 21,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// IV rank threshold (percent) for high-IVR targets
    pub ivr_threshold: f64,
    /// Symbols per metrics request
    pub batch_size: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            ivr_threshold: 25.0,
            batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Maximum buying power usage (percent of NLV)
    pub max_bp_usage_pct: Decimal,
    /// Maximum single position market value (percent of NLV)
    pub max_trade_pct: Decimal,
    /// Lower daily theta target as a fraction of NLV
    pub theta_low_pct: Decimal,
    /// Upper daily theta target as a fraction of NLV
    pub theta_high_pct: Decimal,
    /// Seconds to wait for position greeks
    pub greeks_timeout_secs: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        use rust_decimal_macros::dec;

        Self {
            max_bp_usage_pct: dec!(50),
            max_trade_pct: dec!(5),
            theta_low_pct: dec!(0.001),
            theta_high_pct: dec!(0.005),
            greeks_timeout_secs: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is unset (e.g. "info,gexdesk=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info,gexdesk=debug".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            gex: GexConfig::default(),
            strategy: StrategyConfig::default(),
            scanner: ScannerConfig::default(),
            risk: RiskConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", default_log_level())?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("GEXDESK_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (GEXDESK_BROKER__ACCOUNT_NUMBER, etc.)
            .add_source(
                Environment::with_prefix("GEXDESK")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.gex.max_dte < self.gex.min_dte {
            errors.push(format!(
                "gex.max_dte ({}) must be >= gex.min_dte ({})",
                self.gex.max_dte, self.gex.min_dte
            ));
        }

        if self.gex.strike_range_pct <= 0.0 || self.gex.strike_range_pct >= 1.0 {
            errors.push("gex.strike_range_pct must be between 0 and 1".to_string());
        }

        if self.gex.major_level_threshold < 0.0 {
            errors.push("gex.major_level_threshold must be non-negative".to_string());
        }

        for (name, secs) in [
            ("gex.data_wait_secs", self.gex.data_wait_secs),
            ("gex.spot_timeout_secs", self.gex.spot_timeout_secs),
            ("strategy.greeks_timeout_secs", self.strategy.greeks_timeout_secs),
            ("risk.greeks_timeout_secs", self.risk.greeks_timeout_secs),
        ] {
            if !secs.is_finite() || !(0.0..=MAX_WAIT_SECS).contains(&secs) {
                errors.push(format!(
                    "{} must be between 0 and {} seconds (got {})",
                    name, MAX_WAIT_SECS, secs
                ));
            }
        }

        if self.gex.pin_hour > 23 {
            errors.push("gex.pin_hour must be 0-23".to_string());
        }

        if self.strategy.short_delta <= 0.0 || self.strategy.short_delta >= 1.0 {
            errors.push("strategy.short_delta must be between 0 and 1".to_string());
        }

        if self.strategy.min_credit_pct < Decimal::ZERO
            || self.strategy.min_credit_pct >= Decimal::ONE
        {
            errors.push("strategy.min_credit_pct must be in [0, 1)".to_string());
        }

        if self.scanner.batch_size == 0 {
            errors.push("scanner.batch_size must be positive".to_string());
        }

        if self.risk.theta_low_pct > self.risk.theta_high_pct {
            errors.push("risk.theta_low_pct must not exceed risk.theta_high_pct".to_string());
        }

        if self.risk.max_bp_usage_pct <= Decimal::ZERO {
            errors.push("risk.max_bp_usage_pct must be positive".to_string());
        }

        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            errors.push(format!(
                "logging.level is not a valid filter: {}",
                self.logging.level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
