use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Brokerage account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_number: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

/// Account balances; every field is optional on the wire and reads as zero
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountBalances {
    #[serde(default)]
    pub net_liquidating_value: Option<Decimal>,
    #[serde(default)]
    pub equity_buying_power: Option<Decimal>,
    #[serde(default)]
    pub maintenance_margin: Option<Decimal>,
    #[serde(default)]
    pub day_trading_buying_power: Option<Decimal>,
    #[serde(default)]
    pub day_trade_excess: Option<Decimal>,
    #[serde(default)]
    pub cash_balance: Option<Decimal>,
    #[serde(default)]
    pub pending_cash: Option<Decimal>,
}

impl AccountBalances {
    pub fn nlv(&self) -> Decimal {
        self.net_liquidating_value.unwrap_or_default()
    }

    pub fn buying_power(&self) -> Decimal {
        self.equity_buying_power.unwrap_or_default()
    }
}

/// Instrument class of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentType {
    #[serde(rename = "Equity")]
    Equity,
    #[serde(rename = "Equity Option")]
    EquityOption,
    #[serde(rename = "Future")]
    Future,
    #[serde(rename = "Future Option")]
    FutureOption,
    #[serde(other)]
    Other,
}

impl InstrumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentType::Equity => "Equity",
            InstrumentType::EquityOption => "Equity Option",
            InstrumentType::Future => "Future",
            InstrumentType::FutureOption => "Future Option",
            InstrumentType::Other => "Other",
        }
    }

    pub fn is_option(&self) -> bool {
        matches!(self, InstrumentType::EquityOption | InstrumentType::FutureOption)
    }
}

/// Open position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    #[serde(default)]
    pub instrument_type: Option<InstrumentType>,
    /// Signed quantity; negative for short positions
    pub quantity: Decimal,
    #[serde(default)]
    pub multiplier: Option<Decimal>,
    #[serde(default)]
    pub mark: Option<Decimal>,
    #[serde(default)]
    pub average_open_price: Option<Decimal>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_option(&self) -> bool {
        self.instrument_type.is_some_and(|t| t.is_option())
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    /// Contract multiplier, 1 when the broker omits it
    pub fn multiplier(&self) -> Decimal {
        self.multiplier.unwrap_or(Decimal::ONE)
    }

    /// Absolute market value: |mark * quantity * multiplier|
    pub fn market_value(&self) -> Decimal {
        (self.mark.unwrap_or_default() * self.quantity * self.multiplier()).abs()
    }

    /// (mark - average open) * quantity * multiplier; quantity carries the sign
    pub fn unrealized_pnl(&self) -> Option<Decimal> {
        let mark = self.mark?;
        let open = self.average_open_price?;
        Some((mark - open) * self.quantity * self.multiplier())
    }

    pub fn dte(&self, today: NaiveDate) -> Option<i64> {
        self.expires_at
            .map(|exp| (exp.date_naive() - today).num_days())
    }
}

/// Volatility metrics for an underlying. Rank/percentile are fractions (0.42 = 42%).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketMetric {
    pub symbol: String,
    #[serde(default)]
    pub implied_volatility_index: Option<Decimal>,
    #[serde(default)]
    pub implied_volatility_index_rank: Option<Decimal>,
    #[serde(default)]
    pub implied_volatility_percentile: Option<Decimal>,
    #[serde(default)]
    pub beta: Option<Decimal>,
    #[serde(default)]
    pub liquidity_rank: Option<Decimal>,
    #[serde(default)]
    pub expected_report_date: Option<NaiveDate>,
}

/// Equity price snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquityQuote {
    pub symbol: String,
    #[serde(default)]
    pub mark: Option<Decimal>,
    #[serde(default)]
    pub last: Option<Decimal>,
    #[serde(default)]
    pub volume: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub symbol: String,
    #[serde(default)]
    pub instrument_type: Option<InstrumentType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watchlist {
    pub name: String,
    #[serde(default)]
    pub entries: Vec<WatchlistEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchlistScope {
    Private,
    Public,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_market_value() {
        let pos = Position {
            symbol: "AAPL".to_string(),
            instrument_type: Some(InstrumentType::Equity),
            quantity: dec!(-40),
            multiplier: None,
            mark: Some(dec!(150)),
            average_open_price: None,
            expires_at: None,
        };
        assert_eq!(pos.market_value(), dec!(6000));
        assert!(pos.is_short());
        assert!(!pos.is_option());
        assert_eq!(pos.unrealized_pnl(), None);
    }

    #[test]
    fn test_unrealized_pnl_follows_quantity_sign() {
        let short_put = Position {
            symbol: "SPY   250221P00380000".to_string(),
            instrument_type: Some(InstrumentType::EquityOption),
            quantity: dec!(-2),
            multiplier: Some(dec!(100)),
            mark: Some(dec!(0.80)),
            average_open_price: Some(dec!(2.00)),
            expires_at: None,
        };
        // Sold at 2.00, now 0.80: +1.20 * 2 * 100
        assert_eq!(short_put.unrealized_pnl(), Some(dec!(240)));
    }

    #[test]
    fn test_instrument_type_unknown_maps_to_other() {
        let t: InstrumentType = serde_json::from_str("\"Cryptocurrency\"").unwrap();
        assert_eq!(t, InstrumentType::Other);
        let t: InstrumentType = serde_json::from_str("\"Equity Option\"").unwrap();
        assert!(t.is_option());
    }
}
