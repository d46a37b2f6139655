use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{GexDeskError, Result};

/// Call or put
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    #[serde(alias = "C", alias = "Call", alias = "call")]
    Call,
    #[serde(alias = "P", alias = "Put", alias = "put")]
    Put,
}

impl OptionType {
    pub fn is_call(&self) -> bool {
        matches!(self, OptionType::Call)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Call => "CALL",
            OptionType::Put => "PUT",
        }
    }

    fn from_code(code: char) -> Option<Self> {
        match code.to_ascii_uppercase() {
            'C' => Some(OptionType::Call),
            'P' => Some(OptionType::Put),
            _ => None,
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed OCC option symbol.
///
/// Accepts the padded 21-character form (`SPY   250117C00500000`, strike in
/// thousandths) and the compact form brokers print in position lists
/// (`SPY 250117C500`, strike in dollars).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccSymbol {
    pub underlying: String,
    pub expiration: NaiveDate,
    pub option_type: OptionType,
    pub strike: Decimal,
}

impl FromStr for OccSymbol {
    type Err = GexDeskError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = || GexDeskError::InvalidSymbol(raw.to_string());
        let trimmed = raw.trim();
        if !trimmed.is_ascii() {
            return Err(invalid());
        }

        // Contract part: YYMMDD + C/P + strike digits
        let root_end = trimmed
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit())
            .map(|(i, _)| i)
            .ok_or_else(invalid)?;
        let underlying = trimmed[..root_end].trim();
        let contract = &trimmed[root_end..];
        if underlying.is_empty() || contract.len() < 8 {
            return Err(invalid());
        }

        let expiration =
            NaiveDate::parse_from_str(&contract[..6], "%y%m%d").map_err(|_| invalid())?;
        let option_type = contract[6..]
            .chars()
            .next()
            .and_then(OptionType::from_code)
            .ok_or_else(invalid)?;

        let strike_raw = &contract[7..];
        if strike_raw.is_empty() {
            return Err(invalid());
        }
        let strike = if strike_raw.len() == 8 && strike_raw.chars().all(|c| c.is_ascii_digit()) {
            Decimal::from_str(strike_raw).map_err(|_| invalid())? / Decimal::from(1000)
        } else {
            Decimal::from_str(strike_raw).map_err(|_| invalid())?
        };

        Ok(Self {
            underlying: underlying.to_string(),
            expiration,
            option_type,
            strike: strike.normalize(),
        })
    }
}

impl OccSymbol {
    /// Render in the padded 21-character OCC form
    pub fn to_occ(&self) -> String {
        let thousandths = (self.strike * Decimal::from(1000)).trunc();
        format!(
            "{:<6}{}{}{:08}",
            self.underlying,
            self.expiration.format("%y%m%d"),
            if self.option_type.is_call() { 'C' } else { 'P' },
            thousandths.to_u64().unwrap_or(0)
        )
    }

    /// Streaming symbol (`.SPY250117C500`) used for greeks subscriptions
    pub fn to_streamer(&self) -> String {
        format!(
            ".{}{}{}{}",
            self.underlying,
            self.expiration.format("%y%m%d"),
            if self.option_type.is_call() { 'C' } else { 'P' },
            self.strike.normalize()
        )
    }
}

/// Option-chain entry as delivered by the broker.
///
/// Strike and expiration are optional on the wire; entries missing either are
/// skipped by the analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionInstrument {
    /// Broker (OCC) symbol, used for market data requests
    pub symbol: String,
    /// Streaming symbol, used for greeks subscriptions
    pub streamer_symbol: String,
    #[serde(default)]
    pub underlying: String,
    pub option_type: OptionType,
    #[serde(default)]
    pub strike_price: Option<Decimal>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

impl OptionInstrument {
    /// Days to expiration relative to `today`
    pub fn dte(&self, today: NaiveDate) -> Option<i64> {
        self.expiration_date.map(|exp| (exp - today).num_days())
    }
}

/// Open interest / volume / mark snapshot for one contract
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketDataEntry {
    pub symbol: String,
    #[serde(default)]
    pub open_interest: Option<u64>,
    #[serde(default)]
    pub volume: Option<u64>,
    #[serde(default)]
    pub mark: Option<Decimal>,
    #[serde(default)]
    pub last: Option<Decimal>,
}

/// Streamed greeks for one contract
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GreeksEvent {
    pub event_symbol: String,
    #[serde(default)]
    pub gamma: Option<Decimal>,
    #[serde(default)]
    pub delta: Option<Decimal>,
    #[serde(default)]
    pub theta: Option<Decimal>,
    #[serde(default)]
    pub volatility: Option<Decimal>,
}

impl GreeksEvent {
    pub fn gamma_f64(&self) -> f64 {
        self.gamma.and_then(|g| g.to_f64()).unwrap_or(0.0)
    }
}

/// First price event for an underlying, used to resolve spot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpotEvent {
    Trade {
        #[serde(default)]
        price: Option<Decimal>,
    },
    Quote {
        #[serde(default)]
        bid_price: Option<Decimal>,
        #[serde(default)]
        ask_price: Option<Decimal>,
    },
    Summary {
        #[serde(default)]
        last_price: Option<Decimal>,
    },
}

impl SpotEvent {
    /// Trade price, else last price, else the bid/ask mid. Zero counts as missing.
    pub fn spot_price(&self) -> Option<Decimal> {
        let nonzero = |v: &Option<Decimal>| v.filter(|p| !p.is_zero());
        match self {
            SpotEvent::Trade { price } => nonzero(price),
            SpotEvent::Summary { last_price } => nonzero(last_price),
            SpotEvent::Quote {
                bid_price,
                ask_price,
            } => match (nonzero(bid_price), nonzero(ask_price)) {
                (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
                _ => None,
            },
        }
    }
}

/// Kernel input: one contract with its optional fields already resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub strike: Decimal,
    pub expiration: NaiveDate,
    pub is_call: bool,
    pub open_interest: u64,
    pub gamma: f64,
    pub volume: u64,
}

impl ContractRecord {
    /// Build a record from broker data, defaulting missing OI/volume/gamma to 0.
    ///
    /// Returns `None` when the instrument lacks a strike or expiration.
    pub fn from_parts(
        instrument: &OptionInstrument,
        market_data: Option<&MarketDataEntry>,
        greeks: Option<&GreeksEvent>,
    ) -> Option<Self> {
        Some(Self {
            strike: instrument.strike_price?,
            expiration: instrument.expiration_date?,
            is_call: instrument.option_type.is_call(),
            open_interest: market_data.and_then(|m| m.open_interest).unwrap_or(0),
            gamma: greeks.map(GreeksEvent::gamma_f64).unwrap_or(0.0),
            volume: market_data.and_then(|m| m.volume).unwrap_or(0),
        })
    }
}
