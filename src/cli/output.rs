//! Output formatting for `gexdesk` commands.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::domain::{Position, StrikeExposure, WatchlistScope};
use crate::scanner::IvrData;
use crate::strategy::{CloseSignal, StrategyTarget};

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(items)?);
        }
    }
    Ok(())
}

/// Print a single Serialize item as pretty JSON.
pub fn print_json<T: Serialize>(item: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(item)?);
    Ok(())
}

/// Print a simple key-value pair.
pub fn print_kv(key: &str, value: &str) {
    println!("{key:<14} {value}");
}

/// Print a warning message.
pub fn print_warn(msg: &str) {
    println!("\x1b[33m{msg}\x1b[0m");
}

fn or_na<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

#[derive(Debug, Serialize, Tabled)]
pub struct StrikeRow {
    #[tabled(rename = "Strike")]
    pub strike: String,
    #[tabled(rename = "Net GEX ($M)")]
    pub net_gex: String,
    #[tabled(rename = "Call GEX")]
    pub call_gex: String,
    #[tabled(rename = "Put GEX")]
    pub put_gex: String,
    #[tabled(rename = "OI")]
    pub total_oi: u64,
    #[tabled(rename = "Volume")]
    pub total_volume: u64,
}

impl From<&StrikeExposure> for StrikeRow {
    fn from(row: &StrikeExposure) -> Self {
        Self {
            strike: format!("{:.2}", row.strike),
            net_gex: format!("{:.2}", row.net_gex_musd),
            call_gex: format!("{:.2}", row.call_gex_musd),
            put_gex: format!("{:.2}", row.put_gex_musd),
            total_oi: row.total_oi,
            total_volume: row.total_volume,
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct StrategyRow {
    #[tabled(rename = "Symbol")]
    pub symbol: String,
    #[tabled(rename = "Strategy")]
    pub strategy: String,
    #[tabled(rename = "Exp / DTE")]
    pub expiration: String,
    #[tabled(rename = "Width")]
    pub width: String,
    #[tabled(rename = "Credit")]
    pub credit: String,
    #[tabled(rename = "% Width")]
    pub credit_pct: String,
    #[tabled(rename = "Max Loss")]
    pub max_loss: String,
    #[tabled(rename = "BP Eff")]
    pub bp_effect: String,
    #[tabled(rename = "Legs")]
    pub legs: String,
    #[tabled(rename = "Warnings")]
    pub warnings: String,
}

impl From<&StrategyTarget> for StrategyRow {
    fn from(t: &StrategyTarget) -> Self {
        let legs = t
            .legs
            .iter()
            .map(|l| format!("{:?} {}", l.action, l.strike))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            symbol: t.symbol.clone(),
            strategy: t.kind.to_string(),
            expiration: format!("{} ({}d)", t.expiration.format("%m-%d"), t.dte),
            width: format!("${:.1}", t.width),
            credit: format!("${:.2}", t.expected_credit),
            credit_pct: format!("{:.1}%", t.credit_pct()),
            max_loss: format!("${:.2}", t.max_loss()),
            bp_effect: format!("${:.0}", t.bp_effect()),
            legs,
            warnings: t.gex_warning.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct IvrRow {
    #[tabled(rename = "Symbol")]
    pub symbol: String,
    #[tabled(rename = "IVR")]
    pub iv_rank: String,
    #[tabled(rename = "IVP")]
    pub iv_percentile: String,
    #[tabled(rename = "IV")]
    pub current_iv: String,
    #[tabled(rename = "Price")]
    pub price: String,
    #[tabled(rename = "Liq")]
    pub liquidity: String,
    #[tabled(rename = "Earns")]
    pub earnings: String,
}

impl From<&IvrData> for IvrRow {
    fn from(d: &IvrData) -> Self {
        Self {
            symbol: d.symbol.clone(),
            iv_rank: or_na(d.iv_rank.map(|v| format!("{v:.1}%"))),
            iv_percentile: or_na(d.iv_percentile.map(|v| format!("{v:.1}%"))),
            current_iv: or_na(d.current_iv.map(|v| format!("{:.0}%", v * 100.0))),
            price: or_na(d.current_price.map(|p| format!("${p:.2}"))),
            liquidity: or_na(d.liquidity_rank.map(|r| "*".repeat(r.clamp(1.0, 5.0) as usize))),
            earnings: or_na(d.next_earnings_date.clone()),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct CloseRow {
    #[tabled(rename = "Symbol")]
    pub symbol: String,
    #[tabled(rename = "Qty")]
    pub quantity: String,
    #[tabled(rename = "Mark")]
    pub mark: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
}

impl From<&CloseSignal> for CloseRow {
    fn from(s: &CloseSignal) -> Self {
        Self {
            symbol: s.position.symbol.clone(),
            quantity: s.position.quantity.to_string(),
            mark: or_na(s.position.mark),
            reason: s.reason.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct PositionRow {
    #[tabled(rename = "Symbol")]
    pub symbol: String,
    #[tabled(rename = "Type")]
    pub instrument_type: String,
    #[tabled(rename = "Qty")]
    pub quantity: String,
    #[tabled(rename = "Avg Open")]
    pub average_open: String,
    #[tabled(rename = "Mark")]
    pub mark: String,
    #[tabled(rename = "Value")]
    pub market_value: String,
    #[tabled(rename = "P/L")]
    pub pnl: String,
    #[tabled(rename = "DTE")]
    pub dte: String,
}

impl PositionRow {
    pub fn new(p: &Position, today: chrono::NaiveDate) -> Self {
        Self {
            symbol: p.symbol.clone(),
            instrument_type: or_na(p.instrument_type.map(|t| t.as_str())),
            quantity: p.quantity.to_string(),
            average_open: or_na(p.average_open_price.map(|v| format!("{v:.2}"))),
            mark: or_na(p.mark.map(|v| format!("{v:.2}"))),
            market_value: format!("${:.2}", p.market_value()),
            pnl: or_na(p.unrealized_pnl().map(|v| format!("${v:.2}"))),
            dte: or_na(p.dte(today)),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct WatchlistRow {
    #[tabled(rename = "Scope")]
    pub scope: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Symbols")]
    pub symbols: usize,
}

impl WatchlistRow {
    pub fn new(scope: WatchlistScope, name: &str, symbols: usize) -> Self {
        let scope = match scope {
            WatchlistScope::Private => "private",
            WatchlistScope::Public => "public",
        };
        Self {
            scope: scope.to_string(),
            name: name.to_string(),
            symbols,
        }
    }
}
