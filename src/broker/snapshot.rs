//! File-backed data source
//!
//! Replays a JSON capture of broker records so every analysis can run
//! offline. The same shape is what the CLI reads with `--snapshot`.

use async_trait::async_trait;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

use super::traits::{AccountSource, GreeksStream, MarketDataSource};
use crate::domain::{
    Account, AccountBalances, EquityQuote, GreeksEvent, MarketDataEntry, MarketMetric,
    OptionInstrument, Position, SpotEvent, Watchlist, WatchlistScope,
};
use crate::error::{GexDeskError, Result};

/// One account with its balances and positions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    #[serde(flatten)]
    pub account: Account,
    #[serde(default)]
    pub balances: AccountBalances,
    #[serde(default)]
    pub positions: Vec<Position>,
}

/// Captured broker records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeskSnapshot {
    /// Spot event per underlying
    #[serde(default)]
    pub spot: HashMap<String, SpotEvent>,
    /// Option chain per underlying
    #[serde(default)]
    pub chains: HashMap<String, Vec<OptionInstrument>>,
    #[serde(default)]
    pub market_data: Vec<MarketDataEntry>,
    #[serde(default)]
    pub greeks: Vec<GreeksEvent>,
    #[serde(default)]
    pub metrics: Vec<MarketMetric>,
    #[serde(default)]
    pub quotes: Vec<EquityQuote>,
    #[serde(default)]
    pub private_watchlists: Vec<Watchlist>,
    #[serde(default)]
    pub public_watchlists: Vec<Watchlist>,
    #[serde(default)]
    pub accounts: Vec<AccountSnapshot>,
}

/// Data source backed by a [`DeskSnapshot`]
#[derive(Debug, Clone, Default)]
pub struct SnapshotSource {
    snapshot: DeskSnapshot,
}

impl SnapshotSource {
    pub fn new(snapshot: DeskSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        debug!("Loaded snapshot from {}", path.display());
        Self::from_json(&raw)
    }

    pub fn snapshot(&self) -> &DeskSnapshot {
        &self.snapshot
    }

    fn account(&self, account: &Account) -> Result<&AccountSnapshot> {
        self.snapshot
            .accounts
            .iter()
            .find(|a| a.account.account_number == account.account_number)
            .ok_or_else(|| {
                GexDeskError::Account(format!(
                    "Account {} not in snapshot",
                    account.account_number
                ))
            })
    }
}

fn wanted(symbols: &[String]) -> HashSet<&str> {
    symbols.iter().map(String::as_str).collect()
}

#[async_trait]
impl MarketDataSource for SnapshotSource {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn spot_event(&self, symbol: &str) -> Result<Option<SpotEvent>> {
        Ok(self.snapshot.spot.get(symbol).cloned())
    }

    async fn option_chain(&self, symbol: &str) -> Result<Vec<OptionInstrument>> {
        self.snapshot
            .chains
            .get(symbol)
            .cloned()
            .ok_or_else(|| GexDeskError::ChainUnavailable {
                symbol: symbol.to_string(),
                reason: "not in snapshot".to_string(),
            })
    }

    async fn market_data(&self, symbols: &[String]) -> Result<Vec<MarketDataEntry>> {
        let wanted = wanted(symbols);
        Ok(self
            .snapshot
            .market_data
            .iter()
            .filter(|m| wanted.contains(m.symbol.as_str()))
            .cloned()
            .collect())
    }

    async fn greeks_stream(&self, streamer_symbols: &[String]) -> Result<GreeksStream> {
        let wanted = wanted(streamer_symbols);
        let events: Vec<GreeksEvent> = self
            .snapshot
            .greeks
            .iter()
            .filter(|g| wanted.contains(g.event_symbol.as_str()))
            .cloned()
            .collect();
        Ok(Box::pin(stream::iter(events)))
    }

    async fn market_metrics(&self, symbols: &[String]) -> Result<Vec<MarketMetric>> {
        let wanted = wanted(symbols);
        Ok(self
            .snapshot
            .metrics
            .iter()
            .filter(|m| wanted.contains(m.symbol.as_str()))
            .cloned()
            .collect())
    }

    async fn equity_quotes(&self, symbols: &[String]) -> Result<Vec<EquityQuote>> {
        let wanted = wanted(symbols);
        Ok(self
            .snapshot
            .quotes
            .iter()
            .filter(|q| wanted.contains(q.symbol.as_str()))
            .cloned()
            .collect())
    }

    async fn watchlists(&self, scope: WatchlistScope) -> Result<Vec<Watchlist>> {
        Ok(match scope {
            WatchlistScope::Private => self.snapshot.private_watchlists.clone(),
            WatchlistScope::Public => self.snapshot.public_watchlists.clone(),
        })
    }
}

#[async_trait]
impl AccountSource for SnapshotSource {
    async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self
            .snapshot
            .accounts
            .iter()
            .map(|a| a.account.clone())
            .collect())
    }

    async fn balances(&self, account: &Account) -> Result<AccountBalances> {
        Ok(self.account(account)?.balances.clone())
    }

    async fn positions(&self, account: &Account) -> Result<Vec<Position>> {
        Ok(self.account(account)?.positions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use rust_decimal_macros::dec;

    const SNAPSHOT: &str = r#"{
        "spot": {"SPY": {"type": "trade", "price": "500.0"}},
        "chains": {"SPY": [{
            "symbol": "SPY   250117C00500000",
            "streamer_symbol": ".SPY250117C500",
            "option_type": "C",
            "strike_price": "500",
            "expiration_date": "2025-01-17"
        }]},
        "market_data": [{"symbol": "SPY   250117C00500000", "open_interest": 1200}],
        "greeks": [
            {"event_symbol": ".SPY250117C500", "gamma": "0.02"},
            {"event_symbol": ".QQQ250117C400", "gamma": "0.05"}
        ],
        "accounts": [{"account_number": "5WW1", "balances": {"net_liquidating_value": "1000"}}]
    }"#;

    #[tokio::test]
    async fn test_snapshot_serves_market_data() {
        let source = SnapshotSource::from_json(SNAPSHOT).unwrap();

        let spot = source.spot_event("SPY").await.unwrap().unwrap();
        assert_eq!(spot.spot_price(), Some(dec!(500)));

        let chain = source.option_chain("SPY").await.unwrap();
        assert_eq!(chain.len(), 1);
        assert!(source.option_chain("QQQ").await.is_err());

        let md = source
            .market_data(&["SPY   250117C00500000".to_string()])
            .await
            .unwrap();
        assert_eq!(md[0].open_interest, Some(1200));
    }

    #[tokio::test]
    async fn test_snapshot_greeks_stream_filters_subscription() {
        let source = SnapshotSource::from_json(SNAPSHOT).unwrap();
        let events: Vec<GreeksEvent> = source
            .greeks_stream(&[".SPY250117C500".to_string()])
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_symbol, ".SPY250117C500");
    }

    #[tokio::test]
    async fn test_snapshot_accounts() {
        let source = SnapshotSource::from_json(SNAPSHOT).unwrap();
        let accounts = source.accounts().await.unwrap();
        assert_eq!(accounts[0].account_number, "5WW1");

        let balances = source.balances(&accounts[0]).await.unwrap();
        assert_eq!(balances.nlv(), dec!(1000));
        assert!(source.positions(&accounts[0]).await.unwrap().is_empty());
    }
}
