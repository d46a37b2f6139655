use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;

use crate::domain::{
    Account, AccountBalances, EquityQuote, GreeksEvent, MarketDataEntry, MarketMetric,
    OptionInstrument, Position, SpotEvent, Watchlist, WatchlistScope,
};
use crate::error::{GexDeskError, Result};

/// Live greeks events for a set of subscribed contracts
pub type GreeksStream = Pin<Box<dyn Stream<Item = GreeksEvent> + Send>>;

pub(crate) fn unsupported(feature: &str, source_name: &str) -> GexDeskError {
    GexDeskError::Unsupported {
        feature: feature.to_string(),
        source_name: source_name.to_string(),
    }
}

/// Market data supplied by the brokerage collaborator
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// First quote/trade event for an underlying, if any arrives
    async fn spot_event(&self, symbol: &str) -> Result<Option<SpotEvent>>;

    /// Full option chain for an underlying
    async fn option_chain(&self, symbol: &str) -> Result<Vec<OptionInstrument>>;

    /// Open interest / volume / marks for option or equity symbols
    async fn market_data(&self, symbols: &[String]) -> Result<Vec<MarketDataEntry>>;

    /// Subscribe to greeks for streamer symbols
    async fn greeks_stream(&self, streamer_symbols: &[String]) -> Result<GreeksStream>;

    async fn market_metrics(&self, _symbols: &[String]) -> Result<Vec<MarketMetric>> {
        Err(unsupported("market_metrics", self.name()))
    }

    async fn equity_quotes(&self, _symbols: &[String]) -> Result<Vec<EquityQuote>> {
        Err(unsupported("equity_quotes", self.name()))
    }

    async fn watchlists(&self, _scope: WatchlistScope) -> Result<Vec<Watchlist>> {
        Err(unsupported("watchlists", self.name()))
    }
}

/// Account data supplied by the brokerage collaborator
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn accounts(&self) -> Result<Vec<Account>>;

    async fn balances(&self, account: &Account) -> Result<AccountBalances>;

    async fn positions(&self, account: &Account) -> Result<Vec<Position>>;
}

/// Pick the account to operate on.
///
/// A requested number must exist. Without one, a single account is used and
/// several accounts are an error so the wrong one is never picked silently.
pub fn select_account(accounts: &[Account], requested: Option<&str>) -> Result<Account> {
    let available = || {
        accounts
            .iter()
            .map(|a| a.account_number.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    if accounts.is_empty() {
        return Err(GexDeskError::Account("No accounts found".to_string()));
    }

    match requested {
        Some(number) => accounts
            .iter()
            .find(|a| a.account_number == number)
            .cloned()
            .ok_or_else(|| {
                GexDeskError::Account(format!(
                    "Account {number} not found. Available: {}",
                    available()
                ))
            }),
        None if accounts.len() > 1 => Err(GexDeskError::Account(format!(
            "Multiple accounts found. Set GEXDESK_BROKER__ACCOUNT_NUMBER or pass --account. Available: {}",
            available()
        ))),
        None => Ok(accounts[0].clone()),
    }
}
