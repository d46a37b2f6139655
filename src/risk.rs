//! Portfolio risk assessment
//!
//! Buying power usage, position sizing, and portfolio greeks measured against
//! NLV-relative limits.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::broker::{collect_greeks, select_account, AccountSource, CollectUntil, MarketDataSource};
use crate::config::{wait_duration, RiskConfig};
use crate::domain::{Account, AccountBalances, GreeksEvent, OccSymbol, Position};
use crate::error::{Result, RiskError};
use crate::schedule::SessionStatus;

/// NLV-relative limits
#[derive(Debug, Clone, Copy)]
pub struct RiskLimits {
    /// Percent of NLV
    pub max_bp_usage_pct: Decimal,
    /// Percent of NLV
    pub max_trade_pct: Decimal,
    /// Fraction of NLV
    pub theta_low_pct: Decimal,
    /// Fraction of NLV
    pub theta_high_pct: Decimal,
}

impl From<&RiskConfig> for RiskLimits {
    fn from(config: &RiskConfig) -> Self {
        Self {
            max_bp_usage_pct: config.max_bp_usage_pct,
            max_trade_pct: config.max_trade_pct,
            theta_low_pct: config.theta_low_pct,
            theta_high_pct: config.theta_high_pct,
        }
    }
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self::from(&RiskConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ThetaStatus {
    Ok,
    Low { current: Decimal, target: Decimal },
    High { current: Decimal, target: Decimal },
}

impl std::fmt::Display for ThetaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThetaStatus::Ok => write!(f, "OK"),
            ThetaStatus::Low { current, target } => {
                write!(f, "LOW (Current: {:.2}, Target > {:.2})", current, target)
            }
            ThetaStatus::High { current, target } => {
                write!(f, "HIGH (Current: {:.2}, Target < {:.2})", current, target)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioRiskReport {
    pub nlv: Decimal,
    pub bp_usage_pct: Decimal,
    pub bp_limit_pct: Decimal,
    pub bp_usage_status: String,
    pub day_trade_excess: Decimal,
    pub day_trading_buying_power: Decimal,
    pub cash_balance: Decimal,
    pub trade_size_warnings: Vec<String>,
    pub session_warnings: Vec<String>,
    pub portfolio_delta: Decimal,
    pub portfolio_theta: Decimal,
    pub theta_status: ThetaStatus,
}

impl PortfolioRiskReport {
    pub fn bp_exceeded(&self) -> bool {
        self.bp_usage_pct > self.bp_limit_pct
    }

    /// New risk is blocked while buying power usage is over the limit, unless forced
    pub fn check_new_risk(&self, force: bool) -> std::result::Result<(), RiskError> {
        if self.bp_exceeded() && !force {
            return Err(RiskError::BuyingPowerExceeded {
                usage_pct: self.bp_usage_pct.round_dp(2),
                limit_pct: self.bp_limit_pct,
            });
        }
        Ok(())
    }

    pub fn is_blocked(&self, force: bool) -> bool {
        self.check_new_risk(force).is_err()
    }
}

fn pct_of(value: Decimal, nlv: Decimal) -> Decimal {
    if nlv > Decimal::ZERO {
        value / nlv * Decimal::ONE_HUNDRED
    } else {
        Decimal::ZERO
    }
}

/// Assess a portfolio. `greeks` is keyed by position symbol.
pub fn assess_portfolio(
    balances: &AccountBalances,
    positions: &[Position],
    greeks: &HashMap<String, GreeksEvent>,
    market_open: bool,
    limits: &RiskLimits,
) -> PortfolioRiskReport {
    let nlv = balances.nlv();
    let bp_usage_pct = pct_of(nlv - balances.buying_power(), nlv);

    let trade_size_warnings = positions
        .iter()
        .filter_map(|pos| {
            let size_pct = pct_of(pos.market_value(), nlv);
            (size_pct > limits.max_trade_pct).then(|| {
                RiskError::TradeSizeExceeded {
                    symbol: pos.symbol.clone(),
                    size_pct: size_pct.round_dp(2),
                    limit_pct: limits.max_trade_pct,
                }
                .to_string()
            })
        })
        .collect();

    let mut portfolio_delta = Decimal::ZERO;
    let mut portfolio_theta = Decimal::ZERO;
    for pos in positions.iter().filter(|p| p.is_option()) {
        let Some(g) = greeks.get(&pos.symbol) else {
            continue;
        };
        let (Some(delta), Some(theta)) = (g.delta, g.theta) else {
            continue;
        };
        let size = pos.multiplier() * pos.quantity;
        portfolio_delta += delta * size;
        portfolio_theta += theta * size;
    }

    let theta_low = nlv * limits.theta_low_pct;
    let theta_high = nlv * limits.theta_high_pct;
    let theta_status = if portfolio_theta < theta_low {
        ThetaStatus::Low {
            current: portfolio_theta,
            target: theta_low,
        }
    } else if portfolio_theta > theta_high {
        ThetaStatus::High {
            current: portfolio_theta,
            target: theta_high,
        }
    } else {
        ThetaStatus::Ok
    };

    let day_trade_excess = balances.day_trade_excess.unwrap_or_default();
    let mut session_warnings = Vec::new();
    if !market_open {
        session_warnings
            .push("Market is CLOSED. Liquidity and spreads may be unreliable.".to_string());
    }
    if day_trade_excess < Decimal::ZERO {
        session_warnings.push(format!(
            "Day Trade Excess is NEGATIVE: ${:.2}",
            day_trade_excess
        ));
    }

    let bp_usage_status = if bp_usage_pct > limits.max_bp_usage_pct {
        format!("WARNING (>{}%)", limits.max_bp_usage_pct)
    } else {
        "OK".to_string()
    };

    PortfolioRiskReport {
        nlv,
        bp_usage_pct,
        bp_limit_pct: limits.max_bp_usage_pct,
        bp_usage_status,
        day_trade_excess,
        day_trading_buying_power: balances.day_trading_buying_power.unwrap_or_default(),
        cash_balance: balances.cash_balance.unwrap_or_default(),
        trade_size_warnings,
        session_warnings,
        portfolio_delta,
        portfolio_theta,
        theta_status,
    }
}

/// Streaming symbol for a position, if it is an option with a parseable symbol
fn streamer_symbol(pos: &Position) -> Option<String> {
    if pos.symbol.starts_with('.') {
        return Some(pos.symbol.clone());
    }
    match pos.symbol.parse::<OccSymbol>() {
        Ok(occ) => Some(occ.to_streamer()),
        Err(e) => {
            warn!("Skipping greeks for {}: {}", pos.symbol, e);
            None
        }
    }
}

/// Monitors portfolio health for one account
pub struct RiskManager<S: MarketDataSource + AccountSource + ?Sized> {
    source: Arc<S>,
    session: Arc<dyn SessionStatus>,
    account_number: Option<String>,
    config: RiskConfig,
    account: RwLock<Option<Account>>,
}

impl<S: MarketDataSource + AccountSource + ?Sized> RiskManager<S> {
    pub fn new(
        source: Arc<S>,
        session: Arc<dyn SessionStatus>,
        account_number: Option<String>,
        config: RiskConfig,
    ) -> Self {
        Self {
            source,
            session,
            account_number,
            config,
            account: RwLock::new(None),
        }
    }

    /// Resolve the account once and reuse it
    pub async fn account(&self) -> Result<Account> {
        if let Some(account) = self.account.read().await.as_ref() {
            return Ok(account.clone());
        }

        let accounts = self.source.accounts().await?;
        let account = select_account(&accounts, self.account_number.as_deref())?;
        *self.account.write().await = Some(account.clone());
        Ok(account)
    }

    pub async fn calculate_portfolio_risk(&self) -> Result<PortfolioRiskReport> {
        let account = self.account().await?;
        let balances = self.source.balances(&account).await?;
        let positions = self.source.positions(&account).await?;
        info!(
            "Assessing {} positions for account {}",
            positions.len(),
            account.account_number
        );

        let market_open = self.session.is_market_open().await;
        let greeks = self.position_greeks(&positions).await;

        Ok(assess_portfolio(
            &balances,
            &positions,
            &greeks,
            market_open,
            &RiskLimits::from(&self.config),
        ))
    }

    /// Greeks keyed by position symbol
    async fn position_greeks(&self, positions: &[Position]) -> HashMap<String, GreeksEvent> {
        let mut by_streamer: HashMap<String, Vec<String>> = HashMap::new();
        for pos in positions.iter().filter(|p| p.is_option()) {
            if let Some(streamer) = streamer_symbol(pos) {
                by_streamer.entry(streamer).or_default().push(pos.symbol.clone());
            }
        }
        if by_streamer.is_empty() {
            return HashMap::new();
        }

        let symbols: Vec<String> = by_streamer.keys().cloned().collect();
        let expected: HashSet<String> = by_streamer.keys().cloned().collect();
        let window = wait_duration(self.config.greeks_timeout_secs);

        let stream = match self.source.greeks_stream(&symbols).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Error fetching greeks: {}", e);
                return HashMap::new();
            }
        };

        collect_greeks(stream, &expected, window, CollectUntil::Complete)
            .await
            .into_iter()
            .flat_map(|(streamer, event)| {
                by_streamer
                    .get(&streamer)
                    .into_iter()
                    .flatten()
                    .map(move |symbol| (symbol.clone(), event.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{AccountSnapshot, DeskSnapshot, SnapshotSource};
    use crate::domain::InstrumentType;
    use crate::schedule::{FixedSession, MarketState};
    use rust_decimal_macros::dec;

    fn balances() -> AccountBalances {
        AccountBalances {
            net_liquidating_value: Some(dec!(100000)),
            equity_buying_power: Some(dec!(60000)),
            ..Default::default()
        }
    }

    fn positions() -> Vec<Position> {
        vec![
            Position {
                symbol: "AAPL".to_string(),
                instrument_type: Some(InstrumentType::Equity),
                quantity: dec!(40),
                multiplier: Some(dec!(1)),
                mark: Some(dec!(150)),
                average_open_price: None,
                expires_at: None,
            },
            Position {
                symbol: "SPY 250117C500".to_string(),
                instrument_type: Some(InstrumentType::EquityOption),
                quantity: dec!(1),
                multiplier: Some(dec!(100)),
                mark: Some(dec!(2.0)),
                average_open_price: None,
                expires_at: None,
            },
        ]
    }

    fn spy_greeks(symbol: &str) -> GreeksEvent {
        GreeksEvent {
            event_symbol: symbol.to_string(),
            delta: Some(dec!(0.5)),
            theta: Some(dec!(-0.1)),
            ..Default::default()
        }
    }

    #[test]
    fn test_assess_portfolio() {
        let greeks = HashMap::from([(
            "SPY 250117C500".to_string(),
            spy_greeks("SPY 250117C500"),
        )]);
        let report = assess_portfolio(
            &balances(),
            &positions(),
            &greeks,
            true,
            &RiskLimits::default(),
        );

        assert_eq!(report.nlv, dec!(100000));
        // 100k - 60k = 40k used
        assert_eq!(report.bp_usage_pct, dec!(40));
        assert_eq!(report.bp_usage_status, "OK");

        // 150 * 40 = 6000, 6% of NLV
        assert_eq!(report.trade_size_warnings.len(), 1);
        assert!(report.trade_size_warnings[0].contains("AAPL"));

        assert_eq!(report.portfolio_delta, dec!(50));
        assert_eq!(report.portfolio_theta, dec!(-10));
        // Target theta is 0.1% of 100k = 100
        assert!(report.theta_status.to_string().starts_with("LOW"));
        assert!(report.session_warnings.is_empty());
        assert!(!report.is_blocked(false));
    }

    #[test]
    fn test_bp_limit_blocks_unless_forced() {
        let stretched = AccountBalances {
            equity_buying_power: Some(dec!(30000)),
            day_trade_excess: Some(dec!(-250)),
            ..balances()
        };
        let report = assess_portfolio(
            &stretched,
            &[],
            &HashMap::new(),
            false,
            &RiskLimits::default(),
        );

        assert_eq!(report.bp_usage_status, "WARNING (>50%)");
        assert!(report.is_blocked(false));
        assert!(!report.is_blocked(true));
        assert!(matches!(
            report.check_new_risk(false),
            Err(RiskError::BuyingPowerExceeded { .. })
        ));
        assert_eq!(
            report.session_warnings,
            vec![
                "Market is CLOSED. Liquidity and spreads may be unreliable.",
                "Day Trade Excess is NEGATIVE: $-250.00",
            ]
        );
    }

    #[test]
    fn test_zero_nlv_reads_zero_usage() {
        let report = assess_portfolio(
            &AccountBalances::default(),
            &positions(),
            &HashMap::new(),
            true,
            &RiskLimits::default(),
        );
        assert_eq!(report.bp_usage_pct, Decimal::ZERO);
        assert!(report.trade_size_warnings.is_empty());
        assert_eq!(report.theta_status, ThetaStatus::Ok);
    }

    #[tokio::test]
    async fn test_risk_manager_collects_position_greeks() {
        let snapshot = DeskSnapshot {
            greeks: vec![spy_greeks(".SPY250117C500")],
            accounts: vec![AccountSnapshot {
                account: Account {
                    account_number: "5WW1".to_string(),
                    nickname: None,
                },
                balances: balances(),
                positions: positions(),
            }],
            ..Default::default()
        };
        let manager = RiskManager::new(
            Arc::new(SnapshotSource::new(snapshot)),
            Arc::new(FixedSession(MarketState::Closed)),
            None,
            RiskConfig {
                greeks_timeout_secs: 0.2,
                ..RiskConfig::default()
            },
        );

        let report = manager.calculate_portfolio_risk().await.unwrap();
        assert_eq!(report.portfolio_delta, dec!(50));
        assert_eq!(report.session_warnings.len(), 1);
        assert_eq!(manager.account().await.unwrap().account_number, "5WW1");
    }

    #[tokio::test]
    async fn test_positions_sharing_a_streamer_symbol_both_get_greeks() {
        let mut held = positions();
        held.push(Position {
            symbol: "SPY   250117C00500000".to_string(),
            ..held[1].clone()
        });
        let snapshot = DeskSnapshot {
            greeks: vec![spy_greeks(".SPY250117C500")],
            accounts: vec![AccountSnapshot {
                account: Account {
                    account_number: "5WW1".to_string(),
                    nickname: None,
                },
                balances: balances(),
                positions: held,
            }],
            ..Default::default()
        };
        let manager = RiskManager::new(
            Arc::new(SnapshotSource::new(snapshot)),
            Arc::new(FixedSession(MarketState::Open)),
            None,
            RiskConfig {
                greeks_timeout_secs: 0.2,
                ..RiskConfig::default()
            },
        );

        let report = manager.calculate_portfolio_risk().await.unwrap();
        // 0.5 * 100 * 1 for each of the two contracts
        assert_eq!(report.portfolio_delta, dec!(100));
        assert_eq!(report.portfolio_theta, dec!(-20));
    }
}
