//! Daily desk run
//!
//! One pass over an account and a watchlist:
//! 1. portfolio health check, stopping when new risk is blocked
//! 2. positions due for closing
//! 3. IV-rank scan of the watchlist
//! 4. spread screening for every high-IVR target at its own rank

use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::broker::{AccountSource, MarketDataSource};
use crate::config::AppConfig;
use crate::error::{GexDeskError, Result};
use crate::gex::{GexAgent, GexParams};
use crate::risk::{PortfolioRiskReport, RiskManager};
use crate::scanner::{IvrData, Scanner};
use crate::schedule::SessionStatus;
use crate::strategy::{manage_positions, CloseSignal, StrategyScreener, StrategyTarget};

/// Options for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub watchlist: String,
    pub account: Option<String>,
    /// Continue even when buying power usage is over the limit
    pub force: bool,
    pub equity_only: bool,
    /// Overrides `scanner.ivr_threshold`
    pub ivr_threshold: Option<f64>,
    /// Attach gamma walls and regime to screened spreads
    pub with_gex: bool,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct DeskRun {
    pub risk: PortfolioRiskReport,
    /// Buying power was over the limit and `force` let the run continue
    pub forced: bool,
    pub close_signals: Vec<CloseSignal>,
    pub ivr_targets: Vec<IvrData>,
    pub strategies: Vec<StrategyTarget>,
}

pub struct DeskWorkflow<S: MarketDataSource + AccountSource + ?Sized> {
    source: Arc<S>,
    session: Arc<dyn SessionStatus>,
    config: AppConfig,
}

impl<S: MarketDataSource + AccountSource + ?Sized> DeskWorkflow<S> {
    pub fn new(source: Arc<S>, session: Arc<dyn SessionStatus>, config: AppConfig) -> Self {
        Self {
            source,
            session,
            config,
        }
    }

    /// Run every step at local time `now`
    pub async fn run_once(&self, opts: &RunOptions, now: NaiveDateTime) -> Result<DeskRun> {
        let today = now.date();

        let risk_manager = RiskManager::new(
            self.source.clone(),
            self.session.clone(),
            opts.account.clone(),
            self.config.risk.clone(),
        );
        let risk = risk_manager.calculate_portfolio_risk().await?;
        risk.check_new_risk(opts.force)?;
        let forced = risk.bp_exceeded();
        if forced {
            warn!("Proceeding despite buying power usage over the limit (--force)");
        }

        let account = risk_manager.account().await?;
        let positions = self.source.positions(&account).await?;
        let close_signals = manage_positions(&positions, today, &self.config.strategy);
        info!(
            "{} of {} positions hit exit criteria",
            close_signals.len(),
            positions.len()
        );

        let mut scanner_config = self.config.scanner.clone();
        if let Some(threshold) = opts.ivr_threshold {
            scanner_config.ivr_threshold = threshold;
        }
        let scanner = Scanner::new(self.source.clone(), scanner_config);
        let symbols = scanner
            .symbols_from_watchlist(&opts.watchlist, opts.equity_only)
            .await;
        if symbols.is_empty() {
            return Err(GexDeskError::Validation(format!(
                "No symbols found in watchlist {}",
                opts.watchlist
            )));
        }
        let results = scanner.scan_ivr(&symbols).await;
        let ivr_targets = scanner.high_ivr_targets(&results);

        let screener = StrategyScreener::new(self.source.clone(), self.config.strategy.clone())
            .with_wall_symbols(self.config.gex.wall_symbols.clone());
        let agent = GexAgent::with_params(self.source.clone(), GexParams::from(&self.config.gex));

        let mut strategies = Vec::new();
        for target in &ivr_targets {
            let Some(ivr) = target.iv_rank else {
                continue;
            };
            let gex = if opts.with_gex {
                Some(agent.calculate_at(&target.symbol, now).await)
            } else {
                None
            };
            strategies.extend(
                screener
                    .screen_with_gex(&target.symbol, ivr, gex.as_ref(), today)
                    .await,
            );
        }
        info!(
            "Screened {} targets into {} strategies",
            ivr_targets.len(),
            strategies.len()
        );

        Ok(DeskRun {
            risk,
            forced,
            close_signals,
            ivr_targets,
            strategies,
        })
    }
}
