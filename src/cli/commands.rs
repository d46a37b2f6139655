//! Command handlers

use anyhow::{anyhow, Context as _};
use chrono::Local;
use rust_decimal::prelude::ToPrimitive;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::output::{
    print_items, print_json, print_kv, print_warn, CloseRow, IvrRow, OutputMode, PositionRow,
    StrategyRow, StrikeRow, WatchlistRow,
};
use super::{Cli, Commands};
use crate::broker::{select_account, AccountSource, MarketDataSource, SnapshotSource};
use crate::config::{AppConfig, MAX_WAIT_SECS};
use crate::domain::WatchlistScope;
use crate::error::GexDeskError;
use crate::gex::{GexAgent, GexParams, GexResult};
use crate::risk::{PortfolioRiskReport, RiskManager};
use crate::scanner::Scanner;
use crate::schedule::{format_countdown, FixedSession, MarketSchedule, MarketState, SessionStatus};
use crate::strategy::{manage_positions, CloseSignal, StrategyScreener, StrategyTarget};
use crate::workflow::{DeskWorkflow, RunOptions};

fn or_na<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

/// `--wait` seconds, rejecting values a `Duration` cannot hold
fn wait_override(secs: f64) -> anyhow::Result<Duration> {
    if !(0.0..=MAX_WAIT_SECS).contains(&secs) {
        return Err(anyhow!(
            "--wait must be between 0 and {} seconds (got {})",
            MAX_WAIT_SECS,
            secs
        ));
    }
    Ok(Duration::try_from_secs_f64(secs)?)
}

fn open_snapshot(path: Option<&Path>) -> anyhow::Result<Arc<SnapshotSource>> {
    let path = path.ok_or_else(|| {
        anyhow!("no broker feed configured: pass --snapshot <file> or set GEXDESK_SNAPSHOT")
    })?;
    let source = SnapshotSource::from_path(path)
        .with_context(|| format!("loading snapshot {}", path.display()))?;
    info!("Using {} data source", source.name());
    Ok(Arc::new(source))
}

/// Dispatch a parsed command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    let Cli {
        command,
        snapshot,
        json,
        ..
    } = cli;
    let mode = OutputMode::from_json_flag(json);
    let snapshot = snapshot.as_deref();

    match command {
        Commands::Run {
            watchlist,
            account,
            force,
            threshold,
            all_types,
            no_gex,
        } => {
            let opts = RunOptions {
                watchlist,
                account: account.or_else(|| config.broker.account_number.clone()),
                force,
                equity_only: !all_types,
                ivr_threshold: threshold,
                with_gex: !no_gex,
            };
            run_desk(open_snapshot(snapshot)?, config, opts, mode).await
        }
        Commands::Gex {
            symbol,
            max_dte,
            strike_range,
            wait,
            all_strikes,
        } => {
            let mut params = GexParams::from(&config.gex);
            if let Some(max_dte) = max_dte {
                params.max_dte = max_dte;
            }
            if let Some(pct) = strike_range {
                params.strike_range_pct = pct;
            }
            if let Some(secs) = wait {
                params.data_wait = wait_override(secs)?;
            }
            run_gex(open_snapshot(snapshot)?, params, &symbol, all_strikes, mode).await
        }
        Commands::Screen {
            symbols,
            ivr,
            no_gex,
        } => run_screen(open_snapshot(snapshot)?, &config, &symbols, ivr, no_gex, mode).await,
        Commands::Scan {
            watchlist,
            symbols,
            all_types,
            threshold,
        } => {
            let source = open_snapshot(snapshot)?;
            let mut scanner_config = config.scanner.clone();
            if let Some(threshold) = threshold {
                scanner_config.ivr_threshold = threshold;
            }
            let scanner = Scanner::new(source, scanner_config);
            run_scan(&scanner, watchlist.as_deref(), symbols, all_types, mode).await
        }
        Commands::Risk { account, force } => {
            let account = account.or_else(|| config.broker.account_number.clone());
            run_risk(open_snapshot(snapshot)?, &config, account, force, mode).await
        }
        Commands::Manage { account } => {
            let account = account.or_else(|| config.broker.account_number.clone());
            run_manage(open_snapshot(snapshot)?, &config, account.as_deref(), mode).await
        }
        Commands::Report { account } => {
            let account = account.or_else(|| config.broker.account_number.clone());
            run_report(open_snapshot(snapshot)?, account.as_deref(), mode).await
        }
        Commands::Watchlists => run_watchlists(open_snapshot(snapshot)?, mode).await,
        Commands::Market => run_market(&config, mode).await,
    }
}

fn print_gex_summary(result: &GexResult) {
    let levels = result.gamma_walls();
    print_kv("Symbol", &result.profile.symbol);
    print_kv("Spot", &format!("{:.2}", levels.spot_price));
    print_kv("Total GEX", &format!("{:.2}M", levels.total_gex_musd));
    print_kv("Regime", &format!("{} gamma", result.regime().as_str().to_uppercase()));
    print_kv("Zero Gamma", &or_na(levels.zero_gamma.map(|z| format!("{z:.2}"))));
    print_kv("Call Wall", &or_na(levels.call_wall));
    print_kv("Put Wall", &or_na(levels.put_wall));
    match &result.signal {
        Some(signal) => print_kv(
            "Signal",
            &format!("{} ({:?}): {}", signal.kind, signal.confidence, signal.message),
        ),
        None => print_kv("Signal", "none"),
    }
    println!();
}

async fn run_gex(
    source: Arc<SnapshotSource>,
    params: GexParams,
    symbol: &str,
    all_strikes: bool,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let agent = GexAgent::with_params(source, params);
    let result = agent.calculate(symbol).await;

    if mode == OutputMode::Json {
        return print_json(&result);
    }
    if let Some(failure) = &result.failure {
        print_warn(&format!("{}: {}", symbol, failure));
        return Ok(());
    }

    print_gex_summary(&result);
    let rows: Vec<StrikeRow> = if all_strikes {
        result.profile.strike_exposures.iter().map(StrikeRow::from).collect()
    } else {
        result
            .profile
            .strike_exposures
            .iter()
            .filter(|r| result.profile.major_levels.iter().any(|m| m.strike == r.strike))
            .map(StrikeRow::from)
            .collect()
    };
    print_items(&rows, mode)
}

async fn lookup_ivr(source: &SnapshotSource, symbol: &str) -> anyhow::Result<f64> {
    let metrics = source.market_metrics(&[symbol.to_string()]).await?;
    metrics
        .iter()
        .find(|m| m.symbol == symbol)
        .and_then(|m| m.implied_volatility_index_rank)
        .and_then(|r| r.to_f64())
        .map(|r| r * 100.0)
        .ok_or_else(|| anyhow!("no IV rank available for {}", symbol))
}

async fn run_screen(
    source: Arc<SnapshotSource>,
    config: &AppConfig,
    symbols: &[String],
    ivr: Option<f64>,
    no_gex: bool,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let screener = StrategyScreener::new(source.clone(), config.strategy.clone())
        .with_wall_symbols(config.gex.wall_symbols.clone());
    let agent = GexAgent::with_params(source.clone(), GexParams::from(&config.gex));
    let today = Local::now().date_naive();

    let mut targets: Vec<StrategyTarget> = Vec::new();
    for symbol in symbols {
        let ivr = match ivr {
            Some(ivr) => ivr,
            None => match lookup_ivr(&source, symbol).await {
                Ok(ivr) => ivr,
                Err(e) => {
                    warn!("Skipping {}: {}", symbol, e);
                    continue;
                }
            },
        };

        let gex = if no_gex {
            None
        } else {
            Some(agent.calculate(symbol).await)
        };
        targets.extend(
            screener
                .screen_with_gex(symbol, ivr, gex.as_ref(), today)
                .await,
        );
    }

    if mode == OutputMode::Json {
        return print_json(&targets);
    }

    print_strategies(&targets, mode)
}

async fn run_scan(
    scanner: &Scanner<SnapshotSource>,
    watchlist: Option<&str>,
    symbols: Vec<String>,
    all_types: bool,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let symbols = match watchlist {
        Some(name) => scanner.symbols_from_watchlist(name, !all_types).await,
        None => symbols,
    };
    if symbols.is_empty() {
        return Err(anyhow!("no symbols to scan"));
    }

    let results = scanner.scan_ivr(&symbols).await;
    let targets = scanner.high_ivr_targets(&results);

    if mode == OutputMode::Json {
        return print_json(&targets);
    }
    let rows: Vec<IvrRow> = targets.iter().map(IvrRow::from).collect();
    print_ivr_targets(scanner.threshold(), &rows, mode)
}

fn print_ivr_targets(threshold: f64, rows: &[IvrRow], mode: OutputMode) -> anyhow::Result<()> {
    println!("Threshold: >= {}% IVR | Targets: {}", threshold, rows.len());
    print_items(rows, mode)
}

fn session_status(config: &AppConfig) -> anyhow::Result<Arc<dyn SessionStatus>> {
    if config.broker.session_token.is_none() {
        warn!("No session token configured; market state unknown");
        return Ok(Arc::new(FixedSession(MarketState::Unknown)));
    }
    Ok(Arc::new(MarketSchedule::from_config(&config.broker)?))
}

fn print_health(report: &PortfolioRiskReport) {
    print_kv("NLV", &format!("${:.2}", report.nlv));
    print_kv(
        "BP Usage",
        &format!("{:.2}% {}", report.bp_usage_pct, report.bp_usage_status),
    );
    print_kv("Cash", &format!("${:.2}", report.cash_balance));
    print_kv("DT BP", &format!("${:.2}", report.day_trading_buying_power));
    print_kv("DT Excess", &format!("${:.2}", report.day_trade_excess));
    print_kv("Delta", &format!("{:.2}", report.portfolio_delta));
    print_kv("Theta", &format!("{:.2} {}", report.portfolio_theta, report.theta_status));
    for warning in report
        .trade_size_warnings
        .iter()
        .chain(&report.session_warnings)
    {
        print_warn(warning);
    }
}

/// Fails the command when new risk is blocked so the process exits non-zero
fn gate_new_risk(report: &PortfolioRiskReport, force: bool) -> anyhow::Result<()> {
    report.check_new_risk(force).map_err(GexDeskError::from)?;
    if report.bp_exceeded() {
        print_warn("Proceeding despite buying power usage over the limit (--force)");
    }
    Ok(())
}

async fn run_risk(
    source: Arc<SnapshotSource>,
    config: &AppConfig,
    account: Option<String>,
    force: bool,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let manager = RiskManager::new(source, session_status(config)?, account, config.risk.clone());
    let report = manager.calculate_portfolio_risk().await?;

    if mode == OutputMode::Json {
        print_json(&report)?;
    } else {
        print_health(&report);
    }
    gate_new_risk(&report, force)
}

fn print_close_signals(signals: &[CloseSignal], mode: OutputMode) -> anyhow::Result<()> {
    let rows: Vec<CloseRow> = signals.iter().map(CloseRow::from).collect();
    print_items(&rows, mode)
}

fn print_strategies(targets: &[StrategyTarget], mode: OutputMode) -> anyhow::Result<()> {
    if let Some(ctx) = targets.iter().find(|t| t.gex_regime.is_some()) {
        println!("Market Gamma Context");
        if let Some(regime) = ctx.gex_regime {
            print_kv("Regime", &format!("{} GAMMA", regime.as_str().to_uppercase()));
        }
        if let Some(signal) = ctx.gex_signal {
            print_kv("Signal", signal.as_str());
        }
        print_kv(
            "Walls",
            &format!(
                "Call: {} | Put: {}",
                or_na(ctx.gamma_call_wall),
                or_na(ctx.gamma_put_wall)
            ),
        );
        println!();
    }

    let rows: Vec<StrategyRow> = targets.iter().map(StrategyRow::from).collect();
    print_items(&rows, mode)
}

async fn run_desk(
    source: Arc<SnapshotSource>,
    config: AppConfig,
    opts: RunOptions,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let threshold = opts.ivr_threshold.unwrap_or(config.scanner.ivr_threshold);
    let workflow = DeskWorkflow::new(source, session_status(&config)?, config);
    let run = workflow.run_once(&opts, Local::now().naive_local()).await?;

    if mode == OutputMode::Json {
        return print_json(&run);
    }

    println!("Portfolio Health");
    print_health(&run.risk);
    if run.forced {
        print_warn("Proceeding despite buying power usage over the limit (--force)");
    }

    println!("\nPosition Management");
    print_close_signals(&run.close_signals, mode)?;

    println!("\nWatchlist {}", opts.watchlist);
    let rows: Vec<IvrRow> = run.ivr_targets.iter().map(IvrRow::from).collect();
    print_ivr_targets(threshold, &rows, mode)?;

    if !run.ivr_targets.is_empty() {
        println!();
        print_strategies(&run.strategies, mode)?;
    }
    Ok(())
}

async fn run_manage(
    source: Arc<SnapshotSource>,
    config: &AppConfig,
    account: Option<&str>,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let accounts = source.accounts().await?;
    let account = select_account(&accounts, account)?;
    let positions = source.positions(&account).await?;

    let signals = manage_positions(&positions, Local::now().date_naive(), &config.strategy);
    print_close_signals(&signals, mode)
}

async fn run_report(
    source: Arc<SnapshotSource>,
    account: Option<&str>,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let accounts = source.accounts().await?;
    let account = select_account(&accounts, account)?;
    let balances = source.balances(&account).await?;
    let positions = source.positions(&account).await?;

    if mode == OutputMode::Json {
        return print_json(&serde_json::json!({
            "account": account,
            "balances": balances,
            "positions": positions,
        }));
    }

    let name = account.nickname.as_deref().unwrap_or("");
    print_kv("Account", &format!("{} {}", account.account_number, name));
    print_kv("NLV", &format!("${:.2}", balances.nlv()));
    print_kv("Equity BP", &format!("${:.2}", balances.buying_power()));
    let money = |v: Option<rust_decimal::Decimal>| format!("${:.2}", v.unwrap_or_default());
    print_kv("Cash", &money(balances.cash_balance));
    print_kv("Maint Margin", &money(balances.maintenance_margin));
    print_kv("DT BP", &money(balances.day_trading_buying_power));
    print_kv("DT Excess", &money(balances.day_trade_excess));
    print_kv("Pending Cash", &money(balances.pending_cash));
    println!();

    let today = Local::now().date_naive();
    let rows: Vec<PositionRow> = positions.iter().map(|p| PositionRow::new(p, today)).collect();
    print_items(&rows, mode)
}

async fn run_watchlists(source: Arc<SnapshotSource>, mode: OutputMode) -> anyhow::Result<()> {
    let mut rows = Vec::new();
    for scope in [WatchlistScope::Private, WatchlistScope::Public] {
        match source.watchlists(scope).await {
            Ok(lists) => rows.extend(
                lists
                    .iter()
                    .map(|w| WatchlistRow::new(scope, &w.name, w.entries.len())),
            ),
            Err(e) => warn!("Failed to load {:?} watchlists: {}", scope, e),
        }
    }
    print_items(&rows, mode)
}

async fn run_market(config: &AppConfig, mode: OutputMode) -> anyhow::Result<()> {
    let schedule = MarketSchedule::from_config(&config.broker)?;
    let data = schedule.session_data().await;
    let state = data.as_ref().map_or(MarketState::Unknown, |d| d.state);

    if mode == OutputMode::Json {
        return print_json(&data);
    }

    print_kv("Market", state.as_str());
    if state != MarketState::Open {
        if let Some(next_open) = data.as_ref().and_then(|d| d.next_open()) {
            let countdown = format_countdown(next_open - chrono::Utc::now());
            print_kv(
                "Next Open",
                &format!("{} (in {})", next_open.format("%Y-%m-%d %H:%M UTC"), countdown),
            );
        }
    }
    Ok(())
}
