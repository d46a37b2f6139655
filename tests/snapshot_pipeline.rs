//! End-to-end runs against the bundled broker snapshot

use chrono::{NaiveDate, NaiveDateTime};
use gexdesk::broker::SnapshotSource;
use gexdesk::domain::{GammaRegime, LevelSide};
use gexdesk::gex::{GexAgent, GexFailure, GexParams};
use gexdesk::risk::RiskManager;
use gexdesk::scanner::Scanner;
use gexdesk::schedule::{FixedSession, MarketState};
use gexdesk::config::{RiskConfig, ScannerConfig};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn source() -> Arc<SnapshotSource> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/desk_snapshot.json");
    Arc::new(SnapshotSource::from_path(path).expect("fixture should load"))
}

fn at(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 6)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn agent() -> GexAgent<SnapshotSource> {
    let params = GexParams {
        data_wait: Duration::from_millis(100),
        ..GexParams::default()
    };
    GexAgent::with_params(source(), params)
}

#[tokio::test]
async fn gex_profile_from_snapshot() {
    let result = agent().calculate_at("SPY", at(11)).await;
    assert!(result.is_ok(), "failure: {:?}", result.failure);

    // March expiry is outside the 30 DTE window
    assert_eq!(result.contracts.len(), 4);

    let nets: Vec<f64> = result
        .profile
        .strike_exposures
        .iter()
        .map(|r| r.net_gex_musd)
        .collect();
    let expected = [-80.0, -20.0, 30.0, 90.0];
    for (got, want) in nets.iter().zip(expected) {
        assert!((got - want).abs() < 1e-9, "got {got}, want {want}");
    }

    let levels = result.gamma_walls();
    assert_eq!(levels.call_wall, Some(dec!(420)));
    assert_eq!(levels.put_wall, Some(dec!(380)));
    assert!((levels.zero_gamma.unwrap() - 398.0).abs() < 1e-9);
    assert_eq!(result.regime(), GammaRegime::Positive);

    let majors: Vec<(String, LevelSide)> = result
        .profile
        .major_levels
        .iter()
        .map(|m| (m.strike.to_string(), m.side))
        .collect();
    assert_eq!(
        majors,
        vec![
            ("380".to_string(), LevelSide::Put),
            ("420".to_string(), LevelSide::Call)
        ]
    );

    // Walls are 5% away, so no pin even late in the session
    let late = agent().calculate_at("SPY", at(15)).await;
    assert_eq!(late.signal, None);
}

#[tokio::test]
async fn gex_empty_chain_is_labeled() {
    let result = agent().calculate_at("QQQ", at(11)).await;
    assert_eq!(result.failure, Some(GexFailure::NoContracts));
    assert_eq!(result.profile.spot_price, 350.0);
    assert!(result.profile.strike_exposures.is_empty());
    assert_eq!(result.regime(), GammaRegime::Negative);

    let missing = agent().calculate_at("IWM", at(11)).await;
    assert_eq!(missing.failure, Some(GexFailure::SpotUnavailable));
}

#[tokio::test]
async fn risk_report_from_snapshot() {
    let manager = RiskManager::new(
        source(),
        Arc::new(FixedSession(MarketState::Open)),
        Some("5WW46136".to_string()),
        RiskConfig {
            greeks_timeout_secs: 0.5,
            ..RiskConfig::default()
        },
    );

    let report = manager.calculate_portfolio_risk().await.unwrap();
    assert_eq!(report.nlv, dec!(100000));
    assert_eq!(report.bp_usage_pct, dec!(40));
    assert_eq!(report.trade_size_warnings.len(), 1);
    assert!(report.trade_size_warnings[0].contains("AAPL"));
    assert_eq!(report.portfolio_delta, dec!(50));
    assert_eq!(report.portfolio_theta, dec!(-10));
    assert!(report.session_warnings.is_empty());
    assert!(!report.is_blocked(false));
}

#[tokio::test]
async fn risk_rejects_unknown_account() {
    let manager = RiskManager::new(
        source(),
        Arc::new(FixedSession(MarketState::Closed)),
        Some("NOPE".to_string()),
        RiskConfig::default(),
    );
    let err = manager.calculate_portfolio_risk().await.unwrap_err();
    assert!(err.to_string().contains("5WW46136"));
}

#[tokio::test]
async fn scan_watchlist_from_snapshot() {
    let scanner = Scanner::new(source(), ScannerConfig::default());
    let symbols = scanner.symbols_from_watchlist("Core", true).await;
    assert_eq!(symbols, vec!["SPY", "QQQ", "TSLA"]);

    let results = scanner.scan_ivr(&symbols).await;
    let targets = scanner.high_ivr_targets(&results);
    let ranked: Vec<&str> = targets.iter().map(|t| t.symbol.as_str()).collect();
    assert_eq!(ranked, vec!["TSLA", "SPY"]);
    assert_eq!(targets[0].next_earnings_date.as_deref(), Some("01/29"));
}
