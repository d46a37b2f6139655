//! Command dispatch against snapshot files

use clap::Parser;
use gexdesk::broker::{AccountSnapshot, DeskSnapshot};
use gexdesk::cli::{commands, Cli};
use gexdesk::config::AppConfig;
use gexdesk::domain::{Account, AccountBalances};
use rust_decimal_macros::dec;
use std::path::Path;

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/desk_snapshot.json");

fn cli(snapshot: &Path, args: &[&str]) -> Cli {
    let mut argv = vec!["gexdesk", "--json", "--snapshot"];
    argv.push(snapshot.to_str().unwrap());
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

fn write_stretched_snapshot(dir: &Path) -> std::path::PathBuf {
    let snapshot = DeskSnapshot {
        accounts: vec![AccountSnapshot {
            account: Account {
                account_number: "5WW9".to_string(),
                nickname: None,
            },
            // 75% of NLV in use
            balances: AccountBalances {
                net_liquidating_value: Some(dec!(40000)),
                equity_buying_power: Some(dec!(10000)),
                ..Default::default()
            },
            positions: Vec::new(),
        }],
        ..Default::default()
    };
    let path = dir.join("stretched.json");
    std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();
    path
}

#[tokio::test]
async fn risk_fails_when_new_risk_is_blocked() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_stretched_snapshot(dir.path());

    let err = commands::run(cli(&path, &["risk"]), AppConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("New risk blocked"));

    commands::run(cli(&path, &["risk", "--force"]), AppConfig::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn run_stops_on_blocked_risk() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_stretched_snapshot(dir.path());

    let err = commands::run(cli(&path, &["run", "-w", "Core"]), AppConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("--force"));
}

#[tokio::test]
async fn run_over_fixture_watchlist() {
    let mut config = AppConfig::default();
    config.gex.data_wait_secs = 0.1;
    config.strategy.greeks_timeout_secs = 0.1;
    config.risk.greeks_timeout_secs = 0.1;

    commands::run(cli(Path::new(FIXTURE), &["run", "-w", "Core"]), config.clone())
        .await
        .unwrap();

    let err = commands::run(cli(Path::new(FIXTURE), &["run", "-w", "Missing"]), config)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Missing"));
}

#[tokio::test]
async fn report_and_watchlists_over_fixture() {
    let fixture = Path::new(FIXTURE);
    commands::run(cli(fixture, &["report"]), AppConfig::default())
        .await
        .unwrap();
    commands::run(cli(fixture, &["watchlists"]), AppConfig::default())
        .await
        .unwrap();
}
