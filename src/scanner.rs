//! Watchlist IV-rank scanner

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::broker::MarketDataSource;
use crate::config::ScannerConfig;
use crate::domain::{EquityQuote, InstrumentType, MarketMetric, WatchlistScope};

/// Volatility snapshot for one underlying. Rank and percentile are percentages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IvrData {
    pub symbol: String,
    pub current_iv: Option<f64>,
    pub iv_rank: Option<f64>,
    pub iv_percentile: Option<f64>,
    pub beta: Option<f64>,
    pub liquidity_rank: Option<f64>,
    /// Next earnings date as MM/DD
    pub next_earnings_date: Option<String>,
    pub current_price: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub has_options: bool,
}

impl IvrData {
    fn from_parts(symbol: &str, metric: Option<&MarketMetric>, quote: Option<&EquityQuote>) -> Self {
        let mut data = IvrData {
            symbol: symbol.to_string(),
            ..Default::default()
        };

        if let Some(quote) = quote {
            data.current_price = quote.mark.or(quote.last);
            data.volume = quote.volume;
        }

        if let Some(metric) = metric {
            let to_f64 = |v: Option<Decimal>| v.and_then(|d| d.to_f64());
            data.iv_rank = to_f64(metric.implied_volatility_index_rank).map(|r| r * 100.0);
            data.iv_percentile = to_f64(metric.implied_volatility_percentile).map(|p| p * 100.0);
            data.current_iv = to_f64(metric.implied_volatility_index);
            data.beta = to_f64(metric.beta);
            data.liquidity_rank = to_f64(metric.liquidity_rank);
            data.next_earnings_date = metric
                .expected_report_date
                .map(|d| d.format("%m/%d").to_string());
            data.has_options = true;
        }

        data
    }
}

pub struct Scanner<S: MarketDataSource + ?Sized> {
    source: Arc<S>,
    config: ScannerConfig,
}

impl<S: MarketDataSource + ?Sized> Scanner<S> {
    pub fn new(source: Arc<S>, config: ScannerConfig) -> Self {
        Self { source, config }
    }

    /// IV rank (percent) a symbol needs to become a target
    pub fn threshold(&self) -> f64 {
        self.config.ivr_threshold
    }

    /// Symbols of a named watchlist, searching private lists before public ones
    pub async fn symbols_from_watchlist(&self, name: &str, equity_only: bool) -> Vec<String> {
        let mut found = None;
        for scope in [WatchlistScope::Private, WatchlistScope::Public] {
            match self.source.watchlists(scope).await {
                Ok(lists) => {
                    found = lists.into_iter().find(|w| w.name == name);
                    if found.is_some() {
                        break;
                    }
                }
                Err(e) => error!("Failed to load {:?} watchlists: {}", scope, e),
            }
        }

        let Some(watchlist) = found else {
            error!("Watchlist '{}' not found", name);
            return Vec::new();
        };

        watchlist
            .entries
            .into_iter()
            .filter(|e| !equity_only || e.instrument_type == Some(InstrumentType::Equity))
            .map(|e| e.symbol)
            .collect()
    }

    /// IV metrics and prices per symbol. A failing batch is logged and skipped.
    pub async fn scan_ivr(&self, symbols: &[String]) -> HashMap<String, IvrData> {
        let mut results = HashMap::with_capacity(symbols.len());

        for batch in symbols.chunks(self.config.batch_size.max(1)) {
            let metrics = match self.source.market_metrics(batch).await {
                Ok(m) => m,
                Err(e) => {
                    error!("Error scanning batch: {}", e);
                    continue;
                }
            };
            let quotes = match self.source.equity_quotes(batch).await {
                Ok(q) => q,
                Err(e) => {
                    error!("Error scanning batch: {}", e);
                    continue;
                }
            };

            let metrics: HashMap<&str, &MarketMetric> =
                metrics.iter().map(|m| (m.symbol.as_str(), m)).collect();
            let quotes: HashMap<&str, &EquityQuote> =
                quotes.iter().map(|q| (q.symbol.as_str(), q)).collect();

            for symbol in batch {
                let data = IvrData::from_parts(
                    symbol,
                    metrics.get(symbol.as_str()).copied(),
                    quotes.get(symbol.as_str()).copied(),
                );
                results.insert(symbol.clone(), data);
            }
        }

        info!("Scanned {}/{} symbols", results.len(), symbols.len());
        results
    }

    /// Results at or above the IVR threshold, highest rank first
    pub fn high_ivr_targets(&self, results: &HashMap<String, IvrData>) -> Vec<IvrData> {
        let threshold = self.config.ivr_threshold;
        let mut targets: Vec<IvrData> = results
            .values()
            .filter(|d| d.iv_rank.is_some_and(|r| r >= threshold))
            .cloned()
            .collect();
        targets.sort_by(|a, b| {
            b.iv_rank
                .unwrap_or_default()
                .total_cmp(&a.iv_rank.unwrap_or_default())
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{DeskSnapshot, SnapshotSource};
    use crate::domain::{Watchlist, WatchlistEntry};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn entry(symbol: &str, instrument_type: InstrumentType) -> WatchlistEntry {
        WatchlistEntry {
            symbol: symbol.to_string(),
            instrument_type: Some(instrument_type),
        }
    }

    fn metric(symbol: &str, rank: Decimal) -> MarketMetric {
        MarketMetric {
            symbol: symbol.to_string(),
            implied_volatility_index: Some(dec!(0.32)),
            implied_volatility_index_rank: Some(rank),
            implied_volatility_percentile: Some(dec!(0.5)),
            expected_report_date: NaiveDate::from_ymd_opt(2025, 4, 24),
            ..Default::default()
        }
    }

    fn scanner() -> Scanner<SnapshotSource> {
        let snapshot = DeskSnapshot {
            private_watchlists: vec![Watchlist {
                name: "Core".to_string(),
                entries: vec![
                    entry("AAPL", InstrumentType::Equity),
                    entry("/ES", InstrumentType::Future),
                    entry("TSLA", InstrumentType::Equity),
                ],
            }],
            public_watchlists: vec![Watchlist {
                name: "Liquid".to_string(),
                entries: vec![entry("SPY", InstrumentType::Equity)],
            }],
            metrics: vec![
                metric("AAPL", dec!(0.18)),
                metric("TSLA", dec!(0.55)),
                metric("SPY", dec!(0.25)),
            ],
            quotes: vec![EquityQuote {
                symbol: "AAPL".to_string(),
                mark: None,
                last: Some(dec!(187.5)),
                volume: Some(dec!(1000)),
            }],
            ..Default::default()
        };
        let config = ScannerConfig {
            batch_size: 2,
            ..ScannerConfig::default()
        };
        Scanner::new(Arc::new(SnapshotSource::new(snapshot)), config)
    }

    #[tokio::test]
    async fn test_watchlist_lookup() {
        let scanner = scanner();
        assert_eq!(
            scanner.symbols_from_watchlist("Core", true).await,
            vec!["AAPL", "TSLA"]
        );
        assert_eq!(scanner.symbols_from_watchlist("Core", false).await.len(), 3);
        assert_eq!(scanner.symbols_from_watchlist("Liquid", true).await, vec!["SPY"]);
        assert!(scanner.symbols_from_watchlist("Missing", true).await.is_empty());
    }

    #[tokio::test]
    async fn test_scan_and_rank() {
        let scanner = scanner();
        let symbols: Vec<String> = ["AAPL", "TSLA", "SPY", "QQQ"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let results = scanner.scan_ivr(&symbols).await;
        assert_eq!(results.len(), 4);

        let aapl = &results["AAPL"];
        assert!((aapl.iv_rank.unwrap() - 18.0).abs() < 1e-9);
        assert_eq!(aapl.current_price, Some(dec!(187.5)));
        assert_eq!(aapl.next_earnings_date.as_deref(), Some("04/24"));
        assert!(aapl.has_options);
        assert!(!results["QQQ"].has_options);

        let targets = scanner.high_ivr_targets(&results);
        let ranked: Vec<&str> = targets.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(ranked, vec!["TSLA", "SPY"]);
    }
}
