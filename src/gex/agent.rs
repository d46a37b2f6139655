//! GEX collection pipeline
//!
//! Gathers spot, chain, open interest and greeks from a [`MarketDataSource`],
//! resolves them into contract records and runs the pure kernel. Recoverable
//! gaps come back as a labeled empty result instead of an error.

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::regime::{classify, RegimeThresholds};
use crate::broker::{collect_greeks, CollectUntil, MarketDataSource};
use crate::config::{wait_duration, GexConfig};
use crate::domain::{
    ContractRecord, GammaRegime, GexProfile, MarketDataEntry, OptionInstrument, RegimeSignal,
};

/// Symbols per open-interest request
const MARKET_DATA_CHUNK: usize = 100;

/// Why a GEX profile came back empty
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GexFailure {
    #[error("Could not fetch spot price")]
    SpotUnavailable,

    #[error("Failed to fetch option chain: {0}")]
    ChainFetch(String),

    #[error("No options found after filtering")]
    NoContracts,

    #[error("No GEX data calculated")]
    NoData,
}

/// Collection parameters
#[derive(Debug, Clone)]
pub struct GexParams {
    pub min_dte: i64,
    pub max_dte: i64,
    /// Strike band as a fraction of spot (0.20 = 80%-120%)
    pub strike_range_pct: f64,
    pub major_level_threshold: f64,
    /// How long to listen for streamed greeks
    pub data_wait: Duration,
    /// How long to wait for the first spot event
    pub spot_timeout: Duration,
    pub thresholds: RegimeThresholds,
}

impl From<&GexConfig> for GexParams {
    fn from(config: &GexConfig) -> Self {
        Self {
            min_dte: config.min_dte,
            max_dte: config.max_dte,
            strike_range_pct: config.strike_range_pct,
            major_level_threshold: config.major_level_threshold,
            data_wait: wait_duration(config.data_wait_secs),
            spot_timeout: wait_duration(config.spot_timeout_secs),
            thresholds: RegimeThresholds::from(config),
        }
    }
}

impl Default for GexParams {
    fn default() -> Self {
        Self::from(&GexConfig::default())
    }
}

/// Key levels of a profile
#[derive(Debug, Clone, Serialize)]
pub struct KeyLevels {
    pub call_wall: Option<Decimal>,
    pub put_wall: Option<Decimal>,
    pub zero_gamma: Option<f64>,
    pub spot_price: f64,
    pub total_gex_musd: f64,
}

/// Outcome of a GEX calculation
#[derive(Debug, Clone, Serialize)]
pub struct GexResult {
    pub profile: GexProfile,
    pub signal: Option<RegimeSignal>,
    pub max_dte: i64,
    /// Inclusive strike band that was analysed
    pub strike_range: (f64, f64),
    /// Contract-level rows fed into the kernel
    pub contracts: Vec<ContractRecord>,
    pub failure: Option<GexFailure>,
}

impl GexResult {
    fn failed(
        symbol: &str,
        spot: f64,
        max_dte: i64,
        strike_range: (f64, f64),
        failure: GexFailure,
    ) -> Self {
        warn!("GEX for {} unavailable: {}", symbol, failure);
        Self {
            profile: GexProfile::empty(symbol, spot),
            signal: None,
            max_dte,
            strike_range,
            contracts: Vec::new(),
            failure: Some(failure),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }

    pub fn gamma_walls(&self) -> KeyLevels {
        KeyLevels {
            call_wall: self.profile.call_wall(),
            put_wall: self.profile.put_wall(),
            zero_gamma: self.profile.zero_gamma_level,
            spot_price: self.profile.spot_price,
            total_gex_musd: self.profile.total_gex_musd,
        }
    }

    pub fn regime(&self) -> GammaRegime {
        self.profile.regime()
    }
}

/// Keep contracts with a strike and expiration inside the DTE window and strike band
pub fn filter_chain(
    chain: &[OptionInstrument],
    today: NaiveDate,
    spot: f64,
    params: &GexParams,
) -> Vec<OptionInstrument> {
    let (lower, upper) = strike_band(spot, params.strike_range_pct);

    chain
        .iter()
        .filter(|opt| {
            let (Some(strike), Some(dte)) = (opt.strike_price, opt.dte(today)) else {
                return false;
            };
            let strike = strike.to_f64().unwrap_or(f64::NAN);
            (params.min_dte..=params.max_dte).contains(&dte) && lower <= strike && strike <= upper
        })
        .cloned()
        .collect()
}

fn strike_band(spot: f64, pct: f64) -> (f64, f64) {
    (spot * (1.0 - pct), spot * (1.0 + pct))
}

/// Gamma exposure agent
pub struct GexAgent<S: MarketDataSource + ?Sized> {
    source: Arc<S>,
    params: GexParams,
}

impl<S: MarketDataSource + ?Sized> GexAgent<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self::with_params(source, GexParams::default())
    }

    pub fn with_params(source: Arc<S>, params: GexParams) -> Self {
        Self { source, params }
    }

    pub fn params(&self) -> &GexParams {
        &self.params
    }

    /// Calculate the profile using the local clock
    pub async fn calculate(&self, symbol: &str) -> GexResult {
        self.calculate_at(symbol, Local::now().naive_local()).await
    }

    /// Calculate the profile as of `now` (local time; drives DTE and the pin hour)
    pub async fn calculate_at(&self, symbol: &str, now: NaiveDateTime) -> GexResult {
        let params = &self.params;
        info!("Calculating GEX for {}...", symbol);

        let Some(spot) = self.spot_price(symbol).await else {
            return GexResult::failed(symbol, 0.0, params.max_dte, (0.0, 0.0), GexFailure::SpotUnavailable);
        };

        debug!("Fetching option chain for {}", symbol);
        let chain = match self.source.option_chain(symbol).await {
            Ok(chain) => chain,
            Err(e) => {
                return GexResult::failed(
                    symbol,
                    spot,
                    params.max_dte,
                    (0.0, 0.0),
                    GexFailure::ChainFetch(e.to_string()),
                )
            }
        };

        let strike_range = strike_band(spot, params.strike_range_pct);
        let options = filter_chain(&chain, now.date(), spot, params);
        if options.is_empty() {
            return GexResult::failed(symbol, spot, params.max_dte, strike_range, GexFailure::NoContracts);
        }
        info!("Found {} options to analyze for {}", options.len(), symbol);

        let market_data = self.fetch_market_data(&options).await;

        let streamer_symbols: Vec<String> =
            options.iter().map(|o| o.streamer_symbol.clone()).collect();
        let expected: HashSet<String> = streamer_symbols.iter().cloned().collect();
        info!(
            "Collecting streaming greeks ({:.1}s)...",
            params.data_wait.as_secs_f64()
        );
        let greeks = match self.source.greeks_stream(&streamer_symbols).await {
            Ok(stream) => {
                collect_greeks(stream, &expected, params.data_wait, CollectUntil::Deadline).await
            }
            Err(e) => {
                warn!("Greeks subscription failed for {}: {}", symbol, e);
                HashMap::new()
            }
        };

        let contracts: Vec<ContractRecord> = options
            .iter()
            .filter_map(|opt| {
                ContractRecord::from_parts(
                    opt,
                    market_data.get(&opt.symbol),
                    greeks.get(&opt.streamer_symbol),
                )
            })
            .collect();
        if contracts.is_empty() {
            return GexResult::failed(symbol, spot, params.max_dte, strike_range, GexFailure::NoData);
        }

        let profile = super::build_profile(symbol, spot, &contracts, params.major_level_threshold);
        let signal = classify(
            profile.total_gex_musd,
            spot,
            &profile.walls,
            profile.zero_gamma_level,
            now.hour(),
            &params.thresholds,
        );

        info!(
            "GEX for {}: total {:.1}M, call wall {:?}, put wall {:?}, zero gamma {:?}, signal {:?}",
            symbol,
            profile.total_gex_musd,
            profile.call_wall(),
            profile.put_wall(),
            profile.zero_gamma_level,
            signal.as_ref().map(|s| s.kind)
        );

        GexResult {
            profile,
            signal,
            max_dte: params.max_dte,
            strike_range,
            contracts,
            failure: None,
        }
    }

    async fn spot_price(&self, symbol: &str) -> Option<f64> {
        let event = match tokio::time::timeout(self.params.spot_timeout, self.source.spot_event(symbol)).await {
            Ok(Ok(Some(event))) => event,
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                warn!("Error getting spot price for {}: {}", symbol, e);
                return None;
            }
            Err(_) => {
                warn!("Timed out waiting for spot price of {}", symbol);
                return None;
            }
        };
        event
            .spot_price()
            .and_then(|p| p.to_f64())
            .filter(|p| *p > 0.0)
    }

    /// Open interest per broker symbol. Failed chunks are skipped.
    async fn fetch_market_data(
        &self,
        options: &[OptionInstrument],
    ) -> HashMap<String, MarketDataEntry> {
        let symbols: Vec<String> = options.iter().map(|o| o.symbol.clone()).collect();
        let mut by_symbol = HashMap::with_capacity(symbols.len());

        for chunk in symbols.chunks(MARKET_DATA_CHUNK) {
            match self.source.market_data(chunk).await {
                Ok(entries) => {
                    for entry in entries {
                        by_symbol.insert(entry.symbol.clone(), entry);
                    }
                }
                Err(e) => warn!("Market data chunk of {} failed: {}", chunk.len(), e),
            }
        }

        by_symbol
    }
}
