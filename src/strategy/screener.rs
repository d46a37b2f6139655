//! Vertical spread and iron condor screening
//!
//! For each side the short strike is the contract whose |delta| sits nearest
//! the configured target. The long strike sits a fixed width further out and
//! must exist exactly in the chain.

use chrono::{Local, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{annotate_legs, target_expiration, StrategyKind, StrategyLeg, StrategyTarget};
use crate::broker::{collect_greeks, CollectUntil, MarketDataSource};
use crate::config::{wait_duration, StrategyConfig};
use crate::domain::{GreeksEvent, OptionInstrument, OptionType};
use crate::error::Result;
use crate::gex::GexResult;

/// Screens credit spreads against a market data source
pub struct StrategyScreener<S: MarketDataSource + ?Sized> {
    source: Arc<S>,
    config: StrategyConfig,
    /// Underlyings whose legs are checked against gamma walls
    wall_symbols: Vec<String>,
}

impl<S: MarketDataSource + ?Sized> StrategyScreener<S> {
    pub fn new(source: Arc<S>, config: StrategyConfig) -> Self {
        Self {
            source,
            config,
            wall_symbols: vec!["SPY".to_string(), "SPX".to_string()],
        }
    }

    pub fn with_wall_symbols(mut self, symbols: Vec<String>) -> Self {
        self.wall_symbols = symbols;
        self
    }

    /// Screen using the local date
    pub async fn screen(&self, symbol: &str, ivr: f64) -> Vec<StrategyTarget> {
        self.screen_at(symbol, ivr, Local::now().date_naive()).await
    }

    /// Screen as of `today`. Errors are logged and produce no targets.
    pub async fn screen_at(&self, symbol: &str, ivr: f64, today: NaiveDate) -> Vec<StrategyTarget> {
        if ivr < self.config.min_ivr {
            debug!("{} IVR {:.1} below {:.1}, skipping", symbol, ivr, self.config.min_ivr);
            return Vec::new();
        }

        info!("Screening strategies for {} (IVR: {:.1}%)...", symbol, ivr);
        match self.try_screen(symbol, ivr, today).await {
            Ok(targets) => targets,
            Err(e) => {
                error!("Error screening {}: {}", symbol, e);
                Vec::new()
            }
        }
    }

    /// Screen and attach gamma context. Failed GEX results are ignored.
    pub async fn screen_with_gex(
        &self,
        symbol: &str,
        ivr: f64,
        gex: Option<&GexResult>,
        today: NaiveDate,
    ) -> Vec<StrategyTarget> {
        let mut targets = self.screen_at(symbol, ivr, today).await;
        if let Some(gex) = gex.filter(|g| g.is_ok()) {
            apply_gex_context(&mut targets, symbol, gex, &self.wall_symbols);
        }
        targets
    }

    async fn try_screen(
        &self,
        symbol: &str,
        ivr: f64,
        today: NaiveDate,
    ) -> Result<Vec<StrategyTarget>> {
        let chain = self.source.option_chain(symbol).await?;

        let expirations: Vec<NaiveDate> = chain
            .iter()
            .filter_map(|o| o.expiration_date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let Some(expiration) = target_expiration(&expirations, today, self.config.target_dte)
        else {
            warn!("No {} DTE monthly expiration found for {}", self.config.target_dte, symbol);
            return Ok(Vec::new());
        };

        let options: Vec<&OptionInstrument> = chain
            .iter()
            .filter(|o| o.expiration_date == Some(expiration) && o.strike_price.is_some())
            .collect();
        if options.is_empty() {
            warn!("Could not find options for {}", expiration);
            return Ok(Vec::new());
        }

        let greeks = self.fetch_greeks(&options).await;
        let dte = (expiration - today).num_days();

        let mut targets = Vec::new();
        for option_type in [OptionType::Put, OptionType::Call] {
            let side: Vec<&OptionInstrument> = options
                .iter()
                .copied()
                .filter(|o| o.option_type == option_type)
                .collect();
            if let Some(target) = self
                .vertical(symbol, option_type, &side, &greeks, ivr, expiration, dte)
                .await?
            {
                targets.push(target);
            }
        }

        let put_v = targets.iter().find(|t| t.kind == StrategyKind::PutVertical);
        let call_v = targets.iter().find(|t| t.kind == StrategyKind::CallVertical);
        if let (Some(put_v), Some(call_v)) = (put_v, call_v) {
            let condor = StrategyTarget {
                kind: StrategyKind::IronCondor,
                expected_credit: put_v.expected_credit + call_v.expected_credit,
                legs: put_v.legs.iter().chain(&call_v.legs).cloned().collect(),
                ..put_v.clone()
            };
            targets.push(condor);
        }

        Ok(targets)
    }

    #[allow(clippy::too_many_arguments)]
    async fn vertical(
        &self,
        symbol: &str,
        option_type: OptionType,
        side: &[&OptionInstrument],
        greeks: &HashMap<String, GreeksEvent>,
        ivr: f64,
        expiration: NaiveDate,
        dte: i64,
    ) -> Result<Option<StrategyTarget>> {
        let kind = StrategyKind::vertical(option_type);
        let Some(short) = nearest_delta(side, greeks, self.config.short_delta) else {
            return Ok(None);
        };
        let Some(short_strike) = short.strike_price else {
            return Ok(None);
        };

        let width = spread_width(side);
        info!(
            "{} checking {}: short strike {}, width {}",
            symbol, kind, short_strike, width
        );

        let long_strike = match option_type {
            OptionType::Call => short_strike + width,
            OptionType::Put => short_strike - width,
        };
        let Some(long) = side.iter().find(|o| o.strike_price == Some(long_strike)) else {
            debug!("No {} width strike for {} {}", width, symbol, kind);
            return Ok(None);
        };

        let marks = self
            .source
            .market_data(&[short.symbol.clone(), long.symbol.clone()])
            .await?;
        let mark_of = |sym: &str| marks.iter().find(|m| m.symbol == sym).and_then(|m| m.mark);
        let (Some(short_mark), Some(long_mark)) = (mark_of(&short.symbol), mark_of(&long.symbol))
        else {
            debug!("Missing marks for {} {}", symbol, kind);
            return Ok(None);
        };

        let credit = short_mark - long_mark;
        let min_credit = width * self.config.min_credit_pct;
        if credit < min_credit {
            info!(
                "Rejected {} {}: credit ${:.2} < ${:.2} ({}% width)",
                symbol,
                kind,
                credit,
                min_credit,
                self.config.min_credit_pct * Decimal::ONE_HUNDRED
            );
            return Ok(None);
        }

        Ok(Some(StrategyTarget {
            symbol: symbol.to_string(),
            kind,
            expiration,
            dte,
            width,
            expected_credit: credit,
            legs: vec![
                StrategyLeg::short(&short.symbol, option_type, short_strike),
                StrategyLeg::long(&long.symbol, option_type, long_strike),
            ],
            ivr,
            delta_target: self.config.short_delta,
            gex_regime: None,
            gex_signal: None,
            gamma_call_wall: None,
            gamma_put_wall: None,
            gex_warning: None,
        }))
    }

    async fn fetch_greeks(&self, options: &[&OptionInstrument]) -> HashMap<String, GreeksEvent> {
        let streamer_symbols: Vec<String> =
            options.iter().map(|o| o.streamer_symbol.clone()).collect();
        let expected: HashSet<String> = streamer_symbols.iter().cloned().collect();
        let window = wait_duration(self.config.greeks_timeout_secs);

        match self.source.greeks_stream(&streamer_symbols).await {
            Ok(stream) => collect_greeks(stream, &expected, window, CollectUntil::Complete).await,
            Err(e) => {
                error!("Error in greeks stream: {}", e);
                HashMap::new()
            }
        }
    }
}

/// Option whose |delta| is nearest `target`; ties keep the first
fn nearest_delta<'a>(
    side: &[&'a OptionInstrument],
    greeks: &HashMap<String, GreeksEvent>,
    target: f64,
) -> Option<&'a OptionInstrument> {
    let mut best: Option<(&'a OptionInstrument, f64)> = None;
    for opt in side {
        let Some(delta) = greeks
            .get(&opt.streamer_symbol)
            .and_then(|g| g.delta)
            .and_then(|d| d.to_f64())
        else {
            continue;
        };
        let diff = (delta.abs() - target).abs();
        if best.map_or(true, |(_, d)| diff < d) {
            best = Some((*opt, diff));
        }
    }
    best.map(|(opt, _)| opt)
}

/// 3 wide for chains with strike increments up to 1.5, otherwise 5
fn spread_width(side: &[&OptionInstrument]) -> Decimal {
    let strikes: BTreeSet<Decimal> = side.iter().filter_map(|o| o.strike_price).collect();
    let mut iter = strikes.iter();
    let increment = match (iter.next(), iter.next()) {
        (Some(a), Some(b)) => (*b - *a).abs(),
        _ => Decimal::ONE,
    };
    if increment <= Decimal::new(15, 1) {
        Decimal::from(3)
    } else {
        Decimal::from(5)
    }
}

fn apply_gex_context(
    targets: &mut [StrategyTarget],
    symbol: &str,
    gex: &GexResult,
    wall_symbols: &[String],
) {
    let walls = gex.profile.walls;
    for target in targets.iter_mut() {
        target.gex_regime = Some(gex.regime());
        target.gex_signal = gex.signal.as_ref().map(|s| s.kind);
        target.gamma_call_wall = walls.call_wall;
        target.gamma_put_wall = walls.put_wall;

        let warnings = annotate_legs(symbol, &target.legs, &walls, wall_symbols);
        if !warnings.is_empty() {
            target.gex_warning = Some(warnings.join("; "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{DeskSnapshot, SnapshotSource};
    use crate::domain::{GammaRegime, GammaWalls, GexProfile, MarketDataEntry};
    use crate::gex::GexFailure;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()
    }

    fn monthly() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 21).unwrap()
    }

    fn contract(option_type: OptionType, strike: Decimal) -> OptionInstrument {
        let code = if option_type.is_call() { 'C' } else { 'P' };
        OptionInstrument {
            symbol: format!("SPY 250221{}{}", code, strike),
            streamer_symbol: format!(".SPY250221{}{}", code, strike),
            underlying: "SPY".to_string(),
            option_type,
            strike_price: Some(strike),
            expiration_date: Some(monthly()),
        }
    }

    /// Strikes every 1.0 from 390 to 410 with linear deltas and marks
    fn snapshot() -> DeskSnapshot {
        let mut chain = Vec::new();
        let mut market_data = Vec::new();
        let mut greeks = Vec::new();

        for i in 0..=20i64 {
            let strike = Decimal::from(390 + i);
            for option_type in [OptionType::Put, OptionType::Call] {
                let opt = contract(option_type, strike);
                // Put deltas grow toward higher strikes, calls toward lower ones
                let (delta, mark) = match option_type {
                    OptionType::Put => (Decimal::from(-(i + 10)) / dec!(100), Decimal::from(i) / dec!(4)),
                    OptionType::Call => (Decimal::from(30 - i) / dec!(50), Decimal::from(20 - i) / dec!(4)),
                };
                greeks.push(GreeksEvent {
                    event_symbol: opt.streamer_symbol.clone(),
                    delta: Some(delta),
                    ..Default::default()
                });
                market_data.push(MarketDataEntry {
                    symbol: opt.symbol.clone(),
                    mark: Some(mark),
                    ..Default::default()
                });
                chain.push(opt);
            }
        }

        DeskSnapshot {
            chains: HashMap::from([("SPY".to_string(), chain)]),
            market_data,
            greeks,
            ..Default::default()
        }
    }

    fn screener(snapshot: DeskSnapshot) -> StrategyScreener<SnapshotSource> {
        let config = StrategyConfig {
            greeks_timeout_secs: 0.2,
            ..StrategyConfig::default()
        };
        StrategyScreener::new(Arc::new(SnapshotSource::new(snapshot)), config)
    }

    #[tokio::test]
    async fn test_screen_builds_verticals_and_condor() {
        let targets = screener(snapshot()).screen_at("SPY", 40.0, today()).await;
        let kinds: Vec<StrategyKind> = targets.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StrategyKind::PutVertical,
                StrategyKind::CallVertical,
                StrategyKind::IronCondor
            ]
        );

        // Put delta -0.30 at 410, long 3 wide at 407: credit 5.00 - 4.25
        let put_v = &targets[0];
        assert_eq!(put_v.width, dec!(3));
        assert_eq!(put_v.legs[0].strike, dec!(410));
        assert_eq!(put_v.legs[1].strike, dec!(407));
        assert_eq!(put_v.expected_credit, dec!(0.75));
        assert_eq!(put_v.dte, 46);

        // Call delta 0.30 at 405, long at 408: credit 1.25 - 0.50
        let call_v = &targets[1];
        assert_eq!(call_v.legs[0].strike, dec!(405));
        assert_eq!(call_v.legs[1].strike, dec!(408));
        assert_eq!(call_v.expected_credit, dec!(0.75));

        let condor = &targets[2];
        assert_eq!(condor.expected_credit, dec!(1.50));
        assert_eq!(condor.width, dec!(3));
        let strikes: Vec<Decimal> = condor.legs.iter().map(|l| l.strike).collect();
        assert_eq!(strikes, vec![dec!(410), dec!(407), dec!(405), dec!(408)]);
    }

    #[tokio::test]
    async fn test_low_ivr_returns_nothing() {
        assert!(screener(snapshot())
            .screen_at("SPY", 24.9, today())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_thin_credit_is_rejected() {
        let mut snap = snapshot();
        for md in snap.market_data.iter_mut() {
            md.mark = Some(dec!(1.00));
        }
        assert!(screener(snap).screen_at("SPY", 40.0, today()).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_chain_is_logged_not_raised() {
        assert!(screener(DeskSnapshot::default())
            .screen_at("SPY", 40.0, today())
            .await
            .is_empty());
    }

    fn gex_result(walls: GammaWalls, failure: Option<GexFailure>) -> GexResult {
        GexResult {
            profile: GexProfile {
                total_gex_musd: -5.0,
                walls,
                ..GexProfile::empty("SPY", 400.0)
            },
            signal: None,
            max_dte: 30,
            strike_range: (320.0, 480.0),
            contracts: Vec::new(),
            failure,
        }
    }

    #[tokio::test]
    async fn test_screen_with_gex_attaches_context() {
        let walls = GammaWalls {
            call_wall: Some(dec!(406)),
            put_wall: Some(dec!(412)),
        };
        let gex = gex_result(walls, None);
        let targets = screener(snapshot())
            .screen_with_gex("SPY", 40.0, Some(&gex), today())
            .await;

        let put_v = &targets[0];
        assert_eq!(put_v.gex_regime, Some(GammaRegime::Negative));
        assert_eq!(put_v.gamma_put_wall, Some(dec!(412)));
        assert_eq!(
            put_v.gex_warning.as_deref(),
            Some("Short put 410.00 below put wall 412.00; Short strike 410.00 above call wall 406.00")
        );

        let condor = &targets[2];
        assert_eq!(
            condor.gex_warning.as_deref(),
            Some(
                "Short put 410.00 below put wall 412.00; \
                 Short strike 410.00 above call wall 406.00; \
                 Short strike 405.00 below put wall 412.00"
            )
        );
    }

    #[tokio::test]
    async fn test_failed_gex_is_ignored() {
        let gex = gex_result(GammaWalls::default(), Some(GexFailure::NoData));
        let targets = screener(snapshot())
            .screen_with_gex("SPY", 40.0, Some(&gex), today())
            .await;
        assert!(!targets.is_empty());
        assert!(targets.iter().all(|t| t.gex_regime.is_none()));
    }
}
