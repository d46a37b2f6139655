//! Regime classification
//!
//! Zero-gamma interpolation, wall selection, and the signal rules layered on
//! top of an aggregated profile.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::GexConfig;
use crate::domain::{
    Confidence, GammaWalls, RegimeSignal, SignalBias, SignalKind, StrikeExposure,
};

/// Thresholds for signal classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeThresholds {
    /// Total GEX above which dealers are considered firmly long gamma
    pub mean_reversion_gex: f64,
    /// Max distance to the nearest wall, as a fraction of spot
    pub pin_distance_pct: f64,
    /// Local hour from which pinning applies
    pub pin_hour: u32,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            mean_reversion_gex: 1_000_000_000.0,
            pin_distance_pct: 0.005,
            pin_hour: 14,
        }
    }
}

impl From<&GexConfig> for RegimeThresholds {
    fn from(config: &GexConfig) -> Self {
        Self {
            mean_reversion_gex: config.mean_reversion_gex,
            pin_distance_pct: config.pin_distance_pct,
            pin_hour: config.pin_hour,
        }
    }
}

fn strike_f64(strike: Decimal) -> f64 {
    strike.to_f64().unwrap_or(0.0)
}

/// Strike where net GEX first changes sign, scanning from the lowest strike.
///
/// Linear interpolation between the bracketing strikes. `None` with fewer than
/// two strikes or without a sign change.
pub fn zero_gamma_level(rows: &[StrikeExposure]) -> Option<f64> {
    rows.windows(2).find_map(|pair| {
        let (y1, y2) = (pair[0].net_gex_musd, pair[1].net_gex_musd);
        if y1 * y2 >= 0.0 {
            return None;
        }
        let (x1, x2) = (strike_f64(pair[0].strike), strike_f64(pair[1].strike));
        Some(x1 - y1 * (x2 - x1) / (y2 - y1))
    })
}

/// Call wall: first strike with the maximum positive net GEX.
/// Put wall: first strike with the minimum negative net GEX.
pub fn find_walls(rows: &[StrikeExposure]) -> GammaWalls {
    let mut call: Option<&StrikeExposure> = None;
    let mut put: Option<&StrikeExposure> = None;

    for row in rows {
        if row.net_gex_musd > 0.0 && call.map_or(true, |c| row.net_gex_musd > c.net_gex_musd) {
            call = Some(row);
        }
        if row.net_gex_musd < 0.0 && put.map_or(true, |p| row.net_gex_musd < p.net_gex_musd) {
            put = Some(row);
        }
    }

    GammaWalls {
        call_wall: call.map(|r| r.strike),
        put_wall: put.map(|r| r.strike),
    }
}

/// Classify the trading regime. First matching rule wins.
///
/// Returns `None` when spot is not positive or either wall is missing.
pub fn classify(
    total_gex_musd: f64,
    spot: f64,
    walls: &GammaWalls,
    zero_gamma: Option<f64>,
    local_hour: u32,
    thresholds: &RegimeThresholds,
) -> Option<RegimeSignal> {
    if spot <= 0.0 {
        return None;
    }
    let call_wall = strike_f64(walls.call_wall?);
    let put_wall = strike_f64(walls.put_wall?);

    if total_gex_musd > thresholds.mean_reversion_gex && put_wall < spot && spot < call_wall {
        return Some(RegimeSignal {
            kind: SignalKind::MeanReversion,
            bias: SignalBias::Neutral,
            message: "Positive gamma. Volatility dampened. Fade moves to walls.".to_string(),
            confidence: Confidence::High,
        });
    }

    let below_flip = zero_gamma.is_some_and(|flip| spot < flip);
    if total_gex_musd < 0.0 || below_flip {
        return Some(RegimeSignal {
            kind: SignalKind::Acceleration,
            bias: SignalBias::BearishVol,
            message: "Negative gamma. Dealers chasing price. Expect range expansion.".to_string(),
            confidence: Confidence::High,
        });
    }

    if local_hour >= thresholds.pin_hour {
        let nearest = if (call_wall - spot).abs() <= (put_wall - spot).abs() {
            call_wall
        } else {
            put_wall
        };
        let distance_pct = (spot - nearest).abs() / spot;
        if distance_pct < thresholds.pin_distance_pct {
            return Some(RegimeSignal {
                kind: SignalKind::MagnetPin,
                bias: SignalBias::Neutral,
                message: format!("Price pinning to {nearest:.2} wall into close."),
                confidence: Confidence::Medium,
            });
        }
    }

    None
}
