//! Gamma exposure analytics
//!
//! - `exposure` - per-strike aggregation
//! - `regime` - zero gamma, walls and signal rules
//! - `agent` - data collection around the pure kernel

pub mod agent;
pub mod exposure;
pub mod regime;

pub use agent::{GexAgent, GexFailure, GexParams, GexResult, KeyLevels};
pub use exposure::{aggregate_by_strike, major_levels, total_gex_musd};
pub use regime::{classify, find_walls, zero_gamma_level, RegimeThresholds};

use crate::domain::{ContractRecord, GexProfile};

/// Build a profile from resolved contract records. Pure and deterministic.
pub fn build_profile(
    symbol: &str,
    spot: f64,
    records: &[ContractRecord],
    major_level_threshold: f64,
) -> GexProfile {
    let strike_exposures = aggregate_by_strike(records, spot);

    GexProfile {
        symbol: symbol.to_string(),
        spot_price: spot,
        total_gex_musd: total_gex_musd(&strike_exposures),
        zero_gamma_level: zero_gamma_level(&strike_exposures),
        walls: find_walls(&strike_exposures),
        major_levels: major_levels(&strike_exposures, major_level_threshold),
        strike_exposures,
    }
}
