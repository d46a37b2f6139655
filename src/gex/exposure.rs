//! Exposure aggregation
//!
//! Turns per-contract open interest and gamma into per-strike dollar gamma
//! exposure. Dealers are assumed long calls / short puts, so put exposure is
//! negative.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::domain::{ContractRecord, LevelSide, MajorLevel, StrikeExposure};

/// Shares per option contract
pub const CONTRACT_MULTIPLIER: f64 = 100.0;

/// Default |net GEX| ($M) for a major level
pub const DEFAULT_MAJOR_LEVEL_THRESHOLD: f64 = 50.0;

/// Dollar gamma (in $M) for a 1% move of the underlying, unsigned
pub fn raw_gex_musd(open_interest: u64, gamma: f64, spot: f64) -> f64 {
    open_interest as f64 * gamma * CONTRACT_MULTIPLIER * spot * spot * 0.01 / 1_000_000.0
}

/// Signed contribution of one contract: positive for calls, negative for puts
pub fn contract_gex_musd(record: &ContractRecord, spot: f64) -> f64 {
    let raw = raw_gex_musd(record.open_interest, record.gamma, spot);
    if record.is_call {
        raw
    } else {
        -raw
    }
}

/// Group contracts by strike. Rows come back sorted ascending by strike.
pub fn aggregate_by_strike(records: &[ContractRecord], spot: f64) -> Vec<StrikeExposure> {
    let mut by_strike: BTreeMap<Decimal, StrikeExposure> = BTreeMap::new();

    for record in records {
        let net = contract_gex_musd(record, spot);
        let row = by_strike
            .entry(record.strike.normalize())
            .or_insert_with(|| StrikeExposure {
                strike: record.strike.normalize(),
                net_gex_musd: 0.0,
                call_gex_musd: 0.0,
                put_gex_musd: 0.0,
                total_oi: 0,
                total_volume: 0,
            });

        row.net_gex_musd += net;
        if record.is_call {
            row.call_gex_musd += net;
        } else {
            row.put_gex_musd += net;
        }
        row.total_oi += record.open_interest;
        row.total_volume += record.volume;
    }

    by_strike.into_values().collect()
}

/// Net GEX over all strikes
pub fn total_gex_musd(rows: &[StrikeExposure]) -> f64 {
    rows.iter().map(|r| r.net_gex_musd).sum()
}

/// Strikes with |net GEX| strictly above `threshold`, in strike order
pub fn major_levels(rows: &[StrikeExposure], threshold: f64) -> Vec<MajorLevel> {
    rows.iter()
        .filter(|r| r.net_gex_musd.abs() > threshold)
        .map(|r| MajorLevel {
            strike: r.strike,
            net_gex_musd: r.net_gex_musd,
            side: if r.net_gex_musd > 0.0 {
                LevelSide::Call
            } else {
                LevelSide::Put
            },
            total_oi: r.total_oi,
        })
        .collect()
}
