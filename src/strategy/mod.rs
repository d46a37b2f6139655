//! Premium-selling strategy selection and position management

pub mod annotate;
pub mod manage;
pub mod screener;

pub use annotate::annotate_legs;
pub use manage::{manage_positions, CloseReason, CloseSignal};
pub use screener::StrategyScreener;

use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{GammaRegime, OptionType, SignalKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegAction {
    Sell,
    Buy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegSide {
    Short,
    Long,
}

/// One leg of a spread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyLeg {
    pub symbol: String,
    pub action: LegAction,
    pub side: LegSide,
    pub option_type: OptionType,
    pub strike: Decimal,
}

impl StrategyLeg {
    pub fn short(symbol: &str, option_type: OptionType, strike: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            action: LegAction::Sell,
            side: LegSide::Short,
            option_type,
            strike,
        }
    }

    pub fn long(symbol: &str, option_type: OptionType, strike: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            action: LegAction::Buy,
            side: LegSide::Long,
            option_type,
            strike,
        }
    }

    pub fn is_short(&self) -> bool {
        self.side == LegSide::Short
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    #[serde(rename = "Put Vertical")]
    PutVertical,
    #[serde(rename = "Call Vertical")]
    CallVertical,
    #[serde(rename = "Iron Condor")]
    IronCondor,
}

impl StrategyKind {
    pub fn vertical(option_type: OptionType) -> Self {
        match option_type {
            OptionType::Call => StrategyKind::CallVertical,
            OptionType::Put => StrategyKind::PutVertical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::PutVertical => "Put Vertical",
            StrategyKind::CallVertical => "Call Vertical",
            StrategyKind::IronCondor => "Iron Condor",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Candidate trade with its legs and expected metrics (per share)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyTarget {
    pub symbol: String,
    pub kind: StrategyKind,
    pub expiration: NaiveDate,
    pub dte: i64,
    pub width: Decimal,
    pub expected_credit: Decimal,
    pub legs: Vec<StrategyLeg>,
    pub ivr: f64,
    pub delta_target: f64,
    pub gex_regime: Option<GammaRegime>,
    pub gex_signal: Option<SignalKind>,
    pub gamma_call_wall: Option<Decimal>,
    pub gamma_put_wall: Option<Decimal>,
    /// Wall warnings joined with "; "
    pub gex_warning: Option<String>,
}

impl StrategyTarget {
    pub fn max_loss(&self) -> Decimal {
        self.width - self.expected_credit
    }

    /// Buying power effect of one standard contract
    pub fn bp_effect(&self) -> Decimal {
        self.max_loss() * Decimal::ONE_HUNDRED
    }

    /// Credit as a percentage of width, 0 for a non-positive width
    pub fn credit_pct(&self) -> Decimal {
        if self.width <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.expected_credit / self.width * Decimal::ONE_HUNDRED
    }
}

/// Monthly expiration (third-week Friday) closest to `target_dte`; ties keep the first
pub fn target_expiration(
    expirations: &[NaiveDate],
    today: NaiveDate,
    target_dte: i64,
) -> Option<NaiveDate> {
    expirations
        .iter()
        .copied()
        .filter(|exp| exp.weekday() == Weekday::Fri && (15..=21).contains(&exp.day()))
        .min_by_key(|exp| ((*exp - today).num_days() - target_dte).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn target(width: Decimal, credit: Decimal) -> StrategyTarget {
        StrategyTarget {
            symbol: "SPY".to_string(),
            kind: StrategyKind::PutVertical,
            expiration: date(2025, 2, 21),
            dte: 46,
            width,
            expected_credit: credit,
            legs: Vec::new(),
            ivr: 30.0,
            delta_target: 0.30,
            gex_regime: None,
            gex_signal: None,
            gamma_call_wall: None,
            gamma_put_wall: None,
            gex_warning: None,
        }
    }

    #[test]
    fn test_derived_metrics() {
        let t = target(dec!(5), dec!(1.50));
        assert_eq!(t.max_loss(), dec!(3.50));
        assert_eq!(t.bp_effect(), dec!(350));
        assert_eq!(t.credit_pct(), dec!(30));

        assert_eq!(target(Decimal::ZERO, dec!(1)).credit_pct(), Decimal::ZERO);
    }

    #[test]
    fn test_target_expiration_picks_monthly_nearest_45() {
        let today = date(2025, 1, 6);
        let expirations = vec![
            date(2025, 1, 17), // monthly, 11 DTE
            date(2025, 2, 14), // weekly
            date(2025, 2, 21), // monthly, 46 DTE
            date(2025, 3, 21), // monthly, 74 DTE
            date(2025, 2, 19), // Wednesday in the third week
        ];
        assert_eq!(
            target_expiration(&expirations, today, 45),
            Some(date(2025, 2, 21))
        );
        assert_eq!(target_expiration(&[date(2025, 2, 14)], today, 45), None);
    }
}
