use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::StrategyConfig;
use crate::domain::Position;

/// Why a position should be closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseReason {
    TimeStop { dte: i64 },
    /// Fraction of the opening credit captured
    ProfitTarget { profit_pct: Decimal },
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::TimeStop { dte } => write!(f, "Time Stop ({} DTE)", dte),
            CloseReason::ProfitTarget { profit_pct } => {
                write!(f, "Profit Target ({:.1}%)", profit_pct * Decimal::ONE_HUNDRED)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CloseSignal {
    pub position: Position,
    pub reason: CloseReason,
}

/// Option positions to close: time stop first, then the profit target on shorts
pub fn manage_positions(
    positions: &[Position],
    today: NaiveDate,
    config: &StrategyConfig,
) -> Vec<CloseSignal> {
    let mut to_close = Vec::new();

    for pos in positions.iter().filter(|p| p.is_option()) {
        if let Some(dte) = pos.dte(today) {
            if dte <= config.time_stop_dte {
                to_close.push(CloseSignal {
                    position: pos.clone(),
                    reason: CloseReason::TimeStop { dte },
                });
                continue;
            }
        }

        let open_price = pos.average_open_price.unwrap_or_default();
        if !pos.is_short() || open_price <= Decimal::ZERO {
            continue;
        }

        let mark = pos.mark.unwrap_or_default();
        let profit_pct = (open_price - mark) / open_price;
        if profit_pct >= config.profit_target_pct {
            to_close.push(CloseSignal {
                position: pos.clone(),
                reason: CloseReason::ProfitTarget { profit_pct },
            });
        }
    }

    to_close
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InstrumentType;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 27).unwrap()
    }

    fn option(symbol: &str, qty: Decimal, open: Decimal, mark: Decimal, dte: i64) -> Position {
        let expires = (today() + Duration::days(dte)).and_hms_opt(20, 0, 0).unwrap();
        Position {
            symbol: symbol.to_string(),
            instrument_type: Some(InstrumentType::EquityOption),
            quantity: qty,
            multiplier: Some(dec!(100)),
            mark: Some(mark),
            average_open_price: Some(open),
            expires_at: Some(Utc.from_utc_datetime(&expires)),
        }
    }

    #[test]
    fn test_manage_positions() {
        let positions = vec![
            // 21 DTE: time stop even though it is not profitable
            option("TIME", dec!(-1), dec!(1.00), dec!(1.20), 21),
            // 52 DTE short at 60% profit
            option("PROFIT", dec!(-2), dec!(2.00), dec!(0.80), 52),
            // 52 DTE short at 25% profit
            option("HOLD", dec!(-1), dec!(2.00), dec!(1.50), 52),
            // Long positions never hit the profit target
            option("LONG", dec!(1), dec!(2.00), dec!(0.10), 52),
            Position {
                instrument_type: Some(InstrumentType::Equity),
                expires_at: None,
                ..option("AAPL", dec!(-100), dec!(150), dec!(10), 52)
            },
        ];

        let signals = manage_positions(&positions, today(), &StrategyConfig::default());
        let summary: Vec<(String, String)> = signals
            .iter()
            .map(|s| (s.position.symbol.clone(), s.reason.to_string()))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("TIME".to_string(), "Time Stop (21 DTE)".to_string()),
                ("PROFIT".to_string(), "Profit Target (60.0%)".to_string()),
            ]
        );
    }
}
