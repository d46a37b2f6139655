use crate::domain::{GammaWalls, OptionType};

use super::StrategyLeg;

/// Warnings for short legs placed beyond a gamma wall.
///
/// Only symbols in `allow_list` are annotated. A short strike below the put
/// wall or above the call wall yields one warning each, in leg order.
pub fn annotate_legs(
    symbol: &str,
    legs: &[StrategyLeg],
    walls: &GammaWalls,
    allow_list: &[String],
) -> Vec<String> {
    if !allow_list.iter().any(|s| s == symbol) {
        return Vec::new();
    }

    let mut warnings = Vec::new();
    for leg in legs.iter().filter(|l| l.is_short()) {
        if let Some(put_wall) = walls.put_wall {
            if leg.strike < put_wall {
                let label = if leg.option_type == OptionType::Put { "put" } else { "strike" };
                warnings.push(format!(
                    "Short {} {:.2} below put wall {:.2}",
                    label, leg.strike, put_wall
                ));
            }
        }
        if let Some(call_wall) = walls.call_wall {
            if leg.strike > call_wall {
                let label = if leg.option_type == OptionType::Call { "call" } else { "strike" };
                warnings.push(format!(
                    "Short {} {:.2} above call wall {:.2}",
                    label, leg.strike, call_wall
                ));
            }
        }
    }
    warnings
}
