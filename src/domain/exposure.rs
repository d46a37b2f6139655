use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregated gamma exposure at one strike, in $M
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeExposure {
    pub strike: Decimal,
    pub net_gex_musd: f64,
    pub call_gex_musd: f64,
    /// Zero or negative
    pub put_gex_musd: f64,
    pub total_oi: u64,
    pub total_volume: u64,
}

/// Which side dominates a major level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelSide {
    Call,
    Put,
}

impl std::fmt::Display for LevelSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelSide::Call => write!(f, "Call"),
            LevelSide::Put => write!(f, "Put"),
        }
    }
}

/// Strike whose |net GEX| clears the major-level threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MajorLevel {
    pub strike: Decimal,
    pub net_gex_musd: f64,
    pub side: LevelSide,
    pub total_oi: u64,
}

/// Call/put walls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GammaWalls {
    /// Strike with the largest positive net GEX
    pub call_wall: Option<Decimal>,
    /// Strike with the most negative net GEX
    pub put_wall: Option<Decimal>,
}

/// Sign of total dealer gamma
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GammaRegime {
    Positive,
    Negative,
}

impl GammaRegime {
    /// Zero total GEX counts as negative
    pub fn from_total(total_gex_musd: f64) -> Self {
        if total_gex_musd > 0.0 {
            GammaRegime::Positive
        } else {
            GammaRegime::Negative
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GammaRegime::Positive => "positive",
            GammaRegime::Negative => "negative",
        }
    }
}

impl std::fmt::Display for GammaRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// GEX profile for one underlying
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GexProfile {
    pub symbol: String,
    pub spot_price: f64,
    pub total_gex_musd: f64,
    pub zero_gamma_level: Option<f64>,
    pub walls: GammaWalls,
    /// Sorted ascending by strike
    pub strike_exposures: Vec<StrikeExposure>,
    pub major_levels: Vec<MajorLevel>,
}

impl GexProfile {
    /// Profile with no strikes, used for labeled empty results
    pub fn empty(symbol: &str, spot_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            spot_price,
            total_gex_musd: 0.0,
            zero_gamma_level: None,
            walls: GammaWalls::default(),
            strike_exposures: Vec::new(),
            major_levels: Vec::new(),
        }
    }

    pub fn call_wall(&self) -> Option<Decimal> {
        self.walls.call_wall
    }

    pub fn put_wall(&self) -> Option<Decimal> {
        self.walls.put_wall
    }

    pub fn regime(&self) -> GammaRegime {
        GammaRegime::from_total(self.total_gex_musd)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    MeanReversion,
    Acceleration,
    MagnetPin,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::MeanReversion => "MEAN_REVERSION",
            SignalKind::Acceleration => "ACCELERATION",
            SignalKind::MagnetPin => "MAGNET_PIN",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalBias {
    Neutral,
    BearishVol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
}

/// Trading signal derived from a GEX profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSignal {
    pub kind: SignalKind,
    pub bias: SignalBias,
    pub message: String,
    pub confidence: Confidence,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regime_from_total() {
        assert_eq!(GammaRegime::from_total(12.5), GammaRegime::Positive);
        assert_eq!(GammaRegime::from_total(-0.1), GammaRegime::Negative);
        assert_eq!(GammaRegime::from_total(0.0), GammaRegime::Negative);
    }

    #[test]
    fn test_signal_kind_serializes_screaming_case() {
        let json = serde_json::to_string(&SignalKind::MagnetPin).unwrap();
        assert_eq!(json, "\"MAGNET_PIN\"");
    }
}
