use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::indicators::EnrichedBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStrength {
    None,
    Weak,
    Moderate,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    Low,
    Normal,
    High,
}

/// Coarse regime bucket used to key strategy priority tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeKey {
    StrongTrend,
    Ranging,
    HighVolatility,
    LowVolatility,
    Default,
}

impl RegimeKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegimeKey::StrongTrend => "strong_trend",
            RegimeKey::Ranging => "ranging",
            RegimeKey::HighVolatility => "high_volatility",
            RegimeKey::LowVolatility => "low_volatility",
            RegimeKey::Default => "default",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "strong_trend" => Some(RegimeKey::StrongTrend),
            "ranging" => Some(RegimeKey::Ranging),
            "high_volatility" => Some(RegimeKey::HighVolatility),
            "low_volatility" => Some(RegimeKey::LowVolatility),
            "default" => Some(RegimeKey::Default),
            _ => None,
        }
    }
}

impl fmt::Display for RegimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of current market state, derived from the last enriched candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketCondition {
    pub adx: Decimal,
    pub atr: Decimal,
    /// ATR vs its own 20-bar mean.
    pub atr_ratio: Decimal,
    /// Last volume vs 20-bar mean.
    pub volume_ratio: Decimal,
    pub rsi: Decimal,
    pub trend_strength: TrendStrength,
    pub volatility: Volatility,
    pub is_ranging: bool,
}

impl MarketCondition {
    pub fn regime_key(&self) -> RegimeKey {
        if self.trend_strength == TrendStrength::Strong {
            RegimeKey::StrongTrend
        } else if self.volatility == Volatility::High {
            RegimeKey::HighVolatility
        } else if self.is_ranging {
            RegimeKey::Ranging
        } else if self.volatility == Volatility::Low {
            RegimeKey::LowVolatility
        } else {
            RegimeKey::Default
        }
    }
}

/// Classify the market from the newest enriched candle.
pub fn classify(buffer: &EnrichedBuffer) -> MarketCondition {
    let last = buffer.last();

    let trend_strength = if last.adx < dec!(15) {
        TrendStrength::None
    } else if last.adx < dec!(20) {
        TrendStrength::Weak
    } else if last.adx < dec!(25) {
        TrendStrength::Moderate
    } else {
        TrendStrength::Strong
    };

    let atr_ratio = if last.atr_ma.is_zero() {
        Decimal::ONE
    } else {
        last.atr / last.atr_ma
    };
    let volatility = if atr_ratio < dec!(0.8) {
        Volatility::Low
    } else if atr_ratio > dec!(1.5) {
        Volatility::High
    } else {
        Volatility::Normal
    };

    let vwap_distance_atr = if last.atr.is_zero() {
        Decimal::ZERO
    } else {
        (last.candle.close - last.vwap).abs() / last.atr
    };
    let is_ranging = last.adx < dec!(20) && vwap_distance_atr < Decimal::ONE;

    MarketCondition {
        adx: last.adx,
        atr: last.atr,
        atr_ratio,
        volume_ratio: last.volume_ratio,
        rsi: last.rsi,
        trend_strength,
        volatility,
        is_ranging,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::enriched_buffer_with;

    #[test]
    fn test_trend_strength_thresholds() {
        for (adx, expected) in [
            (dec!(14.9), TrendStrength::None),
            (dec!(15), TrendStrength::Weak),
            (dec!(20), TrendStrength::Moderate),
            (dec!(25), TrendStrength::Strong),
            (dec!(40), TrendStrength::Strong),
        ] {
            let buf = enriched_buffer_with(|c| c.adx = adx);
            assert_eq!(classify(&buf).trend_strength, expected, "adx={adx}");
        }
    }

    #[test]
    fn test_volatility_buckets() {
        let buf = enriched_buffer_with(|c| {
            c.atr = dec!(0.7);
            c.atr_ma = dec!(1);
        });
        assert_eq!(classify(&buf).volatility, Volatility::Low);

        let buf = enriched_buffer_with(|c| {
            c.atr = dec!(1.6);
            c.atr_ma = dec!(1);
        });
        assert_eq!(classify(&buf).volatility, Volatility::High);
    }

    #[test]
    fn test_ranging_requires_low_adx_and_vwap_proximity() {
        let buf = enriched_buffer_with(|c| {
            c.adx = dec!(18);
            c.atr = dec!(2);
            c.vwap = c.candle.close - dec!(1);
        });
        assert!(classify(&buf).is_ranging);

        let buf = enriched_buffer_with(|c| {
            c.adx = dec!(18);
            c.atr = dec!(2);
            c.vwap = c.candle.close - dec!(5);
        });
        assert!(!classify(&buf).is_ranging);
    }

    #[test]
    fn test_regime_key_priority() {
        let buf = enriched_buffer_with(|c| {
            c.adx = dec!(30);
            c.atr = dec!(2);
            c.atr_ma = dec!(1);
        });
        // Strong trend wins over high volatility.
        assert_eq!(classify(&buf).regime_key(), RegimeKey::StrongTrend);
    }
}
