use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::AssetClass;

/// Per-asset-class tuning knobs. Higher-volatility instruments get tighter
/// tolerances and higher volume bars; gold runs looser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetOverride {
    /// Relative-volume floor for volume-confirmed entries.
    pub volume_threshold: Decimal,
    /// Acceptable RSI band for trend entries.
    pub rsi_min: Decimal,
    pub rsi_max: Decimal,
    /// Minimum ADX before trend strategies are allowed.
    pub adx_min: Decimal,
    /// Price tolerance (percent) used when matching levels and retests.
    pub level_tolerance_pct: Decimal,
}

impl AssetOverride {
    pub fn base() -> Self {
        Self {
            volume_threshold: dec!(1.3),
            rsi_min: dec!(25),
            rsi_max: dec!(75),
            adx_min: dec!(15),
            level_tolerance_pct: dec!(0.3),
        }
    }

    /// Defaults per class; an unrecognized instrument gets the conservative
    /// `Other` bundle.
    pub fn defaults_for(class: AssetClass) -> Self {
        let mut o = Self::base();
        match class {
            AssetClass::Crypto => {}
            AssetClass::Index => {
                o.volume_threshold = dec!(1.5);
                o.rsi_min = dec!(30);
                o.rsi_max = dec!(70);
                o.adx_min = dec!(18);
                o.level_tolerance_pct = dec!(0.2);
            }
            AssetClass::Metal => {
                o.volume_threshold = dec!(1.2);
            }
            AssetClass::Forex => {
                o.volume_threshold = dec!(1.25);
                o.level_tolerance_pct = dec!(0.2);
            }
            AssetClass::Other => {
                o.volume_threshold = dec!(1.4);
                o.rsi_min = dec!(30);
                o.rsi_max = dec!(70);
                o.adx_min = dec!(20);
            }
        }
        o
    }

    /// Apply user-provided partial overrides on top of the class defaults.
    pub fn merge(mut self, patch: &AssetOverridePatch) -> Self {
        if let Some(v) = patch.volume_threshold {
            self.volume_threshold = v;
        }
        if let Some(v) = patch.rsi_min {
            self.rsi_min = v;
        }
        if let Some(v) = patch.rsi_max {
            self.rsi_max = v;
        }
        if let Some(v) = patch.adx_min {
            self.adx_min = v;
        }
        if let Some(v) = patch.level_tolerance_pct {
            self.level_tolerance_pct = v;
        }
        self
    }

    pub fn validate(&self, errors: &mut Vec<String>) {
        if self.volume_threshold <= Decimal::ZERO {
            errors.push("asset override: volume_threshold must be > 0".to_string());
        }
        if self.rsi_min >= self.rsi_max {
            errors.push(format!(
                "asset override: rsi_min ({}) must be < rsi_max ({})",
                self.rsi_min, self.rsi_max
            ));
        }
        if self.rsi_min < Decimal::ZERO || self.rsi_max > Decimal::from(100) {
            errors.push("asset override: rsi band must lie within 0..100".to_string());
        }
        if self.adx_min < Decimal::ZERO {
            errors.push("asset override: adx_min must be >= 0".to_string());
        }
        if self.level_tolerance_pct <= Decimal::ZERO {
            errors.push("asset override: level_tolerance_pct must be > 0".to_string());
        }
    }
}

/// Sparse form used in config files; unset fields fall back to class
/// defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetOverridePatch {
    pub volume_threshold: Option<Decimal>,
    pub rsi_min: Option<Decimal>,
    pub rsi_max: Option<Decimal>,
    pub adx_min: Option<Decimal>,
    pub level_tolerance_pct: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_defaults() {
        assert_eq!(
            AssetOverride::defaults_for(AssetClass::Index).volume_threshold,
            dec!(1.5)
        );
        assert_eq!(
            AssetOverride::defaults_for(AssetClass::Metal).volume_threshold,
            dec!(1.2)
        );
        assert_eq!(
            AssetOverride::defaults_for(AssetClass::Crypto).volume_threshold,
            dec!(1.3)
        );
    }

    #[test]
    fn test_merge_partial_patch() {
        let patch = AssetOverridePatch {
            volume_threshold: Some(dec!(2.0)),
            ..Default::default()
        };
        let merged = AssetOverride::defaults_for(AssetClass::Crypto).merge(&patch);
        assert_eq!(merged.volume_threshold, dec!(2.0));
        assert_eq!(merged.rsi_max, dec!(75));
    }

    #[test]
    fn test_inverted_rsi_band_rejected() {
        let mut o = AssetOverride::base();
        o.rsi_min = dec!(80);
        o.rsi_max = dec!(20);
        let mut errors = Vec::new();
        o.validate(&mut errors);
        assert_eq!(errors.len(), 1);
    }
}
