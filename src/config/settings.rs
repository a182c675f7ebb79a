use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::assets::{AssetOverride, AssetOverridePatch};
use crate::error::ConfigError;
use crate::regime::RegimeKey;
use crate::types::{StrategyId, Symbol, TimeFrame};

pub const KNOWN_PROVIDERS: &[&str] = &["binance", "coingecko", "yahoo"];

/// Raw scanner configuration as deserialized from file + environment.
/// Validated and resolved once at startup; use sites only ever see
/// [`ResolvedConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    pub symbol: String,
    pub timeframes: Vec<String>,
    pub poll_interval_s: u64,
    /// Tighter loop for 1m/5m scans.
    pub scalp_poll_interval_s: u64,
    /// Per-call deadline for provider fetches.
    pub provider_timeout_s: u64,
    /// Candles requested per fetch.
    pub candle_history: usize,
    pub summary_interval_s: u64,
    pub indicators: IndicatorSettings,
    pub strategies: StrategySettings,
    pub quality_filter: FilterSettings,
    /// Keyed by asset class name ("crypto", "index", ...).
    pub asset_overrides: HashMap<String, AssetOverridePatch>,
    pub bypass: BypassSettings,
    pub data_providers: Vec<String>,

    /// Catch-all for keys we do not understand; reported as startup
    /// warnings, never silently dropped.
    #[serde(flatten, skip_serializing)]
    pub unknown: HashMap<String, serde_json::Value>,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            symbol: "BTC".to_string(),
            timeframes: vec!["5m".to_string(), "1h".to_string()],
            poll_interval_s: 60,
            scalp_poll_interval_s: 30,
            provider_timeout_s: 10,
            candle_history: 300,
            summary_interval_s: 3600,
            indicators: IndicatorSettings::default(),
            strategies: StrategySettings::default(),
            quality_filter: FilterSettings::default(),
            asset_overrides: HashMap::new(),
            bypass: BypassSettings::default(),
            data_providers: KNOWN_PROVIDERS.iter().map(|s| s.to_string()).collect(),
            unknown: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSettings {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub ema_trend: usize,
    pub ema_long: usize,
    pub atr_period: usize,
    pub rsi_period_scalp: usize,
    pub rsi_period_swing: usize,
    pub adx_period: usize,
    pub volume_ma_period: usize,
    pub stochastic_enabled: bool,
    pub stoch_k: usize,
    pub stoch_d: usize,
    pub stoch_smooth: usize,
    pub vwap_reset: VwapReset,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            ema_fast: 9,
            ema_slow: 21,
            ema_trend: 50,
            ema_long: 200,
            atr_period: 14,
            rsi_period_scalp: 6,
            rsi_period_swing: 14,
            adx_period: 14,
            volume_ma_period: 20,
            stochastic_enabled: true,
            stoch_k: 14,
            stoch_d: 3,
            stoch_smooth: 3,
            vwap_reset: VwapReset::Daily,
        }
    }
}

impl IndicatorSettings {
    /// RSI period depends on how tight the scan loop is.
    pub fn rsi_period(&self, timeframe: TimeFrame) -> usize {
        if timeframe.is_scalp() {
            self.rsi_period_scalp
        } else {
            self.rsi_period_swing
        }
    }
}

/// Where the VWAP accumulation restarts. The session boundary differs per
/// deployment, so it is configuration rather than a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum VwapReset {
    Daily,
    Session { start_hour: u32, end_hour: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub min_confluence: usize,
    pub min_confidence: u8,
    pub min_risk_reward: Decimal,
    pub duplicate_window_s: i64,
    pub duplicate_price_pct: Decimal,
    pub significant_move_pct: Decimal,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            min_confluence: 3,
            min_confidence: 3,
            min_risk_reward: dec!(1.2),
            duplicate_window_s: 600,
            duplicate_price_pct: dec!(1.0),
            significant_move_pct: dec!(1.5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BypassSettings {
    pub enabled: bool,
    pub auto_disable_after_h: i64,
}

impl Default for BypassSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_disable_after_h: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    /// Explicit enable/disable by strategy name; strategies not listed are
    /// enabled.
    pub enabled: BTreeMap<String, bool>,
    /// Regime name -> ordered strategy names. Missing regimes use the
    /// built-in tables.
    pub priority: BTreeMap<String, Vec<String>>,
    pub asian_session: AsianSessionSettings,
}

/// Session window and breakout buffer for the Asian-range strategy. The
/// boundary differs per deployment, so it is configuration rather than a
/// guess.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsianSessionSettings {
    pub start_hour: u32,
    pub end_hour: u32,
    /// Percent of the range height a close must clear beyond the boundary
    /// to count as a breakout.
    pub break_buffer_pct: Decimal,
}

impl Default for AsianSessionSettings {
    fn default() -> Self {
        Self {
            start_hour: 0,
            end_hour: 8,
            break_buffer_pct: dec!(10),
        }
    }
}

impl AsianSessionSettings {
    pub fn contains(&self, hour: u32) -> bool {
        (self.start_hour..self.end_hour).contains(&hour)
    }
}

/// Built-in priority tables, keyed by regime.
pub fn default_priority(regime: RegimeKey) -> Vec<StrategyId> {
    match regime {
        RegimeKey::StrongTrend => vec![
            StrategyId::TrendConfluence,
            StrategyId::TrendAlignment,
            StrategyId::BreakRetest,
            StrategyId::TrendPullback,
        ],
        RegimeKey::Ranging => vec![
            StrategyId::SupportResistance,
            StrategyId::MeanReversion,
            StrategyId::FibRetracement,
        ],
        RegimeKey::HighVolatility => vec![
            StrategyId::TrendConfluence,
            StrategyId::MomentumShift,
            StrategyId::EmaCloudBreakout,
        ],
        RegimeKey::LowVolatility => vec![
            StrategyId::MeanReversion,
            StrategyId::SupportResistance,
            StrategyId::FibRetracement,
        ],
        RegimeKey::Default => vec![
            StrategyId::EmaCrossover,
            StrategyId::TrendAlignment,
            StrategyId::TrendConfluence,
            StrategyId::FairValueGap,
            StrategyId::BreakRetest,
            StrategyId::SupportResistance,
            StrategyId::MomentumShift,
            StrategyId::FibRetracement,
            StrategyId::TrendPullback,
            StrategyId::EmaCloudBreakout,
            StrategyId::MeanReversion,
            StrategyId::AsianRange,
        ],
    }
}

/// Startup-validated configuration handed to the scanner.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub symbol: Symbol,
    pub timeframes: Vec<TimeFrame>,
    pub poll_interval_s: u64,
    pub scalp_poll_interval_s: u64,
    pub provider_timeout_s: u64,
    pub candle_history: usize,
    pub summary_interval_s: u64,
    pub indicators: IndicatorSettings,
    pub filter: FilterSettings,
    pub bypass: BypassSettings,
    pub overrides: AssetOverride,
    pub asian_session: AsianSessionSettings,
    pub enabled_strategies: BTreeSet<StrategyId>,
    pub priority: BTreeMap<RegimeKey, Vec<StrategyId>>,
    pub providers: Vec<String>,
}

impl ScannerSettings {
    /// Keys that deserialized into the catch-all; the caller logs one
    /// warning per key.
    pub fn unknown_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.unknown.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.symbol.trim().is_empty() {
            errors.push("symbol must not be empty".to_string());
        }
        if self.timeframes.is_empty() {
            errors.push("timeframes must not be empty".to_string());
        }
        for tf in &self.timeframes {
            if TimeFrame::from_str(tf).is_none() {
                errors.push(format!("unknown timeframe '{tf}'"));
            }
        }
        if self.poll_interval_s == 0 || self.scalp_poll_interval_s == 0 {
            errors.push("poll intervals must be > 0".to_string());
        }
        if self.provider_timeout_s == 0 {
            errors.push("provider_timeout_s must be > 0".to_string());
        }
        if self.candle_history < 200 {
            errors.push(format!(
                "candle_history must be >= 200, got {}",
                self.candle_history
            ));
        }

        let ind = &self.indicators;
        for (name, period) in [
            ("ema_fast", ind.ema_fast),
            ("ema_slow", ind.ema_slow),
            ("ema_trend", ind.ema_trend),
            ("ema_long", ind.ema_long),
            ("atr_period", ind.atr_period),
            ("rsi_period_scalp", ind.rsi_period_scalp),
            ("rsi_period_swing", ind.rsi_period_swing),
            ("adx_period", ind.adx_period),
            ("volume_ma_period", ind.volume_ma_period),
            ("stoch_k", ind.stoch_k),
            ("stoch_d", ind.stoch_d),
            ("stoch_smooth", ind.stoch_smooth),
        ] {
            if period == 0 {
                errors.push(format!("indicator period {name} must be > 0"));
            }
        }
        if !(ind.ema_fast < ind.ema_slow && ind.ema_slow < ind.ema_trend && ind.ema_trend < ind.ema_long)
        {
            errors.push("EMA periods must satisfy fast < slow < trend < long".to_string());
        }
        if let VwapReset::Session { start_hour, end_hour } = ind.vwap_reset {
            if start_hour >= 24 || end_hour > 24 || start_hour >= end_hour {
                errors.push(format!(
                    "vwap session window {start_hour}..{end_hour} is not a valid UTC hour range"
                ));
            }
        }

        let f = &self.quality_filter;
        if f.min_confluence == 0 || f.min_confluence > 7 {
            errors.push("quality_filter.min_confluence must be within 1..=7".to_string());
        }
        if f.min_confidence == 0 || f.min_confidence > 5 {
            errors.push("quality_filter.min_confidence must be within 1..=5".to_string());
        }
        if f.min_risk_reward <= Decimal::ZERO {
            errors.push("quality_filter.min_risk_reward must be > 0".to_string());
        }
        if f.duplicate_window_s <= 0 {
            errors.push("quality_filter.duplicate_window_s must be > 0".to_string());
        }
        if f.duplicate_price_pct <= Decimal::ZERO || f.significant_move_pct <= Decimal::ZERO {
            errors.push("quality_filter price thresholds must be > 0".to_string());
        }

        if self.bypass.auto_disable_after_h <= 0 {
            errors.push("bypass.auto_disable_after_h must be > 0".to_string());
        }

        let session = &self.strategies.asian_session;
        if session.start_hour >= 24 || session.end_hour > 24 || session.start_hour >= session.end_hour
        {
            errors.push(format!(
                "asian_session window {}..{} is not a valid UTC hour range",
                session.start_hour, session.end_hour
            ));
        }
        if session.break_buffer_pct < Decimal::ZERO {
            errors.push("asian_session.break_buffer_pct must be >= 0".to_string());
        }

        for name in self.strategies.enabled.keys() {
            if StrategyId::from_str(name).is_none() {
                errors.push(format!("unknown strategy '{name}' in strategies.enabled"));
            }
        }
        for (regime, names) in &self.strategies.priority {
            if RegimeKey::from_str(regime).is_none() {
                errors.push(format!("unknown regime '{regime}' in strategies.priority"));
            }
            for name in names {
                if StrategyId::from_str(name).is_none() {
                    errors.push(format!(
                        "unknown strategy '{name}' in strategies.priority.{regime}"
                    ));
                }
            }
        }

        if self.data_providers.is_empty() {
            errors.push("data_providers must not be empty".to_string());
        }
        for provider in &self.data_providers {
            if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
                errors.push(format!("unknown data provider '{provider}'"));
            }
        }

        let symbol = Symbol::parse(&self.symbol);
        for (class_name, patch) in &self.asset_overrides {
            let class = match class_name.as_str() {
                "crypto" => crate::types::AssetClass::Crypto,
                "metal" => crate::types::AssetClass::Metal,
                "index" => crate::types::AssetClass::Index,
                "forex" => crate::types::AssetClass::Forex,
                "other" => crate::types::AssetClass::Other,
                _ => {
                    errors.push(format!("unknown asset class '{class_name}' in asset_overrides"));
                    continue;
                }
            };
            AssetOverride::defaults_for(class)
                .merge(patch)
                .validate(&mut errors);
        }
        // Also validate the effective override for the configured symbol,
        // even when no patch is present.
        AssetOverride::defaults_for(symbol.asset_class()).validate(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::new(errors))
        }
    }

    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        self.validate()?;

        let symbol = Symbol::parse(&self.symbol);
        let timeframes = self
            .timeframes
            .iter()
            .filter_map(|tf| TimeFrame::from_str(tf))
            .collect();

        let class = symbol.asset_class();
        let mut overrides = AssetOverride::defaults_for(class);
        if let Some(patch) = self.asset_overrides.get(class.as_str()) {
            overrides = overrides.merge(patch);
        }

        let enabled_strategies = StrategyId::all()
            .into_iter()
            .filter(|id| {
                self.strategies
                    .enabled
                    .get(id.as_str())
                    .copied()
                    .unwrap_or(true)
            })
            .collect();

        let mut priority = BTreeMap::new();
        for regime in [
            RegimeKey::StrongTrend,
            RegimeKey::Ranging,
            RegimeKey::HighVolatility,
            RegimeKey::LowVolatility,
            RegimeKey::Default,
        ] {
            let order = match self.strategies.priority.get(regime.as_str()) {
                Some(names) => names
                    .iter()
                    .filter_map(|n| StrategyId::from_str(n))
                    .collect(),
                None => default_priority(regime),
            };
            priority.insert(regime, order);
        }

        Ok(ResolvedConfig {
            symbol,
            timeframes,
            poll_interval_s: self.poll_interval_s,
            scalp_poll_interval_s: self.scalp_poll_interval_s,
            provider_timeout_s: self.provider_timeout_s,
            candle_history: self.candle_history,
            summary_interval_s: self.summary_interval_s,
            indicators: self.indicators.clone(),
            filter: self.quality_filter.clone(),
            bypass: self.bypass.clone(),
            overrides,
            asian_session: self.strategies.asian_session.clone(),
            enabled_strategies,
            priority,
            providers: self.data_providers.clone(),
        })
    }
}

impl ResolvedConfig {
    pub fn poll_interval(&self, timeframe: TimeFrame) -> std::time::Duration {
        let secs = if timeframe.is_scalp() {
            self.scalp_poll_interval_s
        } else {
            self.poll_interval_s
        };
        std::time::Duration::from_secs(secs)
    }
}
