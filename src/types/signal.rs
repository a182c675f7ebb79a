#![allow(dead_code)]
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::{Direction, Symbol, TimeFrame};

/// Identity of every detector in the strategy library. The registry and the
/// orchestrator's priority tables are keyed by this enum so a config typo
/// fails at startup instead of silently disabling a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    EmaCrossover,
    TrendAlignment,
    MeanReversion,
    EmaCloudBreakout,
    MomentumShift,
    FibRetracement,
    SupportResistance,
    BreakRetest,
    TrendConfluence,
    TrendPullback,
    FairValueGap,
    AsianRange,
}

impl StrategyId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::EmaCrossover => "ema_crossover",
            StrategyId::TrendAlignment => "trend_alignment",
            StrategyId::MeanReversion => "mean_reversion",
            StrategyId::EmaCloudBreakout => "ema_cloud_breakout",
            StrategyId::MomentumShift => "momentum_shift",
            StrategyId::FibRetracement => "fib_retracement",
            StrategyId::SupportResistance => "support_resistance",
            StrategyId::BreakRetest => "break_retest",
            StrategyId::TrendConfluence => "trend_confluence",
            StrategyId::TrendPullback => "trend_pullback",
            StrategyId::FairValueGap => "fair_value_gap",
            StrategyId::AsianRange => "asian_range",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|id| id.as_str() == s)
    }

    pub fn all() -> Vec<StrategyId> {
        vec![
            StrategyId::EmaCrossover,
            StrategyId::TrendAlignment,
            StrategyId::MeanReversion,
            StrategyId::EmaCloudBreakout,
            StrategyId::MomentumShift,
            StrategyId::FibRetracement,
            StrategyId::SupportResistance,
            StrategyId::BreakRetest,
            StrategyId::TrendConfluence,
            StrategyId::TrendPullback,
            StrategyId::FairValueGap,
            StrategyId::AsianRange,
        ]
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The seven boolean conditions the quality filter scores a candidate
/// against. A factor is "met" iff it holds on the last enriched candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfluenceFactor {
    PriceVsVwap,
    EmaAlignment,
    VolumeSpike,
    RsiBand,
    AdxStrength,
    TrendDirection,
    NoOpposingSignal,
}

impl ConfluenceFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfluenceFactor::PriceVsVwap => "price_vs_vwap",
            ConfluenceFactor::EmaAlignment => "ema_alignment",
            ConfluenceFactor::VolumeSpike => "volume_spike",
            ConfluenceFactor::RsiBand => "rsi_band",
            ConfluenceFactor::AdxStrength => "adx_strength",
            ConfluenceFactor::TrendDirection => "trend_direction",
            ConfluenceFactor::NoOpposingSignal => "no_opposing_signal",
        }
    }
}

/// Advisory hold-time classification carried in signal metadata. The trade
/// tracker's expiry rule is the only authoritative hold limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldHorizon {
    Intraday,
    MultiDay,
    MultiWeek,
}

impl HoldHorizon {
    pub fn max_hold(&self) -> chrono::Duration {
        match self {
            HoldHorizon::Intraday => chrono::Duration::hours(24),
            HoldHorizon::MultiDay => chrono::Duration::days(5),
            HoldHorizon::MultiWeek => chrono::Duration::weeks(3),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HoldHorizon::Intraday => "intraday",
            HoldHorizon::MultiDay => "multi_day",
            HoldHorizon::MultiWeek => "multi_week",
        }
    }
}

/// Values of the core indicators at emission time, attached to every signal
/// and to every scan-report row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ema_fast: Decimal,
    pub ema_slow: Decimal,
    pub ema_trend: Decimal,
    pub rsi: Decimal,
    pub adx: Decimal,
    pub atr: Decimal,
    pub vwap: Decimal,
    pub volume_ratio: Decimal,
}

/// Strategy-specific context attached to a signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalMetadata {
    pub hold_horizon: Option<HoldHorizon>,
    /// Free-form strategy details (key level, fib ratio, session bounds).
    /// BTreeMap so serialized output is deterministic.
    pub extra: BTreeMap<String, String>,
}

impl SignalMetadata {
    pub fn with_horizon(horizon: HoldHorizon) -> Self {
        Self {
            hold_horizon: Some(horizon),
            extra: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: &str, value: impl ToString) {
        self.extra.insert(key.to_string(), value.to_string());
    }
}

/// An emitted, filter-approved signal. Immutable once constructed; the
/// tracker keeps its own mutable lifecycle record alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: Symbol,
    pub timeframe: TimeFrame,
    pub direction: Direction,
    pub strategy: StrategyId,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub risk_reward: Decimal,
    pub confidence: u8,
    pub confluence: Vec<ConfluenceFactor>,
    pub reasoning: String,
    pub snapshot: IndicatorSnapshot,
    pub metadata: SignalMetadata,
    pub created_at: DateTime<Utc>,
    /// Set when the quality filter was bypassed at emission time, so
    /// downstream consumers can distinguish unfiltered signals.
    pub bypassed_filter: bool,
}

impl Signal {
    /// `stop < entry < tp` for longs, mirrored for shorts. Levels that do
    /// not satisfy this never become a Signal.
    pub fn levels_valid(direction: Direction, entry: Decimal, stop: Decimal, tp: Decimal) -> bool {
        match direction {
            Direction::Long => stop < entry && entry < tp,
            Direction::Short => stop > entry && entry > tp,
        }
    }

    pub fn risk_reward_of(entry: Decimal, stop: Decimal, tp: Decimal) -> Option<Decimal> {
        let risk = (entry - stop).abs();
        if risk.is_zero() {
            return None;
        }
        Some((tp - entry).abs() / risk)
    }
}
