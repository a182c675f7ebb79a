#![allow(dead_code)]
pub mod asian_range;
pub mod break_retest;
pub mod ema_cloud;
pub mod ema_crossover;
pub mod fair_value_gap;
pub mod fib_retracement;
pub mod mean_reversion;
pub mod momentum_shift;
pub mod orchestrator;
pub mod pullback;
pub mod support_resistance;
pub mod swing;
pub mod trend_alignment;
pub mod trend_confluence;

pub use orchestrator::*;

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::config::{AsianSessionSettings, AssetOverride};
use crate::indicators::EnrichedBuffer;
use crate::types::{Direction, Signal, SignalMetadata, StrategyId, Symbol, TimeFrame};

/// Everything a detector needs besides the candles themselves.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub symbol: Symbol,
    pub timeframe: TimeFrame,
    pub overrides: AssetOverride,
    pub asian_session: AsianSessionSettings,
}

/// A candidate produced by a detector, before the quality filter has had
/// its say. Confidence here is the strategy's own base score; the filter
/// adjusts it from confluence.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub strategy: StrategyId,
    pub direction: Direction,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub confidence: u8,
    pub reasoning: String,
    pub metadata: SignalMetadata,
}

impl Candidate {
    pub fn new(
        strategy: StrategyId,
        direction: Direction,
        entry: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        confidence: u8,
        reasoning: String,
    ) -> Option<Self> {
        // Detectors that produce inverted levels have nothing tradeable to
        // say; that is a miss, not an error.
        if !Signal::levels_valid(direction, entry, stop_loss, take_profit) {
            return None;
        }
        Some(Self {
            strategy,
            direction,
            entry,
            stop_loss,
            take_profit,
            confidence: confidence.clamp(1, 5),
            reasoning,
            metadata: SignalMetadata::default(),
        })
    }

    pub fn with_metadata(mut self, metadata: SignalMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn risk_reward(&self) -> Decimal {
        Signal::risk_reward_of(self.entry, self.stop_loss, self.take_profit)
            .unwrap_or(Decimal::ZERO)
    }
}

/// One pattern detector. Detection is pure: no state survives between
/// ticks, "no signal" is `None`, and only infrastructure problems may use
/// the error channel (none of the built-ins need it).
pub trait Strategy: Send + Sync {
    fn id(&self) -> StrategyId;

    /// Rows required beyond the engine's own minimum.
    fn min_history(&self) -> usize {
        60
    }

    fn detect(&self, buffer: &EnrichedBuffer, ctx: &StrategyContext) -> Option<Candidate>;
}

/// Shared entry gate: fresh data, enough rows, a live tape.
pub(crate) fn prologue_ok(buffer: &EnrichedBuffer, min_history: usize) -> bool {
    buffer.is_fresh
        && buffer.len() >= min_history
        && buffer.last().candle.volume > Decimal::ZERO
}

/// Per-strategy volume floor: the strategy's own requirement, tightened or
/// loosened by the asset-class override (which replaces the 1.3 baseline).
pub(crate) fn volume_floor(strategy_base: Decimal, overrides: &AssetOverride) -> Decimal {
    strategy_base.max(overrides.volume_threshold)
}

/// All twelve detectors, keyed for the orchestrator.
pub struct StrategyRegistry {
    strategies: BTreeMap<StrategyId, Box<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn with_all() -> Self {
        let mut strategies: BTreeMap<StrategyId, Box<dyn Strategy>> = BTreeMap::new();
        for strategy in [
            Box::new(ema_crossover::EmaCrossover) as Box<dyn Strategy>,
            Box::new(trend_alignment::TrendAlignment),
            Box::new(mean_reversion::MeanReversion),
            Box::new(ema_cloud::EmaCloudBreakout),
            Box::new(momentum_shift::MomentumShift),
            Box::new(fib_retracement::FibRetracement),
            Box::new(support_resistance::SupportResistance),
            Box::new(break_retest::BreakRetest),
            Box::new(trend_confluence::TrendConfluence),
            Box::new(pullback::TrendPullback),
            Box::new(fair_value_gap::FairValueGap),
            Box::new(asian_range::AsianRange),
        ] {
            strategies.insert(strategy.id(), strategy);
        }
        Self { strategies }
    }

    pub fn get(&self, id: StrategyId) -> Option<&dyn Strategy> {
        self.strategies.get(&id).map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
