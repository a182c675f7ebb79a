use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{prologue_ok, volume_floor, Candidate, Strategy, StrategyContext};
use crate::indicators::EnrichedBuffer;
use crate::types::{Direction, HoldHorizon, SignalMetadata, StrategyId};

/// RSI hooking out of a three-bar run while the trend backdrop (ADX) and
/// participation (volume) are strong enough, confirmed by a price bar in
/// the turn direction.
pub struct MomentumShift;

const SHIFT_VOLUME: Decimal = dec!(1.2);

impl Strategy for MomentumShift {
    fn id(&self) -> StrategyId {
        StrategyId::MomentumShift
    }

    fn detect(&self, buffer: &EnrichedBuffer, ctx: &StrategyContext) -> Option<Candidate> {
        if !prologue_ok(buffer, self.min_history()) {
            return None;
        }
        let last = buffer.last();
        let prev = buffer.from_end(1)?;
        let prev2 = buffer.from_end(2)?;
        let close = last.candle.close;

        // A descending RSI run breaking upward, or the mirror image.
        let turned_up = prev2.rsi >= prev.rsi && last.rsi > prev.rsi;
        let turned_down = prev2.rsi <= prev.rsi && last.rsi < prev.rsi;
        let direction = if turned_up && !turned_down {
            Direction::Long
        } else if turned_down && !turned_up {
            Direction::Short
        } else {
            return None;
        };

        if last.adx < ctx.overrides.adx_min {
            return None;
        }
        if last.volume_ratio < volume_floor(SHIFT_VOLUME, &ctx.overrides) {
            return None;
        }
        // Confirmation candle in the turn direction.
        match direction {
            Direction::Long if !last.candle.is_bullish() => return None,
            Direction::Short if !last.candle.is_bearish() => return None,
            _ => {}
        }

        let sl_distance = dec!(1.5) * last.atr;
        let tp_distance = dec!(2.0) * last.atr;
        let (stop_loss, take_profit) = match direction {
            Direction::Long => (close - sl_distance, close + tp_distance),
            Direction::Short => (close + sl_distance, close - tp_distance),
        };

        let confidence = if last.adx >= dec!(25) { 4 } else { 3 };
        let reasoning = format!(
            "Momentum shift {}: RSI run broke ({:.1} -> {:.1} -> {:.1}), ADX {:.1}, volume x{:.2}",
            direction, prev2.rsi, prev.rsi, last.rsi, last.adx, last.volume_ratio,
        );

        Candidate::new(self.id(), direction, close, stop_loss, take_profit, confidence, reasoning)
            .map(|c| c.with_metadata(SignalMetadata::with_horizon(HoldHorizon::Intraday)))
    }
}
