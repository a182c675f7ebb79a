use rust_decimal_macros::dec;

use super::{prologue_ok, Candidate, Strategy, StrategyContext};
use crate::indicators::EnrichedBuffer;
use crate::types::{Direction, HoldHorizon, SignalMetadata, StrategyId};

/// Price stacked over a fully ordered EMA cascade with a trending ADX and
/// rising RSI. Direction falls out of the cascade itself.
pub struct TrendAlignment;

impl Strategy for TrendAlignment {
    fn id(&self) -> StrategyId {
        StrategyId::TrendAlignment
    }

    fn detect(&self, buffer: &EnrichedBuffer, ctx: &StrategyContext) -> Option<Candidate> {
        if !prologue_ok(buffer, self.min_history()) {
            return None;
        }
        let last = buffer.last();
        let prev = buffer.from_end(1)?;
        let close = last.candle.close;

        let bullish_cascade =
            close > last.ema_fast && last.ema_fast > last.ema_slow && last.ema_slow > last.ema_trend;
        let bearish_cascade =
            close < last.ema_fast && last.ema_fast < last.ema_slow && last.ema_slow < last.ema_trend;

        let direction = if bullish_cascade {
            Direction::Long
        } else if bearish_cascade {
            Direction::Short
        } else {
            return None;
        };

        if last.adx < ctx.overrides.adx_min {
            return None;
        }
        if last.volume_ratio < dec!(0.8) {
            return None;
        }
        // RSI must agree with the cascade's momentum.
        match direction {
            Direction::Long if last.rsi <= prev.rsi => return None,
            Direction::Short if last.rsi >= prev.rsi => return None,
            _ => {}
        }

        let half_atr = dec!(0.5) * last.atr;
        let tp_distance = dec!(2.5) * last.atr;
        let (stop_loss, take_profit) = match direction {
            Direction::Long => (last.ema_slow - half_atr, close + tp_distance),
            Direction::Short => (last.ema_slow + half_atr, close - tp_distance),
        };

        let confidence = if last.adx >= dec!(25) { 4 } else { 3 };
        let reasoning = format!(
            "EMA cascade {} (close {:.4} / fast {:.4} / slow {:.4} / trend {:.4}), ADX {:.1}, RSI {} {:.1}",
            direction,
            close,
            last.ema_fast,
            last.ema_slow,
            last.ema_trend,
            last.adx,
            if direction == Direction::Long { "rising to" } else { "falling to" },
            last.rsi,
        );

        Candidate::new(self.id(), direction, close, stop_loss, take_profit, confidence, reasoning)
            .map(|c| c.with_metadata(SignalMetadata::with_horizon(HoldHorizon::MultiDay)))
    }
}
