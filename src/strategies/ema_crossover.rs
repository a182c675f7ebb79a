use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{prologue_ok, volume_floor, Candidate, Strategy, StrategyContext};
use crate::indicators::EnrichedBuffer;
use crate::types::{Direction, HoldHorizon, SignalMetadata, StrategyId};

/// Fast/slow EMA cross on the last closed bar, confirmed by VWAP side,
/// volume expansion and a non-extreme RSI.
pub struct EmaCrossover;

impl EmaCrossover {
    fn tp_multiplier(scalp: bool) -> Decimal {
        if scalp {
            dec!(1.0)
        } else {
            dec!(2.0)
        }
    }
}

impl Strategy for EmaCrossover {
    fn id(&self) -> StrategyId {
        StrategyId::EmaCrossover
    }

    fn detect(&self, buffer: &EnrichedBuffer, ctx: &StrategyContext) -> Option<Candidate> {
        if !prologue_ok(buffer, self.min_history()) {
            return None;
        }
        let last = buffer.last();
        let prev = buffer.from_end(1)?;

        let crossed_up = prev.ema_fast <= prev.ema_slow && last.ema_fast > last.ema_slow;
        let crossed_down = prev.ema_fast >= prev.ema_slow && last.ema_fast < last.ema_slow;
        let direction = if crossed_up {
            Direction::Long
        } else if crossed_down {
            Direction::Short
        } else {
            return None;
        };

        let close = last.candle.close;
        match direction {
            Direction::Long if close <= last.vwap => return None,
            Direction::Short if close >= last.vwap => return None,
            _ => {}
        }

        if last.volume_ratio < volume_floor(Decimal::ZERO, &ctx.overrides) {
            return None;
        }
        if last.rsi < ctx.overrides.rsi_min || last.rsi > ctx.overrides.rsi_max {
            return None;
        }

        let scalp = ctx.timeframe.is_scalp();
        let sl_distance = dec!(1.5) * last.atr;
        let tp_distance = Self::tp_multiplier(scalp) * last.atr;
        let (stop_loss, take_profit) = match direction {
            Direction::Long => (close - sl_distance, close + tp_distance),
            Direction::Short => (close + sl_distance, close - tp_distance),
        };

        let mut confidence = 3;
        if last.volume_ratio >= volume_floor(Decimal::ZERO, &ctx.overrides) + dec!(0.5) {
            confidence += 1;
        }

        let reasoning = format!(
            "EMA {}-cross: fast {:.4} vs slow {:.4}, close {} VWAP {:.4}, volume x{:.2}, RSI {:.1}",
            direction,
            last.ema_fast,
            last.ema_slow,
            if direction == Direction::Long { ">" } else { "<" },
            last.vwap,
            last.volume_ratio,
            last.rsi,
        );

        let horizon = if scalp {
            HoldHorizon::Intraday
        } else {
            HoldHorizon::MultiDay
        };
        Candidate::new(
            self.id(),
            direction,
            close,
            stop_loss,
            take_profit,
            confidence,
            reasoning,
        )
        .map(|c| c.with_metadata(SignalMetadata::with_horizon(horizon)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::flat_enriched;
    use crate::strategies::test_support::ctx;

    /// Flat buffer reshaped so the last two rows form a bullish cross with
    /// every confirmation in place.
    fn bullish_cross_buffer() -> EnrichedBuffer {
        let mut buf = flat_enriched(70, dec!(65432.5));
        let len = buf.rows().len();
        let rows = buf.rows_mut();
        rows[len - 2].ema_fast = dec!(65400);
        rows[len - 2].ema_slow = dec!(65410);
        rows[len - 1].ema_fast = dec!(65420);
        rows[len - 1].ema_slow = dec!(65410);
        rows[len - 1].vwap = dec!(65300);
        rows[len - 1].volume_ratio = dec!(1.8);
        rows[len - 1].rsi = dec!(58);
        rows[len - 1].atr = dec!(120);
        buf
    }

    #[test]
    fn test_bullish_cross_emits_long_with_atr_levels() {
        let c = EmaCrossover.detect(&bullish_cross_buffer(), &ctx()).unwrap();
        assert_eq!(c.direction, Direction::Long);
        assert_eq!(c.entry, dec!(65432.5));
        assert_eq!(c.stop_loss, dec!(65252.5));
        assert_eq!(c.take_profit, dec!(65552.5));
        assert!(c.confidence >= 3);
    }

    #[test]
    fn test_no_cross_no_signal() {
        let buf = flat_enriched(70, dec!(100));
        assert!(EmaCrossover.detect(&buf, &ctx()).is_none());
    }

    #[test]
    fn test_weak_volume_blocks_signal() {
        let mut buf = bullish_cross_buffer();
        let len = buf.rows().len();
        buf.rows_mut()[len - 1].volume_ratio = dec!(1.0);
        assert!(EmaCrossover.detect(&buf, &ctx()).is_none());
    }

    #[test]
    fn test_extreme_rsi_blocks_signal() {
        let mut buf = bullish_cross_buffer();
        let len = buf.rows().len();
        buf.rows_mut()[len - 1].rsi = dec!(82);
        assert!(EmaCrossover.detect(&buf, &ctx()).is_none());
    }

    #[test]
    fn test_stale_buffer_blocks_signal() {
        let mut buf = bullish_cross_buffer();
        buf.is_fresh = false;
        assert!(EmaCrossover.detect(&buf, &ctx()).is_none());
    }

    #[test]
    fn test_swing_timeframe_widens_target() {
        let c = EmaCrossover
            .detect(&bullish_cross_buffer(), &crate::strategies::test_support::swing_ctx())
            .unwrap();
        // 2.0 * ATR instead of the scalp 1.0.
        assert_eq!(c.take_profit, dec!(65672.5));
    }
}
